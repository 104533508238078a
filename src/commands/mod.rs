mod config_cmd;
mod diff;
mod log;
mod migrate;
mod save;

use clap::ValueEnum;

pub use config_cmd::ConfigCommand;
pub use diff::DiffCommand;
pub use log::LogCommand;
pub use migrate::MigrateCommand;
pub use save::SaveCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

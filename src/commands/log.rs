use clap::{Args, Subcommand};

use todu_fit_workouts::{LogKey, WorkoutStore};

use super::OutputFormat;
use crate::config::Config;
use crate::db::SqliteWorkoutStore;

#[derive(Args)]
pub struct LogCommand {
    #[command(subcommand)]
    pub command: LogSubcommand,
}

#[derive(Subcommand)]
pub enum LogSubcommand {
    /// Show a stored workout log
    Show {
        /// Program ID
        #[arg(long)]
        program: String,

        /// Week index (0-based)
        #[arg(long)]
        week: u32,

        /// Day index (0-based)
        #[arg(long)]
        day: u32,

        /// User ID (defaults to the configured user)
        #[arg(long)]
        user: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl LogCommand {
    pub async fn run(
        &self,
        store: &SqliteWorkoutStore,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            LogSubcommand::Show {
                program,
                week,
                day,
                user,
                format,
            } => {
                let user_id = user.as_ref().unwrap_or(&config.user_id.value);
                let key = LogKey::new(user_id.as_str(), program.as_str(), *week, *day);

                let Some(log) = store.find_log(&key).await? else {
                    return Err(format!("No workout log found for {}", key).into());
                };

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&log)?);
                    }
                    OutputFormat::Text => {
                        print!("{}", log);
                    }
                }
                Ok(())
            }
        }
    }
}

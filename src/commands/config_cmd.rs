use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!("user_id: {}", config.user_id.value);
                        println!("  source: {}", config.user_id.source);
                        println!();

                        let engine = &config.save_engine;
                        println!("save_engine:");
                        println!("  tolerance: {}", engine.tolerance);
                        println!("  track_order_changes: {}", engine.track_order_changes);
                        println!(
                            "  unknown_id_policy: {}",
                            serde_json::to_string(&engine.unknown_id_policy)?.trim_matches('"')
                        );
                        println!(
                            "  max_structural_changes: {}",
                            engine.structural_policy.max_structural_changes
                        );
                        println!(
                            "  deletes_force_full_save: {}",
                            engine.structural_policy.deletes_force_full_save
                        );
                        println!(
                            "  default_debounce_ms: {}",
                            engine.strategy.default_debounce_ms
                        );
                        println!("  max_debounce_ms: {}", engine.strategy.max_debounce_ms);
                        println!("  metrics_samples: {}", engine.metrics_samples);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'fit-workout config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let default_config = r#"# fit-workout configuration

# Path to SQLite database (default: platform data dir / fit-workout / workouts.db)
# database_path: workouts.db

# User whose workout logs are read and written
user_id: default

# Save engine tuning (all keys optional)
save_engine:
  tolerance: 0.001
  track_order_changes: true
  # insert | reject
  unknown_id_policy: insert
  structural_policy:
    max_structural_changes: 3
    deletes_force_full_save: false
  strategy:
    default_debounce_ms: 1500
    max_debounce_ms: 5000
"#;

                let mut file = fs::File::create(&config_path)?;
                file.write_all(default_config.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

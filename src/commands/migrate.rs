use clap::{Args, Subcommand};
use sqlx::SqlitePool;

use super::OutputFormat;
use crate::db::{backfill_completed_date, DEFAULT_BATCH_SIZE};

#[derive(Args)]
pub struct MigrateCommand {
    #[command(subcommand)]
    pub command: MigrateSubcommand,
}

#[derive(Subcommand)]
pub enum MigrateSubcommand {
    /// Fill missing completion dates from the workout date
    CompletedDate {
        /// Logs per batch
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: u32,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl MigrateCommand {
    pub async fn run(&self, pool: &SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            MigrateSubcommand::CompletedDate { batch_size, format } => {
                if *batch_size == 0 {
                    return Err("Batch size must be greater than zero".into());
                }

                let summary = backfill_completed_date(pool, *batch_size).await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&summary)?);
                    }
                    OutputFormat::Text => {
                        println!("Migration complete!");
                        println!("Processed: {} logs", summary.logs_processed);
                        println!("Updated: {} logs", summary.logs_updated);
                        println!("Batches committed: {}", summary.batches);
                    }
                }
                Ok(())
            }
        }
    }
}

use clap::Args;
use std::path::{Path, PathBuf};

use todu_fit_workouts::{SaveEngine, SaveRequest};

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct SaveCommand {
    /// Save request as JSON (`-` reads stdin)
    #[arg(long, short)]
    pub file: PathBuf,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Print engine metrics after the save
    #[arg(long)]
    pub metrics: bool,
}

impl SaveCommand {
    pub async fn run(
        &self,
        engine: &SaveEngine,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let request = read_request(&self.file, config)?;
        tracing::debug!("Saving {} ({})", request.key(), request.save_type);

        let result = engine.execute_save(&request).await?;

        match self.format {
            OutputFormat::Json => {
                if self.metrics {
                    let output = serde_json::json!({
                        "result": result,
                        "metrics": engine.metrics().snapshot(),
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                } else {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
            }
            OutputFormat::Text => {
                print!("{}", result);
                if self.metrics {
                    let snapshot = engine.metrics().snapshot();
                    println!("\nMetrics");
                    println!("=======");
                    println!("Total saves: {}", snapshot.total_saves);
                    println!("Skipped: {}", snapshot.skipped_saves);
                    println!("Failed: {}", snapshot.failed_saves);
                    println!("Fallbacks: {}", snapshot.fallback_saves);
                    println!("Writes: {}", snapshot.total_writes);
                    println!(
                        "Optimization rate: {:.0}%",
                        snapshot.optimization_rate * 100.0
                    );
                    for (name, stats) in &snapshot.strategies {
                        println!(
                            "  {}: {} attempts, {:.1}ms avg, {:.0}% errors",
                            name,
                            stats.attempts,
                            stats.average_duration_ms,
                            stats.error_rate * 100.0
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

/// Reads a save request, filling a blank `userId` from the configured user.
fn read_request(path: &Path, config: &Config) -> Result<SaveRequest, Box<dyn std::error::Error>> {
    let contents = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?
    };

    let mut request: SaveRequest = serde_json::from_str(&contents)
        .map_err(|e| format!("Invalid save request '{}': {}", path.display(), e))?;
    if request.user_id.trim().is_empty() {
        request.user_id = config.user_id.value.clone();
    }
    Ok(request)
}

use clap::Args;
use std::path::{Path, PathBuf};

use todu_fit_workouts::{
    classify, compare_exercises, DiffOptions, ExerciseComparison, ExerciseEntry, RawExercise,
};

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct DiffCommand {
    /// Persisted exercise list (JSON array)
    #[arg(long)]
    pub existing: PathBuf,

    /// Edited exercise list (JSON array)
    #[arg(long)]
    pub updated: PathBuf,

    /// Numeric tolerance for weight/rep comparison
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Ignore order changes
    #[arg(long)]
    pub no_order: bool,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl DiffCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let existing: Vec<ExerciseEntry> = read_json(&self.existing)?;
        let updated: Vec<RawExercise> = read_json(&self.updated)?;

        let comparison = compare_exercises(
            Some(existing.as_slice()),
            Some(updated.as_slice()),
            &self.options(config),
        )?;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&comparison)?);
            }
            OutputFormat::Text => print_comparison(&comparison, config),
        }
        Ok(())
    }

    fn options(&self, config: &Config) -> DiffOptions {
        DiffOptions {
            tolerance: self.tolerance.unwrap_or(config.save_engine.tolerance),
            track_order_changes: !self.no_order && config.save_engine.track_order_changes,
            unknown_id_policy: config.save_engine.unknown_id_policy,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<T, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let value = serde_json::from_str(&contents)
        .map_err(|e| format!("Invalid JSON in '{}': {}", path.display(), e))?;
    Ok(value)
}

fn print_comparison(comparison: &ExerciseComparison, config: &Config) {
    println!("Exercise diff");
    println!("=============\n");

    if !comparison.has_changes {
        println!("No changes.");
        return;
    }

    println!("{}", comparison.summary);
    let changes = &comparison.changes;
    for entry in &changes.to_insert {
        println!("  + {}", entry);
    }
    for entry in &changes.to_update {
        println!("  ~ {}", entry);
    }
    for id in &changes.to_delete {
        println!("  - {}", id);
    }

    let analysis = classify(changes, &[], &config.save_engine.structural_policy);
    println!("\nSave strategy: {}", analysis.save_strategy);
    println!(
        "Compared {} -> {} entries in {}µs",
        comparison.metadata.existing_count,
        comparison.metadata.updated_count,
        comparison.metadata.duration_micros
    );
}

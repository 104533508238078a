use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod db;

use commands::{ConfigCommand, DiffCommand, LogCommand, MigrateCommand, SaveCommand};
use config::Config;
use db::{init_db, SqliteWorkoutStore};
use todu_fit_workouts::SaveEngine;

#[derive(Parser)]
#[command(name = "fit-workout")]
#[command(version)]
#[command(about = "Workout log saving with change detection", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a workout log from a JSON save request
    Save(SaveCommand),

    /// Compare two exercise lists without saving
    Diff(DiffCommand),

    /// Inspect stored workout logs
    Log(LogCommand),

    /// Run data migrations
    Migrate(MigrateCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todufit_workouts=info,todu_fit_workouts=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Save(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            let store = Arc::new(SqliteWorkoutStore::new(pool));
            let engine = SaveEngine::new(store, config.save_engine.clone());
            cmd.run(&engine, &config).await?;
        }
        Some(Commands::Diff(cmd)) => {
            cmd.run(&config)?;
        }
        Some(Commands::Log(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            let store = SqliteWorkoutStore::new(pool);
            cmd.run(&store, &config).await?;
        }
        Some(Commands::Migrate(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            cmd.run(&pool).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

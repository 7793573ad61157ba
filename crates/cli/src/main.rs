mod commands;
mod logging;

use clap::{Parser, Subcommand};
use commands::migrate;
use migrator::{DirAssets, MigratorConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "migrator")]
#[command(about = "Apply and revert paired up/down SQL migrations")]
struct Cli {
    /// Root the migrations base directory is resolved against
    #[arg(long, env = "MIGRATOR_ASSETS_DIR", default_value = ".")]
    assets_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tracking table if it does not exist
    Init,

    /// Apply every pending migration in order
    Migrate,

    /// Revert the most recently applied migrations
    Rollback {
        /// Number of migrations to revert
        #[arg(default_value = "1")]
        steps: u32,
    },

    /// Revert and re-apply the most recently applied migrations
    Redo {
        /// Number of migrations to redo
        #[arg(default_value = "1")]
        steps: u32,
    },

    /// Show tracked migrations, newest first
    Status {
        /// Only show these ids
        ids: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply one migration by id
    Up {
        /// Migration id
        id: String,
    },

    /// Revert one migration by id
    Down {
        /// Migration id
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init_logging(&logging::LoggingConfig::from_env()?)?;

    let config = MigratorConfig::from_env()?;
    let assets = Arc::new(DirAssets::new(cli.assets_dir));
    let migrator = migrator::connect(&config, assets).await?;
    let migrator = migrator.as_ref();

    match cli.command {
        Commands::Init => migrate::init(migrator).await?,
        Commands::Migrate => migrate::run(migrator).await?,
        Commands::Rollback { steps } => migrate::rollback(migrator, steps).await?,
        Commands::Redo { steps } => migrate::redo(migrator, steps).await?,
        Commands::Status { ids, json } => migrate::status(migrator, &ids, json).await?,
        Commands::Up { id } => migrate::up(migrator, &id).await?,
        Commands::Down { id } => migrate::down(migrator, &id).await?,
    }

    Ok(())
}

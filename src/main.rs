use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use bikelog::config::Config;
use bikelog::error::AppError;
use commands::{App, BikeCommand, ConfigCommand, MaintenanceCommand, SyncCommand};

#[derive(Parser)]
#[command(name = "bikelog")]
#[command(version)]
#[command(about = "Track bike maintenance, offline first", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage bikes
    Bike(BikeCommand),

    /// Manage maintenance items
    Maintenance(MaintenanceCommand),

    /// Sync with the server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "bikelog=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        let kind = AppError::classify(e.as_ref());
        if !matches!(kind, AppError::Unknown(_)) {
            eprintln!("{}", kind.hint());
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config(cmd)) => return cmd.run(&config),
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    let app = App::open(config).await?;
    match command {
        Commands::Bike(cmd) => cmd.run(&app).await?,
        Commands::Maintenance(cmd) => cmd.run(&app).await?,
        Commands::Sync(cmd) => cmd.run(&app).await?,
        Commands::Config(_) => {}
    }

    Ok(())
}

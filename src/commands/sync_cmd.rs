//! Sync CLI commands for synchronizing with the server.

use clap::{Args, Subcommand};
use futures::StreamExt;

use super::{App, Connection};
use bikelog::sync::SyncOutcome;

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Keep running and merge remote changes as they arrive (Ctrl-C to stop)
    #[arg(long, short)]
    watch: bool,

    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and server status
    Status,
}

impl SyncCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.sync(app).await,
            Some(SyncSubcommand::Status) => self.status(app).await,
        }
    }

    async fn sync(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        match &app.connection {
            Connection::NotConfigured => {
                return Err("Sync not configured. Add server_url and api_key to config.".into());
            }
            Connection::Unreachable(reason) => {
                return Err(format!("Connection error: {}", reason).into());
            }
            Connection::Connected { .. } => {}
        }

        println!("Syncing with server...");

        let outcome = app.engine.pull_once().await?;
        println!("  {}", outcome);

        let pushed = app.engine.push_unsynced().await?;
        if pushed > 0 {
            println!("  pushed {} local record(s)", pushed);
        }

        if let SyncOutcome::Success(report) = &outcome {
            for bike_ref in &report.failed_bikes {
                println!("  ! maintenances of {} could not be synced", bike_ref);
            }
        }

        if !self.watch {
            return Ok(());
        }

        println!();
        println!("Watching for changes (Ctrl-C to stop)...");

        let mut outcomes = app.engine.observe_and_sync();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                next = outcomes.next() => match next {
                    // Every pass announces itself; only results are worth printing
                    Some(SyncOutcome::Syncing) => {}
                    Some(SyncOutcome::Success(report)) if !report.changed() && report.is_clean() => {}
                    Some(outcome) => println!("  {}", outcome),
                    None => break,
                },
                _ = &mut ctrl_c => {
                    println!();
                    break;
                }
            }
        }

        println!("Stopped watching.");
        Ok(())
    }

    async fn status(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        let sync = &app.config.sync;

        println!("Sync Configuration");
        println!("==================");
        println!();

        let (Some(server_url), Some(api_key)) = (&sync.server_url, &sync.api_key) else {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    server_url: \"http://localhost:8080\"");
            println!("    api_key: \"your-api-key\"");
            println!("    auto_sync: true");
            println!();
            println!("Or set environment variables:");
            println!("  BIKELOG_SYNC_URL");
            println!("  BIKELOG_SYNC_API_KEY");
            return Ok(());
        };

        println!("Server:    {}", server_url);
        println!(
            "API Key:   {}...",
            api_key.chars().take(8).collect::<String>()
        );
        println!(
            "Auto-sync: {}",
            if sync.auto_sync { "enabled" } else { "disabled" }
        );
        println!();

        match &app.connection {
            Connection::Connected { user_id } => {
                println!("Server status: ✓ connected as {}", user_id)
            }
            Connection::Unreachable(reason) => println!("Server status: ✗ {}", reason),
            Connection::NotConfigured => println!("Server status: not configured"),
        }

        let (bikes, maintenances) = count_unsynced(app).await?;
        println!("Unsynced:      {} bike(s), {} maintenance(s)", bikes, maintenances);

        Ok(())
    }
}

/// Local records that have never reached the server.
async fn count_unsynced(app: &App) -> Result<(usize, usize), Box<dyn std::error::Error>> {
    let bikes = app.bikes.all().await?;
    let mut unsynced_maintenances = 0;
    for bike in &bikes {
        unsynced_maintenances += app
            .maintenances
            .all(bike.id)
            .await?
            .iter()
            .filter(|m| m.remote_ref.is_none())
            .count();
    }
    let unsynced_bikes = bikes.iter().filter(|b| !b.is_synced()).count();
    Ok((unsynced_bikes, unsynced_maintenances))
}

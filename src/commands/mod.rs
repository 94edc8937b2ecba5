mod bike;
mod config_cmd;
mod maintenance;
mod sync_cmd;

pub use bike::BikeCommand;
pub use config_cmd::ConfigCommand;
pub use maintenance::MaintenanceCommand;
pub use sync_cmd::SyncCommand;

use bikelog::config::Config;
use bikelog::db::LocalDb;
use bikelog::models::PENDING_DATE;
use bikelog::remote::{HttpRemoteStore, OfflineRemoteStore};
use bikelog::store::{LocalStore, RemoteStore};
use bikelog::sync::{SyncBikeRepository, SyncEngine, SyncMaintenanceRepository};
use chrono::{NaiveDate, Utc};
use clap::ValueEnum;
use std::sync::Arc;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Result of connecting to the sync server at startup.
#[derive(Debug, Clone)]
pub enum Connection {
    NotConfigured,
    Connected { user_id: String },
    Unreachable(String),
}

/// Everything a data command needs, wired together once per invocation.
pub struct App {
    pub config: Config,
    pub connection: Connection,
    pub engine: SyncEngine,
    pub bikes: SyncBikeRepository,
    pub maintenances: SyncMaintenanceRepository,
}

impl App {
    /// Opens the local database and connects to the sync server when one is
    /// configured. An unreachable server is not an error: the app runs
    /// offline.
    pub async fn open(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let local: Arc<dyn LocalStore> =
            Arc::new(LocalDb::open(config.database_path.value.clone()).await?);

        let (remote, connection): (Arc<dyn RemoteStore>, Connection) =
            match HttpRemoteStore::from_config(&config.sync)? {
                None => (Arc::new(OfflineRemoteStore), Connection::NotConfigured),
                Some(http) => match http.probe().await {
                    Ok(user_id) => (Arc::new(http), Connection::Connected { user_id }),
                    Err(e) => {
                        tracing::warn!("Sync server unavailable, working offline: {}", e);
                        (
                            Arc::new(OfflineRemoteStore),
                            Connection::Unreachable(e.to_string()),
                        )
                    }
                },
            };

        let engine = SyncEngine::new(local.clone(), remote);
        let bikes = SyncBikeRepository::new(local.clone(), engine.clone());
        let maintenances = SyncMaintenanceRepository::new(local, engine.clone());

        Ok(Self {
            config,
            connection,
            engine,
            bikes,
            maintenances,
        })
    }

    /// Pulls remote changes before a read when auto-sync is on. Failures are
    /// only logged so reads keep working offline.
    pub async fn try_auto_sync(&self) {
        if !self.config.sync.auto_sync {
            return;
        }
        match self.engine.pull_once().await {
            Ok(outcome) => tracing::debug!("Auto-sync: {}", outcome),
            Err(e) => tracing::warn!("Auto-sync: {}", e),
        }
    }
}

/// Parses a `YYYY-MM-DD` completion date into milliseconds since the epoch
/// (midnight UTC). The epoch itself marks "not done", so only later dates
/// are accepted.
pub fn parse_date(value: &str) -> Result<i64, String> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}'. Use YYYY-MM-DD", value))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("Invalid date '{}'", value))?;
    let millis = midnight.and_utc().timestamp_millis();
    if millis <= PENDING_DATE {
        return Err(format!(
            "Invalid date '{}'. Completion dates must be after 1970-01-01",
            value
        ));
    }
    Ok(millis)
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Asks for confirmation on stdin.
pub fn confirm(prompt: &str) -> std::io::Result<bool> {
    use std::io::Write;

    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

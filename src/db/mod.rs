//! SQLite-backed local store.
//!
//! [`BikeRepository`] and [`MaintenanceRepository`] are thin query layers.
//! [`LocalDb`] combines them behind the [`LocalStore`] contract and turns
//! their reads into live sequences: every write bumps a change counter and
//! each open list stream re-runs its query when the counter moves.

mod bike_repo;
mod maintenance_repo;

pub use bike_repo::BikeRepository;
pub use maintenance_repo::MaintenanceRepository;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::StoreError;
use crate::models::{Bike, Maintenance};
use crate::store::{LocalStore, RecordStream};

/// Initialize the database connection pool and run migrations
pub async fn init_db(db_path: PathBuf) -> Result<SqlitePool, sqlx::Error> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// The on-device store.
#[derive(Clone)]
pub struct LocalDb {
    pool: SqlitePool,
    changes: Arc<watch::Sender<u64>>,
}

impl LocalDb {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            pool,
            changes: Arc::new(changes),
        }
    }

    /// Opens (creating if needed) the database at `db_path`.
    pub async fn open(db_path: PathBuf) -> Result<Self, StoreError> {
        Ok(Self::new(init_db(db_path).await?))
    }

    fn bikes(&self) -> BikeRepository {
        BikeRepository::new(self.pool.clone())
    }

    fn maintenances(&self) -> MaintenanceRepository {
        MaintenanceRepository::new(self.pool.clone())
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }
}

#[async_trait]
impl LocalStore for LocalDb {
    fn list_bikes(&self) -> RecordStream<Bike, StoreError> {
        let repo = self.bikes();
        let mut changes = self.changes.subscribe();

        Box::pin(async_stream::stream! {
            loop {
                changes.borrow_and_update();
                yield repo.list().await.map_err(StoreError::from);
                if changes.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    async fn get_bike(&self, id: i64) -> Result<Option<Bike>, StoreError> {
        Ok(self.bikes().get_by_id(id).await?)
    }

    async fn insert_bike(&self, bike: &Bike) -> Result<i64, StoreError> {
        let id = self.bikes().create(bike).await?;
        self.notify();
        Ok(id)
    }

    async fn update_bike(&self, bike: &Bike) -> Result<(), StoreError> {
        self.bikes().update(bike).await?;
        self.notify();
        Ok(())
    }

    async fn delete_bike(&self, id: i64) -> Result<(), StoreError> {
        self.bikes().delete(id).await?;
        self.notify();
        Ok(())
    }

    fn list_maintenances(&self, bike_id: i64) -> RecordStream<Maintenance, StoreError> {
        let repo = self.maintenances();
        let mut changes = self.changes.subscribe();

        Box::pin(async_stream::stream! {
            loop {
                changes.borrow_and_update();
                yield repo.list_for_bike(bike_id).await.map_err(StoreError::from);
                if changes.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    async fn get_maintenance(&self, id: i64) -> Result<Option<Maintenance>, StoreError> {
        Ok(self.maintenances().get_by_id(id).await?)
    }

    async fn insert_maintenance(&self, maintenance: &Maintenance) -> Result<i64, StoreError> {
        let id = self.maintenances().create(maintenance).await?;
        self.notify();
        Ok(id)
    }

    async fn update_maintenance(&self, maintenance: &Maintenance) -> Result<(), StoreError> {
        self.maintenances().update(maintenance).await?;
        self.notify();
        Ok(())
    }

    async fn delete_maintenance(&self, id: i64) -> Result<(), StoreError> {
        self.maintenances().delete(id).await?;
        self.notify();
        Ok(())
    }
}

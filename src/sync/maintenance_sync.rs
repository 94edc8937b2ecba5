//! Local-first maintenance repository.

use futures::StreamExt;
use std::sync::Arc;

use super::engine::SyncEngine;
use crate::error::{StoreError, ValidationError};
use crate::models::Maintenance;
use crate::store::{LocalStore, RecordStream};

/// Error type for sync maintenance operations.
#[derive(Debug)]
pub enum SyncMaintenanceError {
    /// Input rejected before any write.
    Validation(ValidationError),
    /// Local store failure.
    Store(StoreError),
    /// Maintenance not found.
    NotFound(i64),
    /// Owning bike not found.
    BikeNotFound(i64),
}

impl std::fmt::Display for SyncMaintenanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMaintenanceError::Validation(e) => write!(f, "{}", e),
            SyncMaintenanceError::Store(e) => write!(f, "{}", e),
            SyncMaintenanceError::NotFound(id) => write!(f, "Maintenance not found: {}", id),
            SyncMaintenanceError::BikeNotFound(id) => write!(f, "Bike not found: {}", id),
        }
    }
}

impl std::error::Error for SyncMaintenanceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncMaintenanceError::Validation(e) => Some(e),
            SyncMaintenanceError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for SyncMaintenanceError {
    fn from(e: ValidationError) -> Self {
        SyncMaintenanceError::Validation(e)
    }
}

impl From<StoreError> for SyncMaintenanceError {
    fn from(e: StoreError) -> Self {
        SyncMaintenanceError::Store(e)
    }
}

/// Sync-aware maintenance repository.
#[derive(Clone)]
pub struct SyncMaintenanceRepository {
    local: Arc<dyn LocalStore>,
    engine: SyncEngine,
}

impl SyncMaintenanceRepository {
    pub fn new(local: Arc<dyn LocalStore>, engine: SyncEngine) -> Self {
        Self { local, engine }
    }

    /// Live list of one bike's maintenances.
    pub fn list(&self, bike_id: i64) -> RecordStream<Maintenance, StoreError> {
        self.local.list_maintenances(bike_id)
    }

    pub async fn all(&self, bike_id: i64) -> Result<Vec<Maintenance>, SyncMaintenanceError> {
        match self.local.list_maintenances(bike_id).next().await {
            Some(result) => Ok(result?),
            None => Err(SyncMaintenanceError::Store(StoreError::Closed)),
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<Maintenance>, SyncMaintenanceError> {
        Ok(self.local.get_maintenance(id).await?)
    }

    /// Creates a maintenance under an existing bike and pushes it when
    /// connected.
    pub async fn create(
        &self,
        maintenance: &Maintenance,
    ) -> Result<Maintenance, SyncMaintenanceError> {
        maintenance.validate()?;

        if self.local.get_bike(maintenance.bike_id).await?.is_none() {
            return Err(SyncMaintenanceError::BikeNotFound(maintenance.bike_id));
        }

        let mut created = maintenance.clone();
        created.name = created.name.trim().to_string();
        created.remote_ref = None;
        created.id = self.local.insert_maintenance(&created).await?;
        tracing::debug!(
            "Created maintenance {} ({}) for bike {}",
            created.id,
            created.name,
            created.bike_id
        );

        self.engine.push_maintenance(&created).await?;
        self.reload(created.id).await
    }

    /// Replaces a maintenance's fields. The stored remote ref and owning bike
    /// are kept.
    pub async fn update(
        &self,
        maintenance: &Maintenance,
    ) -> Result<Maintenance, SyncMaintenanceError> {
        maintenance.validate()?;

        let existing = self
            .local
            .get_maintenance(maintenance.id)
            .await?
            .ok_or(SyncMaintenanceError::NotFound(maintenance.id))?;

        let updated = Maintenance {
            id: existing.id,
            remote_ref: existing.remote_ref,
            name: maintenance.name.trim().to_string(),
            value: maintenance.value,
            date: maintenance.date,
            is_done: maintenance.is_done,
            bike_id: existing.bike_id,
        };
        self.local.update_maintenance(&updated).await?;

        self.engine.push_maintenance(&updated).await?;
        self.reload(updated.id).await
    }

    /// Marks a maintenance as done at `value` on `date` (ms since epoch).
    pub async fn mark_done(
        &self,
        id: i64,
        value: f64,
        date: i64,
    ) -> Result<Maintenance, SyncMaintenanceError> {
        let existing = self
            .local
            .get_maintenance(id)
            .await?
            .ok_or(SyncMaintenanceError::NotFound(id))?;

        self.update(&existing.mark_done(value, date)).await
    }

    /// Deletes a maintenance locally, then its remote copy when both it and
    /// its bike are synced.
    pub async fn delete(&self, id: i64) -> Result<Maintenance, SyncMaintenanceError> {
        let maintenance = self
            .local
            .get_maintenance(id)
            .await?
            .ok_or(SyncMaintenanceError::NotFound(id))?;
        let parent = self.local.get_bike(maintenance.bike_id).await?;

        self.local.delete_maintenance(id).await?;

        if let Some(bike_ref) = parent.and_then(|b| b.remote_ref) {
            self.engine
                .delete_remote_maintenance(&maintenance, &bike_ref)
                .await;
        }

        Ok(maintenance)
    }

    async fn reload(&self, id: i64) -> Result<Maintenance, SyncMaintenanceError> {
        self.local
            .get_maintenance(id)
            .await?
            .ok_or(SyncMaintenanceError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_test_db;
    use crate::models::{Bike, CountingMethod};
    use crate::remote::{MemoryRemoteStore, OfflineRemoteStore};
    use crate::store::RemoteStore;
    use tempfile::TempDir;

    struct TestContext {
        local: Arc<dyn LocalStore>,
        repo: SyncMaintenanceRepository,
        _temp_dir: TempDir,
    }

    async fn setup(remote: Arc<dyn RemoteStore>) -> TestContext {
        let (db, temp_dir) = open_test_db().await;
        let local: Arc<dyn LocalStore> = Arc::new(db);
        let engine = SyncEngine::new(local.clone(), remote);
        TestContext {
            local: local.clone(),
            repo: SyncMaintenanceRepository::new(local, engine),
            _temp_dir: temp_dir,
        }
    }

    async fn insert_bike(ctx: &TestContext, name: &str) -> i64 {
        ctx.local
            .insert_bike(&Bike::new(name, CountingMethod::Distance))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_todo_offline() {
        let ctx = setup(Arc::new(OfflineRemoteStore)).await;
        let bike_id = insert_bike(&ctx, "MT-07").await;

        let created = ctx
            .repo
            .create(&Maintenance::todo(bike_id, "Chain"))
            .await
            .unwrap();

        assert!(created.id > 0);
        assert!(!created.is_done);
        assert!(created.remote_ref.is_none());
        assert_eq!(ctx.repo.all(bike_id).await.unwrap(), vec![created]);
    }

    #[tokio::test]
    async fn test_create_requires_existing_bike() {
        let ctx = setup(Arc::new(OfflineRemoteStore)).await;

        let result = ctx.repo.create(&Maintenance::todo(99, "Chain")).await;

        assert!(matches!(result, Err(SyncMaintenanceError::BikeNotFound(99))));
    }

    #[tokio::test]
    async fn test_create_validates_before_writing() {
        let ctx = setup(Arc::new(OfflineRemoteStore)).await;
        let bike_id = insert_bike(&ctx, "MT-07").await;

        let negative = Maintenance::done(bike_id, "Oil", -5.0, 1_700_000_000_000);
        assert!(matches!(
            ctx.repo.create(&negative).await,
            Err(SyncMaintenanceError::Validation(ValidationError::NegativeValue(_)))
        ));
        assert!(ctx.repo.all(bike_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_pushes_under_bike_ref() {
        let remote = Arc::new(MemoryRemoteStore::new("rider"));
        let ctx = setup(remote.clone()).await;
        let bike_id = insert_bike(&ctx, "MT-07").await;

        let created = ctx
            .repo
            .create(&Maintenance::done(bike_id, "Oil", 5000.0, 1_700_000_000_000))
            .await
            .unwrap();

        // The bike had never been pushed, so it went first
        let bike = ctx.local.get_bike(bike_id).await.unwrap().unwrap();
        let bike_ref = bike.remote_ref.expect("parent pushed");
        let remote_maintenances = remote.maintenances(&bike_ref);
        assert_eq!(remote_maintenances.len(), 1);
        assert_eq!(created.remote_ref, remote_maintenances[0].remote_ref);
    }

    #[tokio::test]
    async fn test_mark_done_updates_remote() {
        let remote = Arc::new(MemoryRemoteStore::new("rider"));
        let ctx = setup(remote.clone()).await;
        let bike_id = insert_bike(&ctx, "MT-07").await;
        let created = ctx
            .repo
            .create(&Maintenance::todo(bike_id, "Chain"))
            .await
            .unwrap();

        let done = ctx
            .repo
            .mark_done(created.id, 12000.0, 1_700_000_000_000)
            .await
            .unwrap();

        assert!(done.is_done);
        assert_eq!(done.remote_ref, created.remote_ref);
        let bike_ref = ctx
            .local
            .get_bike(bike_id)
            .await
            .unwrap()
            .unwrap()
            .remote_ref
            .unwrap();
        let remote_maintenances = remote.maintenances(&bike_ref);
        assert_eq!(remote_maintenances.len(), 1);
        assert!(remote_maintenances[0].is_done);
        assert_eq!(remote_maintenances[0].value, 12000.0);
    }

    #[tokio::test]
    async fn test_mark_done_requires_date() {
        let ctx = setup(Arc::new(OfflineRemoteStore)).await;
        let bike_id = insert_bike(&ctx, "MT-07").await;
        let created = ctx
            .repo
            .create(&Maintenance::todo(bike_id, "Chain"))
            .await
            .unwrap();

        let result = ctx.repo.mark_done(created.id, 100.0, 0).await;

        assert!(matches!(
            result,
            Err(SyncMaintenanceError::Validation(ValidationError::MissingDate))
        ));
        assert!(!ctx.repo.get(created.id).await.unwrap().unwrap().is_done);
    }

    #[tokio::test]
    async fn test_delete_removes_remote_copy() {
        let remote = Arc::new(MemoryRemoteStore::new("rider"));
        let ctx = setup(remote.clone()).await;
        let bike_id = insert_bike(&ctx, "MT-07").await;
        let created = ctx
            .repo
            .create(&Maintenance::todo(bike_id, "Chain"))
            .await
            .unwrap();

        ctx.repo.delete(created.id).await.unwrap();

        assert!(ctx.repo.get(created.id).await.unwrap().is_none());
        let bike_ref = ctx
            .local
            .get_bike(bike_id)
            .await
            .unwrap()
            .unwrap()
            .remote_ref
            .unwrap();
        assert!(remote.maintenances(&bike_ref).is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let ctx = setup(Arc::new(OfflineRemoteStore)).await;

        assert!(matches!(
            ctx.repo.delete(7).await,
            Err(SyncMaintenanceError::NotFound(7))
        ));
    }
}

//! Local-first bike repository.
//!
//! Reads come from the local store. Writes land locally first and are then
//! mirrored to the remote store by the sync engine.

use futures::StreamExt;
use std::sync::Arc;

use super::engine::SyncEngine;
use crate::error::{StoreError, ValidationError};
use crate::models::{Bike, CountingMethod};
use crate::store::{LocalStore, RecordStream};

/// Error type for sync bike operations.
#[derive(Debug)]
pub enum SyncBikeError {
    /// Input rejected before any write.
    Validation(ValidationError),
    /// Local store failure.
    Store(StoreError),
    /// Bike not found.
    NotFound(i64),
}

impl std::fmt::Display for SyncBikeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncBikeError::Validation(e) => write!(f, "{}", e),
            SyncBikeError::Store(e) => write!(f, "{}", e),
            SyncBikeError::NotFound(id) => write!(f, "Bike not found: {}", id),
        }
    }
}

impl std::error::Error for SyncBikeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncBikeError::Validation(e) => Some(e),
            SyncBikeError::Store(e) => Some(e),
            SyncBikeError::NotFound(_) => None,
        }
    }
}

impl From<ValidationError> for SyncBikeError {
    fn from(e: ValidationError) -> Self {
        SyncBikeError::Validation(e)
    }
}

impl From<StoreError> for SyncBikeError {
    fn from(e: StoreError) -> Self {
        SyncBikeError::Store(e)
    }
}

/// Sync-aware bike repository.
#[derive(Clone)]
pub struct SyncBikeRepository {
    local: Arc<dyn LocalStore>,
    engine: SyncEngine,
}

impl SyncBikeRepository {
    pub fn new(local: Arc<dyn LocalStore>, engine: SyncEngine) -> Self {
        Self { local, engine }
    }

    /// Live list of all bikes.
    pub fn list(&self) -> RecordStream<Bike, StoreError> {
        self.local.list_bikes()
    }

    /// Current list of all bikes.
    pub async fn all(&self) -> Result<Vec<Bike>, SyncBikeError> {
        match self.local.list_bikes().next().await {
            Some(result) => Ok(result?),
            None => Err(SyncBikeError::Store(StoreError::Closed)),
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<Bike>, SyncBikeError> {
        Ok(self.local.get_bike(id).await?)
    }

    /// Finds a bike by local id or, failing that, by name (case-insensitive).
    pub async fn find(&self, identifier: &str) -> Result<Option<Bike>, SyncBikeError> {
        if let Ok(id) = identifier.parse::<i64>() {
            if let Some(bike) = self.get(id).await? {
                return Ok(Some(bike));
            }
        }

        let bikes = self.all().await?;
        Ok(bikes
            .into_iter()
            .find(|b| b.name.eq_ignore_ascii_case(identifier)))
    }

    /// Creates a bike locally and pushes it when connected.
    pub async fn create(
        &self,
        name: &str,
        counting_method: CountingMethod,
    ) -> Result<Bike, SyncBikeError> {
        let mut bike = Bike::new(name.trim(), counting_method);
        bike.validate()?;

        bike.id = self.local.insert_bike(&bike).await?;
        tracing::debug!("Created bike {} ({})", bike.id, bike.name);

        self.engine.push_bike(&bike).await?;
        self.reload(bike.id).await
    }

    /// Replaces a bike's editable fields. The stored remote ref is kept.
    pub async fn update(&self, bike: &Bike) -> Result<Bike, SyncBikeError> {
        bike.validate()?;

        let existing = self
            .local
            .get_bike(bike.id)
            .await?
            .ok_or(SyncBikeError::NotFound(bike.id))?;

        let updated = Bike {
            id: existing.id,
            remote_ref: existing.remote_ref,
            name: bike.name.trim().to_string(),
            counting_method: bike.counting_method,
        };
        self.local.update_bike(&updated).await?;

        self.engine.push_bike(&updated).await?;
        self.reload(updated.id).await
    }

    /// Deletes a bike and its maintenances, locally and then remotely.
    pub async fn delete(&self, id: i64) -> Result<Bike, SyncBikeError> {
        let bike = self
            .local
            .get_bike(id)
            .await?
            .ok_or(SyncBikeError::NotFound(id))?;

        self.local.delete_bike(id).await?;
        self.engine.delete_remote_bike(&bike).await;

        Ok(bike)
    }

    async fn reload(&self, id: i64) -> Result<Bike, SyncBikeError> {
        self.local
            .get_bike(id)
            .await?
            .ok_or(SyncBikeError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_test_db;
    use crate::remote::{MemoryRemoteStore, OfflineRemoteStore};
    use crate::store::RemoteStore;
    use tempfile::TempDir;

    async fn setup(remote: Arc<dyn RemoteStore>) -> (SyncBikeRepository, TempDir) {
        let (db, temp_dir) = open_test_db().await;
        let local: Arc<dyn LocalStore> = Arc::new(db);
        let engine = SyncEngine::new(local.clone(), remote);
        (SyncBikeRepository::new(local, engine), temp_dir)
    }

    #[tokio::test]
    async fn test_create_pushes_and_stores_ref() {
        let remote = Arc::new(MemoryRemoteStore::new("rider"));
        let (repo, _temp) = setup(remote.clone()).await;

        let bike = repo.create("MT-07", CountingMethod::Distance).await.unwrap();

        assert!(bike.id > 0);
        let remote_bikes = remote.bikes();
        assert_eq!(remote_bikes.len(), 1);
        assert_eq!(bike.remote_ref, remote_bikes[0].remote_ref);
    }

    #[tokio::test]
    async fn test_create_offline_keeps_local_copy() {
        let (repo, _temp) = setup(Arc::new(OfflineRemoteStore)).await;

        let bike = repo.create("MT-07", CountingMethod::Distance).await.unwrap();

        assert!(bike.remote_ref.is_none());
        assert_eq!(repo.all().await.unwrap(), vec![bike]);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name_without_writes() {
        let remote = Arc::new(MemoryRemoteStore::new("rider"));
        let (repo, _temp) = setup(remote.clone()).await;

        let result = repo.create("   ", CountingMethod::Hours).await;

        assert!(matches!(
            result,
            Err(SyncBikeError::Validation(ValidationError::BlankName(_)))
        ));
        assert!(repo.all().await.unwrap().is_empty());
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_update_keeps_remote_ref() {
        let remote = Arc::new(MemoryRemoteStore::new("rider"));
        let (repo, _temp) = setup(remote.clone()).await;
        let bike = repo.create("MT-07", CountingMethod::Distance).await.unwrap();

        let mut edited = bike.clone();
        edited.name = "MT-07 Tracer".to_string();
        edited.remote_ref = None;
        let updated = repo.update(&edited).await.unwrap();

        assert_eq!(updated.remote_ref, bike.remote_ref);
        assert_eq!(updated.name, "MT-07 Tracer");
        assert_eq!(remote.bikes()[0].name, "MT-07 Tracer");
        assert_eq!(remote.bikes().len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_bike() {
        let (repo, _temp) = setup(Arc::new(OfflineRemoteStore)).await;

        let mut ghost = Bike::new("Ghost", CountingMethod::Distance);
        ghost.id = 42;
        let result = repo.update(&ghost).await;

        assert!(matches!(result, Err(SyncBikeError::NotFound(42))));
    }

    #[tokio::test]
    async fn test_find_by_id_or_name() {
        let (repo, _temp) = setup(Arc::new(OfflineRemoteStore)).await;
        let bike = repo.create("MT-07", CountingMethod::Distance).await.unwrap();

        assert_eq!(repo.find(&bike.id.to_string()).await.unwrap(), Some(bike.clone()));
        assert_eq!(repo.find("mt-07").await.unwrap(), Some(bike));
        assert_eq!(repo.find("CRF").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_removes_remote_copy() {
        let remote = Arc::new(MemoryRemoteStore::new("rider"));
        let (repo, _temp) = setup(remote.clone()).await;
        let bike = repo.create("MT-07", CountingMethod::Distance).await.unwrap();

        let deleted = repo.delete(bike.id).await.unwrap();

        assert_eq!(deleted.id, bike.id);
        assert!(repo.all().await.unwrap().is_empty());
        assert!(remote.bikes().is_empty());
    }

    #[tokio::test]
    async fn test_delete_succeeds_when_remote_fails() {
        let remote = Arc::new(MemoryRemoteStore::new("rider"));
        let (repo, _temp) = setup(remote.clone()).await;
        let bike = repo.create("MT-07", CountingMethod::Distance).await.unwrap();

        remote.fail_pushes(true);
        repo.delete(bike.id).await.unwrap();

        assert!(repo.all().await.unwrap().is_empty());
        assert_eq!(remote.bikes().len(), 1);
    }
}

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::models::{Bike, Maintenance};
use crate::store::{RecordStream, RemoteStore};

/// Remote store used when sync is not configured. Never connected, so the
/// engine skips all remote work.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRemoteStore;

#[async_trait]
impl RemoteStore for OfflineRemoteStore {
    async fn is_connected(&self) -> bool {
        false
    }

    fn current_user_id(&self) -> Option<String> {
        None
    }

    async fn push_bike(&self, _bike: &Bike) -> Result<String, RemoteError> {
        Err(RemoteError::NotConnected)
    }

    async fn push_maintenance(
        &self,
        _maintenance: &Maintenance,
        _bike_ref: &str,
    ) -> Result<String, RemoteError> {
        Err(RemoteError::NotConnected)
    }

    async fn delete_bike(&self, _remote_ref: &str) -> Result<(), RemoteError> {
        Err(RemoteError::NotConnected)
    }

    async fn delete_maintenance(
        &self,
        _bike_ref: &str,
        _remote_ref: &str,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::NotConnected)
    }

    fn observe_bikes(&self) -> RecordStream<Bike, RemoteError> {
        Box::pin(futures::stream::once(async { Err(RemoteError::NotConnected) }))
    }

    fn observe_maintenances(&self, _bike_ref: &str) -> RecordStream<Maintenance, RemoteError> {
        Box::pin(futures::stream::once(async { Err(RemoteError::NotConnected) }))
    }
}

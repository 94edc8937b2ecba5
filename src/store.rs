//! Contracts between the sync engine and the two stores it reconciles.
//!
//! Reads that the application renders from are *live*: they return a stream
//! that yields the complete current collection on subscription and again after
//! every change. Dropping the stream ends the subscription.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{RemoteError, StoreError};
use crate::models::{Bike, Maintenance};

/// A live sequence of full collection snapshots.
pub type RecordStream<T, E> = BoxStream<'static, Result<Vec<T>, E>>;

/// On-device persistence. Source of truth for everything the user sees.
#[async_trait]
pub trait LocalStore: Send + Sync {
    fn list_bikes(&self) -> RecordStream<Bike, StoreError>;

    async fn get_bike(&self, id: i64) -> Result<Option<Bike>, StoreError>;

    /// Inserts the bike as given (including its remote ref) and returns the
    /// assigned local id.
    async fn insert_bike(&self, bike: &Bike) -> Result<i64, StoreError>;

    /// Full replace by local id.
    async fn update_bike(&self, bike: &Bike) -> Result<(), StoreError>;

    /// Deletes the bike and every maintenance that belongs to it.
    async fn delete_bike(&self, id: i64) -> Result<(), StoreError>;

    fn list_maintenances(&self, bike_id: i64) -> RecordStream<Maintenance, StoreError>;

    async fn get_maintenance(&self, id: i64) -> Result<Option<Maintenance>, StoreError>;

    async fn insert_maintenance(&self, maintenance: &Maintenance) -> Result<i64, StoreError>;

    async fn update_maintenance(&self, maintenance: &Maintenance) -> Result<(), StoreError>;

    async fn delete_maintenance(&self, id: i64) -> Result<(), StoreError>;
}

/// Shared live store, keyed by server-assigned references.
///
/// Records yielded by the observe streams carry their reference in
/// `remote_ref` and have no meaningful local id.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cached connection state. Never performs I/O.
    async fn is_connected(&self) -> bool;

    fn current_user_id(&self) -> Option<String>;

    /// Tries to re-establish a lost connection and returns the resulting
    /// state. Stores without a handshake just report their cached state.
    async fn reconnect(&self) -> bool {
        self.is_connected().await
    }

    /// Creates the bike when it has no reference yet, otherwise overwrites
    /// the record at its reference. Returns the reference.
    async fn push_bike(&self, bike: &Bike) -> Result<String, RemoteError>;

    async fn push_maintenance(
        &self,
        maintenance: &Maintenance,
        bike_ref: &str,
    ) -> Result<String, RemoteError>;

    async fn delete_bike(&self, remote_ref: &str) -> Result<(), RemoteError>;

    async fn delete_maintenance(&self, bike_ref: &str, remote_ref: &str)
        -> Result<(), RemoteError>;

    fn observe_bikes(&self) -> RecordStream<Bike, RemoteError>;

    fn observe_maintenances(&self, bike_ref: &str) -> RecordStream<Maintenance, RemoteError>;
}

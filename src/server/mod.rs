//! Server-side modules for the bikelog sync server.

pub mod api;
pub mod auth;
pub mod hub;
pub mod storage;

pub use api::{router, ApiError, AppState};
pub use auth::{ApiKeyEntry, ApiKeyStore, AuthUser};
pub use hub::{Channel, SyncHub};
pub use storage::{ServerStorage, ServerStorageError, UserCollections};

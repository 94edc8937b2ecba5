//! Offline-first synchronization.
//!
//! The local store is the source of truth for everything the user sees. The
//! [`SyncEngine`] mirrors local writes to the remote store (push-on-write) and
//! merges records created elsewhere into the local store, keyed by their
//! remote reference so a record is never inserted twice.
//!
//! The repositories are the read/write surface for the application: they
//! validate, write locally, then let the engine push.

pub mod bike_sync;
pub mod engine;
pub mod maintenance_sync;
pub mod outcome;

pub use bike_sync::{SyncBikeError, SyncBikeRepository};
pub use engine::{SyncEngine, DEFAULT_RESUBSCRIBE_DELAY};
pub use maintenance_sync::{SyncMaintenanceError, SyncMaintenanceRepository};
pub use outcome::{MergeReport, SyncOutcome};

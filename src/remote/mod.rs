//! Remote store implementations.
//!
//! - [`HttpRemoteStore`] talks to `bikelog-server`.
//! - [`MemoryRemoteStore`] keeps everything in process.
//! - [`OfflineRemoteStore`] is used when sync is not configured.

pub mod http;
pub mod memory;
pub mod offline;
pub mod wire;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;
pub use offline::OfflineRemoteStore;

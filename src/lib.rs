//! Offline-first maintenance log for bikes.
//!
//! The local SQLite database is the source of truth for everything the user
//! sees. A [`sync::SyncEngine`] reconciles it with a remote document store:
//! writes go local first and are pushed best-effort, and remote snapshots are
//! merged back in by remote reference.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod server;
pub mod store;
pub mod sync;

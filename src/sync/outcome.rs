use serde::Serialize;
use std::fmt;

use crate::error::{AppError, SyncError};

/// What a single merge pass changed locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub bikes_inserted: usize,
    pub maintenances_inserted: usize,
    /// Remote refs of bikes whose maintenances could not be reconciled.
    pub failed_bikes: Vec<String>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.failed_bikes.is_empty()
    }

    pub fn changed(&self) -> bool {
        self.bikes_inserted > 0 || self.maintenances_inserted > 0
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bike{} and {} maintenance{} added",
            self.bikes_inserted,
            if self.bikes_inserted == 1 { "" } else { "s" },
            self.maintenances_inserted,
            if self.maintenances_inserted == 1 { "" } else { "s" },
        )?;
        if !self.failed_bikes.is_empty() {
            write!(f, ", {} bike(s) skipped", self.failed_bikes.len())?;
        }
        Ok(())
    }
}

/// Status of a reconciliation, for display only.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    NotConnected,
    Syncing,
    Success(MergeReport),
    Error(String),
}

impl SyncOutcome {
    pub fn from_error(err: &SyncError) -> Self {
        SyncOutcome::Error(AppError::classify(err).to_string())
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::NotConnected => write!(f, "offline"),
            SyncOutcome::Syncing => write!(f, "syncing..."),
            SyncOutcome::Success(report) => write!(f, "synced: {}", report),
            SyncOutcome::Error(message) => write!(f, "sync failed: {}", message),
        }
    }
}

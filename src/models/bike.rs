use serde::{Deserialize, Serialize};
use std::fmt;

use super::counting_method::CountingMethod;
use crate::error::ValidationError;

/// Local id of a record that has not been inserted yet.
pub const UNSAVED_ID: i64 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bike {
    pub id: i64,
    pub remote_ref: Option<String>,
    pub name: String,
    pub counting_method: CountingMethod,
}

impl Bike {
    pub fn new(name: impl Into<String>, counting_method: CountingMethod) -> Self {
        Self {
            id: UNSAVED_ID,
            remote_ref: None,
            name: name.into(),
            counting_method,
        }
    }

    pub fn with_remote_ref(mut self, remote_ref: impl Into<String>) -> Self {
        self.remote_ref = Some(remote_ref.into());
        self
    }

    pub fn is_synced(&self) -> bool {
        self.remote_ref.is_some()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankName("bike"));
        }
        Ok(())
    }
}

impl fmt::Display for Bike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.len()))?;
        writeln!(f, "ID: {}", self.id)?;
        writeln!(f, "Counting: {}", self.counting_method)?;
        match &self.remote_ref {
            Some(remote_ref) => writeln!(f, "Synced: {}", remote_ref)?,
            None => writeln!(f, "Synced: no")?,
        }
        Ok(())
    }
}

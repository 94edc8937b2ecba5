use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::bike::UNSAVED_ID;
use crate::error::ValidationError;

/// Value stored for a maintenance that has not been done yet.
pub const PENDING_VALUE: f64 = -1.0;

/// Date stored for a maintenance that has not been done yet.
pub const PENDING_DATE: i64 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maintenance {
    pub id: i64,
    pub remote_ref: Option<String>,
    pub name: String,
    /// Odometer or hour-meter reading at completion.
    pub value: f64,
    /// Completion time in milliseconds since the Unix epoch.
    pub date: i64,
    pub is_done: bool,
    pub bike_id: i64,
}

impl Maintenance {
    /// A pending maintenance item.
    pub fn todo(bike_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: UNSAVED_ID,
            remote_ref: None,
            name: name.into(),
            value: PENDING_VALUE,
            date: PENDING_DATE,
            is_done: false,
            bike_id,
        }
    }

    /// A maintenance completed at `value`, on `date` (ms since epoch).
    pub fn done(bike_id: i64, name: impl Into<String>, value: f64, date: i64) -> Self {
        Self::todo(bike_id, name).mark_done(value, date)
    }

    pub fn mark_done(mut self, value: f64, date: i64) -> Self {
        self.value = value;
        self.date = date;
        self.is_done = true;
        self
    }

    pub fn with_remote_ref(mut self, remote_ref: impl Into<String>) -> Self {
        self.remote_ref = Some(remote_ref.into());
        self
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        if !self.is_done || self.date == PENDING_DATE {
            return None;
        }
        DateTime::from_timestamp_millis(self.date)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankName("maintenance"));
        }
        if self.is_done {
            if !self.value.is_finite() {
                return Err(ValidationError::NonFiniteValue(self.value));
            }
            if self.value < 0.0 {
                return Err(ValidationError::NegativeValue(self.value));
            }
            if self.date <= PENDING_DATE {
                return Err(ValidationError::MissingDate);
            }
        }
        Ok(())
    }
}

impl fmt::Display for Maintenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.completed_at() {
            Some(at) => write!(
                f,
                "[x] {} ({}) at {} on {}",
                self.name,
                self.id,
                self.value,
                at.format("%Y-%m-%d")
            ),
            None => write!(f, "[ ] {} ({})", self.name, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maintenance_todo_uses_sentinels() {
        let m = Maintenance::todo(3, "Chain");

        assert_eq!(m.bike_id, 3);
        assert_eq!(m.value, PENDING_VALUE);
        assert_eq!(m.date, PENDING_DATE);
        assert!(!m.is_done);
        assert!(m.completed_at().is_none());
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_maintenance_mark_done() {
        let m = Maintenance::todo(1, "Oil").mark_done(5000.0, 1_735_689_600_000);

        assert!(m.is_done);
        assert_eq!(m.value, 5000.0);
        assert_eq!(
            m.completed_at().unwrap().format("%Y-%m-%d").to_string(),
            "2025-01-01"
        );
    }

    #[test]
    fn test_maintenance_validate() {
        assert_eq!(
            Maintenance::todo(1, "").validate(),
            Err(ValidationError::BlankName("maintenance"))
        );
        assert_eq!(
            Maintenance::done(1, "Oil", -5.0, 1).validate(),
            Err(ValidationError::NegativeValue(-5.0))
        );
        assert_eq!(
            Maintenance::done(1, "Oil", 10.0, 0).validate(),
            Err(ValidationError::MissingDate)
        );
        assert!(Maintenance::done(1, "Oil", 0.0, 1).validate().is_ok());
    }

    #[test]
    fn test_maintenance_validate_rejects_non_finite_values() {
        assert!(matches!(
            Maintenance::done(1, "Oil", f64::NAN, 1).validate(),
            Err(ValidationError::NonFiniteValue(v)) if v.is_nan()
        ));
        assert_eq!(
            Maintenance::done(1, "Oil", f64::INFINITY, 1).validate(),
            Err(ValidationError::NonFiniteValue(f64::INFINITY))
        );
        // Pending items carry the sentinel and are not checked
        assert!(Maintenance::todo(1, "Oil").validate().is_ok());
    }

    #[test]
    fn test_maintenance_display() {
        let pending = Maintenance::todo(1, "Brake pads");
        assert!(format!("{}", pending).starts_with("[ ] Brake pads"));

        let done = Maintenance::done(1, "Oil", 5000.0, 1_735_689_600_000);
        let output = format!("{}", done);
        assert!(output.starts_with("[x] Oil"));
        assert!(output.contains("2025-01-01"));
    }
}

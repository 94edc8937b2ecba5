//! Server-side collection storage.
//!
//! Each user's collections live in one JSON file:
//! ```text
//! <DATA_DIR>/
//!   <user_id>/
//!     collections.json
//! ```
//!
//! Writes go to a temp file that is renamed over the original.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::remote::wire::{BikeCollection, MaintenanceCollection};

const COLLECTIONS_FILE: &str = "collections.json";

/// Everything stored for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserCollections {
    #[serde(default)]
    pub bikes: BikeCollection,
    /// Maintenance collections keyed by the owning bike's ref.
    #[serde(default)]
    pub maintenances: BTreeMap<String, MaintenanceCollection>,
}

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum ServerStorageError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// Stored file is not valid JSON for the expected shape.
    ParseError(PathBuf, serde_json::Error),
    /// Invalid user ID (e.g., contains path separators).
    InvalidUserId(String),
}

impl std::fmt::Display for ServerStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            ServerStorageError::ParseError(path, e) => {
                write!(f, "Failed to parse {}: {}", path.display(), e)
            }
            ServerStorageError::InvalidUserId(id) => {
                write!(f, "Invalid user ID: {}", id)
            }
        }
    }
}

impl std::error::Error for ServerStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerStorageError::IoError(_, e) => Some(e),
            ServerStorageError::ParseError(_, e) => Some(e),
            ServerStorageError::InvalidUserId(_) => None,
        }
    }
}

/// Server-side storage for per-user collections.
#[derive(Debug, Clone)]
pub struct ServerStorage {
    data_dir: PathBuf,
}

impl ServerStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Validates a user ID to prevent path traversal attacks.
    fn validate_user_id(user_id: &str) -> Result<(), ServerStorageError> {
        if user_id.is_empty()
            || user_id.contains('/')
            || user_id.contains('\\')
            || user_id.contains("..")
            || user_id.starts_with('.')
        {
            return Err(ServerStorageError::InvalidUserId(user_id.to_string()));
        }
        Ok(())
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(user_id)
    }

    fn collections_path(&self, user_id: &str) -> PathBuf {
        self.user_dir(user_id).join(COLLECTIONS_FILE)
    }

    /// Loads a user's collections. A user with no file yet has empty ones.
    pub fn load(&self, user_id: &str) -> Result<UserCollections, ServerStorageError> {
        Self::validate_user_id(user_id)?;

        let path = self.collections_path(user_id);
        match fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| ServerStorageError::ParseError(path, e))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(UserCollections::default()),
            Err(e) => Err(ServerStorageError::IoError(path, e)),
        }
    }

    /// Saves a user's collections, creating the user directory if needed.
    pub fn save(
        &self,
        user_id: &str,
        collections: &UserCollections,
    ) -> Result<(), ServerStorageError> {
        Self::validate_user_id(user_id)?;

        let user_dir = self.user_dir(user_id);
        let path = self.collections_path(user_id);

        fs::create_dir_all(&user_dir)
            .map_err(|e| ServerStorageError::IoError(user_dir.clone(), e))?;

        let bytes = serde_json::to_vec_pretty(collections)
            .map_err(|e| ServerStorageError::ParseError(path.clone(), e))?;

        // Write atomically using temp file + rename
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, bytes)
            .map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
        fs::rename(&temp_path, &path).map_err(|e| ServerStorageError::IoError(path, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CountingMethod;
    use crate::remote::wire::{BikeDoc, MaintenanceDoc};
    use tempfile::TempDir;

    fn setup() -> (ServerStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = ServerStorage::new(temp_dir.path());
        (storage, temp_dir)
    }

    fn sample() -> UserCollections {
        let mut collections = UserCollections::default();
        collections.bikes.insert(
            "b1".to_string(),
            BikeDoc {
                name: "MT-07".to_string(),
                counting_method: CountingMethod::Distance,
            },
        );
        collections.maintenances.entry("b1".to_string()).or_default().insert(
            "m1".to_string(),
            MaintenanceDoc {
                name: "Oil".to_string(),
                value: 5000.0,
                date: 1_700_000_000_000,
                is_done: true,
            },
        );
        collections
    }

    #[test]
    fn test_validate_user_id() {
        assert!(ServerStorage::validate_user_id("rider1").is_ok());
        assert!(ServerStorage::validate_user_id("my-user_2").is_ok());

        assert!(ServerStorage::validate_user_id("").is_err());
        assert!(ServerStorage::validate_user_id("../evil").is_err());
        assert!(ServerStorage::validate_user_id("foo/bar").is_err());
        assert!(ServerStorage::validate_user_id("foo\\bar").is_err());
        assert!(ServerStorage::validate_user_id(".hidden").is_err());
    }

    #[test]
    fn test_load_unknown_user_is_empty() {
        let (storage, _temp) = setup();
        assert_eq!(storage.load("rider1").unwrap(), UserCollections::default());
    }

    #[test]
    fn test_save_then_load() {
        let (storage, temp) = setup();

        storage.save("rider1", &sample()).unwrap();

        assert_eq!(storage.load("rider1").unwrap(), sample());
        assert!(temp.path().join("rider1").join(COLLECTIONS_FILE).exists());
        assert!(!temp.path().join("rider1").join("collections.json.tmp").exists());
    }

    #[test]
    fn test_users_are_isolated() {
        let (storage, _temp) = setup();

        storage.save("rider1", &sample()).unwrap();

        assert!(storage.load("rider2").unwrap().bikes.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let (storage, temp) = setup();
        let dir = temp.path().join("rider1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(COLLECTIONS_FILE), "not json").unwrap();

        let result = storage.load("rider1");
        assert!(matches!(result, Err(ServerStorageError::ParseError(_, _))));
    }

    #[test]
    fn test_invalid_user_rejected_on_save() {
        let (storage, _temp) = setup();
        let result = storage.save("../escape", &UserCollections::default());
        assert!(matches!(result, Err(ServerStorageError::InvalidUserId(_))));
    }
}

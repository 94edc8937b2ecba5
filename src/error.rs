//! Error types shared by the local store, the remote stores and the sync engine.
//!
//! The typed errors (`ValidationError`, `StoreError`, `RemoteError`,
//! `SyncError`) drive control flow. [`AppError`] is the coarse, user-facing
//! taxonomy: it only decides how a failure is described, never what happens
//! next.

use thiserror::Error;

/// Rejected input, detected before any I/O happens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Validation failed: {0} name cannot be blank")]
    BlankName(&'static str),

    #[error("Validation failed: value cannot be negative (got {0})")]
    NegativeValue(f64),

    #[error("Validation failed: value must be a finite number (got {0})")]
    NonFiniteValue(f64),

    #[error("Validation failed: a completed maintenance needs a completion date")]
    MissingDate,
}

/// Failures of the on-device store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Local query stream closed before emitting")]
    Closed,
}

/// Failures talking to the shared remote store.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote store is not connected")]
    NotConnected,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Remote record not found: {0}")]
    NotFound(String),

    #[error("Remote store rejected the request: {0}")]
    Rejected(String),

    #[error("Failed to decode remote payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Remote stream closed before emitting")]
    Closed,
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                RemoteError::Unauthorized(e.to_string())
            }
            Some(status) if status.as_u16() == 404 => RemoteError::NotFound(e.to_string()),
            Some(_) => RemoteError::Rejected(e.to_string()),
            None if e.is_decode() => RemoteError::Rejected(e.to_string()),
            None => RemoteError::Network(e.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RemoteError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match &e {
            WsError::Http(response)
                if response.status().as_u16() == 401 || response.status().as_u16() == 403 =>
            {
                RemoteError::Unauthorized(e.to_string())
            }
            _ => RemoteError::Network(e.to_string()),
        }
    }
}

/// Failure of a sync pass: either side may be at fault.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Local(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// User-facing error taxonomy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Database(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unknown(String),
}

impl AppError {
    /// Classifies any error, walking its source chain for known types and
    /// falling back to keyword heuristics on the message.
    pub fn classify(err: &(dyn std::error::Error + 'static)) -> Self {
        let message = err.to_string();
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);

        while let Some(e) = current {
            if let Some(kind) = Self::from_known(e, &message) {
                return kind;
            }
            current = e.source();
        }

        Self::from_message(&message)
    }

    fn from_known(e: &(dyn std::error::Error + 'static), message: &str) -> Option<Self> {
        let message = message.to_string();

        if e.downcast_ref::<ValidationError>().is_some() {
            return Some(AppError::Validation(message));
        }
        if e.downcast_ref::<StoreError>().is_some() || e.downcast_ref::<sqlx::Error>().is_some() {
            return Some(AppError::Database(message));
        }
        if let Some(remote) = e.downcast_ref::<RemoteError>() {
            return Some(Self::from_remote(remote, message));
        }
        if let Some(sync) = e.downcast_ref::<SyncError>() {
            return Some(match sync {
                SyncError::Local(_) => AppError::Database(message),
                SyncError::Remote(remote) => Self::from_remote(remote, message),
            });
        }
        if e.downcast_ref::<reqwest::Error>().is_some() {
            return Some(AppError::Network(message));
        }
        None
    }

    fn from_remote(remote: &RemoteError, message: String) -> Self {
        match remote {
            RemoteError::Unauthorized(_) => AppError::Auth(message),
            RemoteError::NotConnected | RemoteError::Network(_) | RemoteError::Closed => {
                AppError::Network(message)
            }
            RemoteError::NotFound(_) | RemoteError::Rejected(_) | RemoteError::Decode(_) => {
                AppError::Unknown(message)
            }
        }
    }

    /// Best-effort classification from a bare message.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has_any = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

        if has_any(&["network", "connection", "connect", "timeout", "timed out", "websocket"]) {
            AppError::Network(message.to_string())
        } else if has_any(&["auth", "unauthorized", "forbidden", "permission", "api key"]) {
            AppError::Auth(message.to_string())
        } else if has_any(&["database", "sqlite", "sql"]) {
            AppError::Database(message.to_string())
        } else if has_any(&["validation", "invalid", "blank", "cannot be"]) {
            AppError::Validation(message.to_string())
        } else {
            AppError::Unknown(message.to_string())
        }
    }

    /// Short hint shown below the error message.
    pub fn hint(&self) -> &'static str {
        match self {
            AppError::Network(_) => {
                "The sync server could not be reached. Local changes are kept and sync later."
            }
            AppError::Auth(_) => "Check sync.api_key in your config file.",
            AppError::Database(_) => "The local database could not be read or written.",
            AppError::Validation(_) => "Fix the input and try again.",
            AppError::Unknown(_) => "An unexpected error occurred.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_validation_error() {
        let err = ValidationError::BlankName("bike");
        assert!(matches!(AppError::classify(&err), AppError::Validation(_)));
    }

    #[test]
    fn test_classify_sync_error_by_side() {
        let local = SyncError::Local(StoreError::Closed);
        assert!(matches!(AppError::classify(&local), AppError::Database(_)));

        let auth = SyncError::Remote(RemoteError::Unauthorized("bad key".into()));
        assert!(matches!(AppError::classify(&auth), AppError::Auth(_)));

        let offline = SyncError::Remote(RemoteError::Network("refused".into()));
        assert!(matches!(AppError::classify(&offline), AppError::Network(_)));
    }

    #[test]
    fn test_classify_walks_source_chain() {
        #[derive(Debug)]
        struct Wrapper(RemoteError);

        impl std::fmt::Display for Wrapper {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "push failed")
            }
        }

        impl std::error::Error for Wrapper {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let err = Wrapper(RemoteError::Unauthorized("nope".into()));
        let classified = AppError::classify(&err);
        assert_eq!(classified, AppError::Auth("push failed".into()));
    }

    #[test]
    fn test_from_message_heuristics() {
        assert!(matches!(
            AppError::from_message("Network unreachable"),
            AppError::Network(_)
        ));
        assert!(matches!(
            AppError::from_message("auth token expired"),
            AppError::Auth(_)
        ));
        assert!(matches!(
            AppError::from_message("database is locked"),
            AppError::Database(_)
        ));
        assert!(matches!(
            AppError::from_message("name cannot be blank"),
            AppError::Validation(_)
        ));
        assert!(matches!(
            AppError::from_message("something odd"),
            AppError::Unknown(_)
        ));
    }

    #[test]
    fn test_message_is_preserved() {
        let err = AppError::from_message("Connection refused");
        assert_eq!(err.to_string(), "Connection refused");
        assert!(err.hint().contains("sync server"));
    }
}

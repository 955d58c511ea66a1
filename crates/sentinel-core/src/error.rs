use std::path::PathBuf;
use thiserror::Error;

use crate::models::{OperatorId, SourceId};

/// All errors produced by the sentinel crates.
#[derive(Error, Debug)]
pub enum SentinelError {
    /// A file could not be read from or written to disk.
    #[error("Failed to access file {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed or serialised.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The persistence layer rejected a flush of the store aggregate.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The primary operator can never be removed.
    #[error("Operator {0} is the primary operator and cannot be removed")]
    PrimaryOperator(OperatorId),

    /// A keyword was empty after trimming.
    #[error("Invalid keyword: {0:?}")]
    InvalidKeyword(String),

    /// A chat or notification transport call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures reported by chat and notification transports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The remote side asked us to slow down.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The connection to the remote side is unavailable.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The requested chat, user, or message does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local I/O failure inside a transport adapter.
    #[error("Transport I/O error: {0}")]
    Io(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Convenience alias used throughout the sentinel crates.
pub type Result<T> = std::result::Result<T, SentinelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_access() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = SentinelError::FileAccess {
            path: PathBuf::from("/some/data.json"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to access file"));
        assert!(msg.contains("/some/data.json"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_primary_operator() {
        let err = SentinelError::PrimaryOperator(42);
        assert_eq!(
            err.to_string(),
            "Operator 42 is the primary operator and cannot be removed"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = SentinelError::Config("page size must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: page size must be positive"
        );
    }

    #[test]
    fn test_transport_error_is_transparent() {
        let err: SentinelError = TransportError::RateLimited {
            retry_after_secs: 30,
        }
        .into();
        assert_eq!(err.to_string(), "Rate limited, retry after 30s");
    }

    #[test]
    fn test_transport_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TransportError = io_err.into();
        assert!(matches!(err, TransportError::Io(ref m) if m.contains("denied")));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: SentinelError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}

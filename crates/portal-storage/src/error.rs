//! Error types for the storage layer

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage operation, recorded in errors for context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Put,
    Get,
    Delete,
    Find,
    List,
    Close,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Put => write!(f, "put"),
            Operation::Get => write!(f, "get"),
            Operation::Delete => write!(f, "delete"),
            Operation::Find => write!(f, "find"),
            Operation::List => write!(f, "list"),
            Operation::Close => write!(f, "close"),
        }
    }
}

/// Failure reported by a concrete backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(String),
}

impl BackendError {
    pub fn io(e: impl std::fmt::Display) -> Self {
        BackendError::Io(e.to_string())
    }
}

/// Broad class of a storage error, for callers that only need to branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The input was rejected before reaching the backend
    Validation,
    /// The record or lookup value could not be encoded
    Serialization,
    /// The backend failed, is closed, or returned unreadable data
    Backend,
    /// The factory was given an unusable configuration
    Configuration,
}

/// Main error type for the storage layer.
///
/// A missing record is never an error: lookups return `Option` / empty vectors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid {collection} {op}: {reason}")]
    Validation {
        op: Operation,
        collection: &'static str,
        reason: String,
    },

    #[error("failed to encode {collection} {key:?} for {op}: {source}")]
    Serialization {
        op: Operation,
        collection: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("stored {collection} {key:?} is unreadable: {source}")]
    Corrupt {
        collection: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{op} on {collection} {key:?} failed: {source}")]
    Backend {
        op: Operation,
        collection: &'static str,
        key: String,
        #[source]
        source: BackendError,
    },

    #[error("storage configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StorageError::Validation { .. } => ErrorClass::Validation,
            StorageError::Serialization { .. } => ErrorClass::Serialization,
            StorageError::Corrupt { .. } | StorageError::Backend { .. } => ErrorClass::Backend,
            StorageError::Config(_) => ErrorClass::Configuration,
        }
    }

    /// Whether retrying the same call could succeed. The storage layer never
    /// retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Backend {
                source: BackendError::Io(_),
                ..
            }
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            StorageError::Backend {
                source: BackendError::Closed,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        let closed = StorageError::Backend {
            op: Operation::Get,
            collection: "users",
            key: "u1".to_string(),
            source: BackendError::Closed,
        };
        assert_eq!(closed.class(), ErrorClass::Backend);
        assert!(closed.is_closed());
        assert!(!closed.is_retryable());

        let io = StorageError::Backend {
            op: Operation::Put,
            collection: "users",
            key: "u1".to_string(),
            source: BackendError::io("disk full"),
        };
        assert!(io.is_retryable());
        assert_eq!(io.to_string(), "put on users \"u1\" failed: I/O error: disk full");

        let config = StorageError::Config("unknown backend".to_string());
        assert_eq!(config.class(), ErrorClass::Configuration);
    }
}

//! Backend traits: the seam between the typed storage manager and a concrete engine

use crate::error::BackendError;
use std::str::FromStr;

/// Concrete storage engines the factory can construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Embedded, file-backed redb database
    Redb,
    /// Process-local maps, nothing persisted
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redb" => Ok(BackendKind::Redb),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("unknown storage backend: {:?}", other)),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Redb => write!(f, "redb"),
            BackendKind::Memory => write!(f, "memory"),
        }
    }
}

/// Key/value pairs returned by a scan
pub type Entries = Vec<(Vec<u8>, Vec<u8>)>;

/// Write access inside a single backend transaction.
///
/// Reads observe the transaction's own earlier writes.
pub trait Transaction {
    fn get(&mut self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;
    fn put(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), BackendError>;
    fn remove(&mut self, bucket: &str, key: &[u8]) -> Result<(), BackendError>;
}

/// Byte-level storage engine partitioned into named buckets.
///
/// Implementations must be safe to share between threads. Every `update`
/// is all-or-nothing: either all of its writes become visible or none do,
/// and a concurrent `get` never observes a partially written value.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Read one value. A bucket that was never written reads as empty.
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;

    /// All entries of `bucket` whose key starts with `prefix`, in key order
    fn scan_prefix(&self, bucket: &str, prefix: &[u8]) -> Result<Entries, BackendError>;

    /// Run `apply` inside one write transaction and commit it if it succeeds.
    fn update(
        &self,
        apply: &mut dyn FnMut(&mut dyn Transaction) -> Result<(), BackendError>,
    ) -> Result<(), BackendError>;

    /// Release engine resources. Calling it again is a no-op; every other
    /// method fails with `BackendError::Closed` afterwards.
    fn close(&self) -> Result<(), BackendError>;

    fn is_closed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("redb".parse::<BackendKind>().unwrap(), BackendKind::Redb);
        assert_eq!(" Memory ".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("bolt".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Redb.to_string(), "redb");
    }
}

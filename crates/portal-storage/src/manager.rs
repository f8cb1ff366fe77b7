//! Typed storage manager
//!
//! `StorageManager` turns records into bytes and back, and keeps one
//! secondary index bucket per collection. A collection `users` stores its
//! records in the bucket `users` and its index entries in `users.idx`.
//!
//! Index entries are key-only rows shaped `field \0 json(value) \0 record_key`,
//! so every record matching one field value sits under a common prefix.

use crate::backend::{Backend, BackendKind};
use crate::error::{BackendError, Operation, Result, StorageError};
use portal_types::Record;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

const INDEX_SEPARATOR: u8 = 0;

/// Lifecycle of a constructed manager. There is no way back from `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    Ready,
    Closed,
}

/// Backend-agnostic persistence for any `Record` type.
///
/// One instance is shared by the whole process (wrap it in an `Arc`). All
/// methods take `&self` and are safe to call concurrently.
pub struct StorageManager {
    backend: Box<dyn Backend>,
}

impl StorageManager {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn state(&self) -> StorageState {
        if self.backend.is_closed() {
            StorageState::Closed
        } else {
            StorageState::Ready
        }
    }

    /// Insert `record`, or replace the stored record with the same key.
    pub fn put<T: Record>(&self, record: &T) -> Result<()> {
        let key = record.key();
        validate_key::<T>(Operation::Put, key)?;

        let value = serde_json::to_value(record)
            .map_err(|source| serialization_error::<T>(Operation::Put, key, source))?;
        let bytes = serde_json::to_vec(&value)
            .map_err(|source| serialization_error::<T>(Operation::Put, key, source))?;
        let fresh = index_entries::<T>(&value, key);
        let index = index_bucket::<T>();

        self.backend
            .update(&mut |txn| {
                if let Some(old) = txn.get(T::COLLECTION, key.as_bytes())? {
                    for stale in stored_index_entries::<T>(&old, key) {
                        if !fresh.contains(&stale) {
                            txn.remove(&index, &stale)?;
                        }
                    }
                }
                txn.put(T::COLLECTION, key.as_bytes(), &bytes)?;
                for entry in &fresh {
                    txn.put(&index, entry, &[])?;
                }
                Ok(())
            })
            .map_err(|source| backend_error::<T>(Operation::Put, key, source))?;

        debug!("Stored {} {}", T::COLLECTION, key);
        Ok(())
    }

    /// Current value for `key`, or `None` when nothing is stored under it.
    pub fn get<T: Record>(&self, key: &str) -> Result<Option<T>> {
        validate_key::<T>(Operation::Get, key)?;

        let bytes = self
            .backend
            .get(T::COLLECTION, key.as_bytes())
            .map_err(|source| backend_error::<T>(Operation::Get, key, source))?;

        match bytes {
            Some(bytes) => decode::<T>(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Remove the record stored under `key`. Removing a missing key succeeds.
    pub fn delete<T: Record>(&self, key: &str) -> Result<()> {
        validate_key::<T>(Operation::Delete, key)?;
        let index = index_bucket::<T>();

        self.backend
            .update(&mut |txn| {
                let Some(old) = txn.get(T::COLLECTION, key.as_bytes())? else {
                    return Ok(());
                };
                for stale in stored_index_entries::<T>(&old, key) {
                    txn.remove(&index, &stale)?;
                }
                txn.remove(T::COLLECTION, key.as_bytes())
            })
            .map_err(|source| backend_error::<T>(Operation::Delete, key, source))?;

        debug!("Deleted {} {}", T::COLLECTION, key);
        Ok(())
    }

    /// Every record whose serialized top-level `field` equals `value`.
    ///
    /// Uses the collection's index when `field` is listed in `T::INDEXES`
    /// and scans the collection otherwise. Records without the field never
    /// match. The order of the result is unspecified.
    pub fn find_by_field<T, V>(&self, field: &str, value: &V) -> Result<Vec<T>>
    where
        T: Record,
        V: Serialize + ?Sized,
    {
        if field.is_empty() {
            return Err(StorageError::Validation {
                op: Operation::Find,
                collection: T::COLLECTION,
                reason: "field name is empty".to_string(),
            });
        }
        let target = serde_json::to_value(value)
            .map_err(|source| serialization_error::<T>(Operation::Find, field, source))?;
        let lookup = format!("{}={}", field, target);

        let candidates = if T::INDEXES.iter().any(|indexed| *indexed == field) {
            self.indexed_candidates::<T>(field, &target, &lookup)?
        } else {
            self.backend
                .scan_prefix(T::COLLECTION, &[])
                .map_err(|source| backend_error::<T>(Operation::Find, &lookup, source))?
        };

        // Index entries are re-checked against the record itself
        let mut found = Vec::new();
        for (key, bytes) in candidates {
            let key = String::from_utf8_lossy(&key);
            let value = decode_value::<T>(&key, &bytes)?;
            if field_matches(&value, field, &target) {
                found.push(from_value::<T>(&key, value)?);
            }
        }
        debug!("Found {} {} where {}", found.len(), T::COLLECTION, lookup);
        Ok(found)
    }

    /// Every record of the collection, in key order.
    pub fn list<T: Record>(&self) -> Result<Vec<T>> {
        let entries = self
            .backend
            .scan_prefix(T::COLLECTION, &[])
            .map_err(|source| backend_error::<T>(Operation::List, "*", source))?;

        entries
            .into_iter()
            .map(|(key, bytes)| decode::<T>(&String::from_utf8_lossy(&key), &bytes))
            .collect()
    }

    /// Release the backend. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        self.backend
            .close()
            .map_err(|source| StorageError::Backend {
                op: Operation::Close,
                collection: "storage",
                key: self.backend.kind().to_string(),
                source,
            })
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    fn indexed_candidates<T: Record>(
        &self,
        field: &str,
        target: &Value,
        lookup: &str,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let prefix = index_prefix(field, target);
        let entries = self
            .backend
            .scan_prefix(&index_bucket::<T>(), &prefix)
            .map_err(|source| backend_error::<T>(Operation::Find, lookup, source))?;

        let mut candidates = Vec::with_capacity(entries.len());
        for (entry, _) in entries {
            let key = entry[prefix.len()..].to_vec();
            let bytes = self
                .backend
                .get(T::COLLECTION, &key)
                .map_err(|source| backend_error::<T>(Operation::Find, lookup, source))?;
            // Deleted between the index scan and this read
            if let Some(bytes) = bytes {
                candidates.push((key, bytes));
            }
        }
        Ok(candidates)
    }
}

impl Drop for StorageManager {
    fn drop(&mut self) {
        if !self.backend.is_closed() {
            let _ = self.backend.close();
        }
    }
}

fn validate_key<T: Record>(op: Operation, key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StorageError::Validation {
            op,
            collection: T::COLLECTION,
            reason: "key is empty".to_string(),
        });
    }
    Ok(())
}

fn serialization_error<T: Record>(
    op: Operation,
    key: &str,
    source: serde_json::Error,
) -> StorageError {
    StorageError::Serialization {
        op,
        collection: T::COLLECTION,
        key: key.to_string(),
        source,
    }
}

fn backend_error<T: Record>(op: Operation, key: &str, source: BackendError) -> StorageError {
    StorageError::Backend {
        op,
        collection: T::COLLECTION,
        key: key.to_string(),
        source,
    }
}

fn decode_value<T: Record>(key: &str, bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|source| StorageError::Corrupt {
        collection: T::COLLECTION,
        key: key.to_string(),
        source,
    })
}

fn from_value<T: Record>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|source| StorageError::Corrupt {
        collection: T::COLLECTION,
        key: key.to_string(),
        source,
    })
}

fn decode<T: Record>(key: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| StorageError::Corrupt {
        collection: T::COLLECTION,
        key: key.to_string(),
        source,
    })
}

fn field_matches(value: &Value, field: &str, target: &Value) -> bool {
    value
        .as_object()
        .and_then(|object| object.get(field))
        .is_some_and(|found| found == target)
}

fn index_bucket<T: Record>() -> String {
    format!("{}.idx", T::COLLECTION)
}

fn index_prefix(field: &str, value: &Value) -> Vec<u8> {
    let encoded = value.to_string();
    let mut prefix = Vec::with_capacity(field.len() + encoded.len() + 2);
    prefix.extend_from_slice(field.as_bytes());
    prefix.push(INDEX_SEPARATOR);
    prefix.extend_from_slice(encoded.as_bytes());
    prefix.push(INDEX_SEPARATOR);
    prefix
}

fn index_entries<T: Record>(value: &Value, key: &str) -> Vec<Vec<u8>> {
    let Some(object) = value.as_object() else {
        return Vec::new();
    };
    entries_for_object::<T>(object, key)
}

fn entries_for_object<T: Record>(object: &Map<String, Value>, key: &str) -> Vec<Vec<u8>> {
    T::INDEXES
        .iter()
        .filter_map(|field| {
            object.get(*field).map(|value| {
                let mut entry = index_prefix(field, value);
                entry.extend_from_slice(key.as_bytes());
                entry
            })
        })
        .collect()
}

/// Index entries written for a previously stored record. Unreadable bytes
/// contribute none; lookups re-check records, so leftovers never match.
fn stored_index_entries<T: Record>(bytes: &[u8], key: &str) -> Vec<Vec<u8>> {
    serde_json::from_slice::<Value>(bytes)
        .map(|value| index_entries::<T>(&value, key))
        .unwrap_or_default()
}

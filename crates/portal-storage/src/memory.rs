//! In-memory backend using DashMap (tests and ephemeral deployments)

use crate::backend::{Backend, BackendKind, Entries, Transaction};
use crate::error::BackendError;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Process-local backend. Nothing survives `close` or a restart.
pub struct MemoryBackend {
    buckets: DashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>,
    // Readers share it; a commit or close holds it exclusively
    commit: RwLock<()>,
    closed: AtomicBool,
}

struct StagedWrite {
    bucket: String,
    key: Vec<u8>,
    value: Option<Vec<u8>>,
}

/// Buffers writes until the whole transaction has succeeded
struct MemoryTransaction<'a> {
    backend: &'a MemoryBackend,
    staged: Vec<StagedWrite>,
}

impl Transaction for MemoryTransaction<'_> {
    fn get(&mut self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        if let Some(write) = self
            .staged
            .iter()
            .rev()
            .find(|w| w.bucket == bucket && w.key == key)
        {
            return Ok(write.value.clone());
        }
        Ok(self.backend.read(bucket, key))
    }

    fn put(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), BackendError> {
        self.staged.push(StagedWrite {
            bucket: bucket.to_string(),
            key: key.to_vec(),
            value: Some(value.to_vec()),
        });
        Ok(())
    }

    fn remove(&mut self, bucket: &str, key: &[u8]) -> Result<(), BackendError> {
        self.staged.push(StagedWrite {
            bucket: bucket.to_string(),
            key: key.to_vec(),
            value: None,
        });
        Ok(())
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            commit: RwLock::new(()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::Closed);
        }
        Ok(())
    }

    fn shared(&self) -> Result<RwLockReadGuard<'_, ()>, BackendError> {
        let guard = self
            .commit
            .read()
            .map_err(|_| BackendError::io("memory commit lock poisoned"))?;
        self.ensure_open()?;
        Ok(guard)
    }

    fn exclusive(&self) -> Result<RwLockWriteGuard<'_, ()>, BackendError> {
        self.commit
            .write()
            .map_err(|_| BackendError::io("memory commit lock poisoned"))
    }

    fn read(&self, bucket: &str, key: &[u8]) -> Option<Vec<u8>> {
        self.buckets
            .get(bucket)
            .and_then(|entries| entries.get(key).cloned())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        let _shared = self.shared()?;
        Ok(self.read(bucket, key))
    }

    fn scan_prefix(&self, bucket: &str, prefix: &[u8]) -> Result<Entries, BackendError> {
        let _shared = self.shared()?;
        let Some(entries) = self.buckets.get(bucket) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn update(
        &self,
        apply: &mut dyn FnMut(&mut dyn Transaction) -> Result<(), BackendError>,
    ) -> Result<(), BackendError> {
        let _exclusive = self.exclusive()?;
        self.ensure_open()?;

        let mut txn = MemoryTransaction {
            backend: self,
            staged: Vec::new(),
        };
        apply(&mut txn)?;

        for write in txn.staged {
            let mut entries = self.buckets.entry(write.bucket).or_default();
            match write.value {
                Some(value) => {
                    entries.insert(write.key, value);
                }
                None => {
                    entries.remove(&write.key);
                }
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<(), BackendError> {
        let _exclusive = self.exclusive()?;
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.buckets.clear();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let backend = MemoryBackend::new();

        backend
            .update(&mut |txn| txn.put("users", b"key1", &[1, 2, 3]))
            .unwrap();
        assert_eq!(backend.get("users", b"key1").unwrap(), Some(vec![1, 2, 3]));

        // Non-existent key and bucket
        assert_eq!(backend.get("users", b"nonexistent").unwrap(), None);
        assert_eq!(backend.get("sessions", b"key1").unwrap(), None);

        backend
            .update(&mut |txn| txn.remove("users", b"key1"))
            .unwrap();
        assert_eq!(backend.get("users", b"key1").unwrap(), None);
    }

    #[test]
    fn test_staged_writes_are_discarded_on_error() {
        let backend = MemoryBackend::new();

        let result = backend.update(&mut |txn| {
            txn.put("users", b"key1", b"v1")?;
            assert_eq!(txn.get("users", b"key1")?, Some(b"v1".to_vec()));
            Err(BackendError::io("simulated failure"))
        });

        assert!(result.is_err());
        assert_eq!(backend.get("users", b"key1").unwrap(), None);
    }

    #[test]
    fn test_scan_prefix() {
        let backend = MemoryBackend::new();
        backend
            .update(&mut |txn| {
                txn.put("idx", b"user_id\0\"u1\"\0s2", b"")?;
                txn.put("idx", b"user_id\0\"u1\"\0s1", b"")?;
                txn.put("idx", b"user_id\0\"u2\"\0s3", b"")?;
                Ok(())
            })
            .unwrap();

        let found = backend.scan_prefix("idx", b"user_id\0\"u1\"\0").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, b"user_id\0\"u1\"\0s1".to_vec());
        assert_eq!(backend.scan_prefix("idx", b"").unwrap().len(), 3);
    }

    #[test]
    fn test_close() {
        let backend = MemoryBackend::new();
        backend
            .update(&mut |txn| txn.put("users", b"key1", b"v1"))
            .unwrap();

        backend.close().unwrap();
        backend.close().unwrap();

        assert!(backend.is_closed());
        assert!(matches!(backend.get("users", b"key1"), Err(BackendError::Closed)));
        assert!(matches!(
            backend.update(&mut |txn| txn.put("users", b"key2", b"v2")),
            Err(BackendError::Closed)
        ));
    }

    #[test]
    fn test_scans_never_observe_part_of_a_transaction() {
        let backend = MemoryBackend::new();
        let keys: Vec<Vec<u8>> = (0..32u8).map(|i| vec![b'k', i]).collect();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for round in 0..500u32 {
                    backend
                        .update(&mut |txn| {
                            for key in &keys {
                                if round % 3 == 2 {
                                    txn.remove("b", key)?;
                                } else {
                                    txn.put("b", key, &round.to_be_bytes())?;
                                }
                            }
                            Ok(())
                        })
                        .unwrap();
                }
            });
            for _ in 0..2 {
                scope.spawn(|| {
                    for _ in 0..2000 {
                        let entries = backend.scan_prefix("b", b"").unwrap();
                        assert!(
                            entries.is_empty() || entries.len() == keys.len(),
                            "saw {} of {} keys",
                            entries.len(),
                            keys.len()
                        );
                        if let Some((_, first)) = entries.first() {
                            assert!(entries.iter().all(|(_, v)| v == first));
                        }
                    }
                });
            }
        });
    }

    #[test]
    fn test_close_racing_updates_leaves_nothing_behind() {
        let backend = MemoryBackend::new();

        std::thread::scope(|scope| {
            for worker in 0..4u8 {
                let backend = &backend;
                scope.spawn(move || {
                    for i in 0..200u8 {
                        let result = backend.update(&mut |txn| txn.put("users", &[worker, i], b"v"));
                        if matches!(result, Err(BackendError::Closed)) {
                            return;
                        }
                        result.unwrap();
                    }
                });
            }
            scope.spawn(|| {
                std::thread::yield_now();
                backend.close().unwrap();
            });
        });

        assert!(backend.is_closed());
        assert!(backend.buckets.is_empty());
    }
}

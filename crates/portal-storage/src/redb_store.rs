//! Embedded redb backend (single file, single process)
//!
//! Each bucket is its own redb table with byte keys and byte values. Writers
//! are serialized by redb's write transaction; readers work on a consistent
//! snapshot and never block on writers.

use crate::backend::{Backend, BackendKind, Entries, Transaction};
use crate::error::BackendError;
use redb::{Builder, Database, ReadableTable, TableDefinition, TableError, WriteTransaction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

fn bucket_table(bucket: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(bucket)
}

pub struct RedbBackend {
    db: RwLock<Option<Arc<Database>>>,
    path: PathBuf,
}

impl RedbBackend {
    /// Create or open the database file at `path`.
    ///
    /// `cache_size` is in bytes; redb's default is used when `None`.
    pub fn open<P: AsRef<Path>>(path: P, cache_size: Option<usize>) -> Result<Self, BackendError> {
        let path = path.as_ref().to_path_buf();
        let mut builder = Builder::new();
        if let Some(bytes) = cache_size {
            builder.set_cache_size(bytes);
        }
        let db = builder.create(&path).map_err(BackendError::io)?;
        info!("Opened redb store at {}", path.display());

        Ok(Self {
            db: RwLock::new(Some(Arc::new(db))),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone the live handle so an operation keeps the file open even if
    /// `close` runs concurrently.
    fn handle(&self) -> Result<Arc<Database>, BackendError> {
        let guard = self
            .db
            .read()
            .map_err(|_| BackendError::io("redb handle lock poisoned"))?;
        guard.clone().ok_or(BackendError::Closed)
    }
}

struct RedbTransaction<'a> {
    write: &'a WriteTransaction,
}

impl Transaction for RedbTransaction<'_> {
    fn get(&mut self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        let table = self
            .write
            .open_table(bucket_table(bucket))
            .map_err(BackendError::io)?;
        let value = table
            .get(key)
            .map_err(BackendError::io)?
            .map(|v| v.value().to_vec());
        Ok(value)
    }

    fn put(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), BackendError> {
        let mut table = self
            .write
            .open_table(bucket_table(bucket))
            .map_err(BackendError::io)?;
        table.insert(key, value).map_err(BackendError::io)?;
        Ok(())
    }

    fn remove(&mut self, bucket: &str, key: &[u8]) -> Result<(), BackendError> {
        let mut table = self
            .write
            .open_table(bucket_table(bucket))
            .map_err(BackendError::io)?;
        table.remove(key).map_err(BackendError::io)?;
        Ok(())
    }
}

impl Backend for RedbBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Redb
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        let db = self.handle()?;
        let read = db.begin_read().map_err(BackendError::io)?;
        let table = match read.open_table(bucket_table(bucket)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(BackendError::io(e)),
        };
        let value = table
            .get(key)
            .map_err(BackendError::io)?
            .map(|v| v.value().to_vec());
        Ok(value)
    }

    fn scan_prefix(&self, bucket: &str, prefix: &[u8]) -> Result<Entries, BackendError> {
        let db = self.handle()?;
        let read = db.begin_read().map_err(BackendError::io)?;
        let table = match read.open_table(bucket_table(bucket)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(BackendError::io(e)),
        };

        let mut entries = Vec::new();
        for entry in table.range(prefix..).map_err(BackendError::io)? {
            let (k, v) = entry.map_err(BackendError::io)?;
            let key = k.value();
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), v.value().to_vec()));
        }
        debug!("Scanned {} entries from {}", entries.len(), bucket);
        Ok(entries)
    }

    fn update(
        &self,
        apply: &mut dyn FnMut(&mut dyn Transaction) -> Result<(), BackendError>,
    ) -> Result<(), BackendError> {
        let db = self.handle()?;
        let write = db.begin_write().map_err(BackendError::io)?;
        let result = {
            let mut txn = RedbTransaction { write: &write };
            apply(&mut txn)
        };
        match result {
            Ok(()) => write.commit().map_err(BackendError::io),
            Err(e) => {
                let _ = write.abort();
                Err(e)
            }
        }
    }

    fn close(&self) -> Result<(), BackendError> {
        let mut guard = self
            .db
            .write()
            .map_err(|_| BackendError::io("redb handle lock poisoned"))?;
        if guard.take().is_some() {
            info!("Closed redb store at {}", self.path.display());
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.db.read().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

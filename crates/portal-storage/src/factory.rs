//! Builds a ready `StorageManager` from configuration

use crate::backend::{Backend, BackendKind};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::manager::StorageManager;
use crate::memory::MemoryBackend;
use crate::redb_store::RedbBackend;
use std::path::Path;
use tracing::info;

/// Open the backend named by `config`.
///
/// Every problem with the configuration, including a database file that
/// cannot be created, is reported here as `StorageError::Config`.
pub fn open_storage(config: &StorageConfig) -> Result<StorageManager> {
    let kind: BackendKind = config.backend.parse().map_err(StorageError::Config)?;

    let backend: Box<dyn Backend> = match kind {
        BackendKind::Redb => Box::new(open_redb(config)?),
        BackendKind::Memory => Box::new(MemoryBackend::new()),
    };

    info!("Storage ready (backend: {})", kind);
    Ok(StorageManager::new(backend))
}

fn open_redb(config: &StorageConfig) -> Result<RedbBackend> {
    let path = config
        .path
        .as_deref()
        .filter(|path| !path.as_os_str().is_empty())
        .ok_or_else(|| StorageError::Config("redb backend requires a path".to_string()))?;

    let cache_size = match config.cache_size_mb {
        None => None,
        Some(0) => {
            return Err(StorageError::Config(
                "cache_size_mb must be greater than zero".to_string(),
            ))
        }
        Some(mb) => Some(mb.checked_mul(1024 * 1024).ok_or_else(|| {
            StorageError::Config(format!("cache_size_mb {} is too large", mb))
        })?),
    };

    create_parent_dir(path)?;

    RedbBackend::open(path, cache_size).map_err(|e| {
        StorageError::Config(format!("cannot open redb store at {}: {}", path.display(), e))
    })
}

fn create_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Config(format!(
                    "cannot create storage directory {}: {}",
                    parent.display(),
                    e
                ))
            })
        }
        _ => Ok(()),
    }
}

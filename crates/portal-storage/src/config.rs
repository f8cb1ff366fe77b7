//! Storage configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which backend to build and how. Usually a section of the server config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `redb` or `memory`
    #[serde(default = "default_backend", alias = "backend_kind")]
    pub backend: String,

    /// Database file, required by `redb`
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Page cache in MiB, `redb` only
    #[serde(default)]
    pub cache_size_mb: Option<usize>,
}

fn default_backend() -> String {
    "redb".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::redb("data/portal.redb")
    }
}

impl StorageConfig {
    pub fn redb(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: default_backend(),
            path: Some(path.into()),
            cache_size_mb: None,
        }
    }

    pub fn memory() -> Self {
        Self {
            backend: "memory".to_string(),
            path: None,
            cache_size_mb: None,
        }
    }
}

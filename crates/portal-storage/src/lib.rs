//! Portal Storage - pluggable persistence for portal records
//!
//! Callers work with typed records through [`StorageManager`]; the bytes end
//! up in one of the [`Backend`] implementations chosen by [`open_storage`].

pub mod backend;
pub mod config;
pub mod error;
pub mod factory;
pub mod manager;
pub mod memory;
pub mod redb_store;

pub use backend::{Backend, BackendKind, Transaction};
pub use config::StorageConfig;
pub use error::{BackendError, ErrorClass, Operation, Result, StorageError};
pub use factory::open_storage;
pub use manager::{StorageManager, StorageState};
pub use memory::MemoryBackend;
pub use redb_store::RedbBackend;

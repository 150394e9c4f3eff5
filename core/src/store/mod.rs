// Store module: durable local state of a device

pub mod backend;
pub mod local;

pub use backend::{MemoryStorage, SledStorage, StorageBackend, StorageError};
pub use local::{
    node_namespace, AppSettings, LocalStore, PruneReport, StorageInfo, DEFAULT_NAMESPACE,
};

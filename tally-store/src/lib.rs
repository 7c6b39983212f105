//! Write-once storage for accepted log entries.
//!
//! The collector only ever calls [`LogStore::put`]; reads exist on the
//! concrete backends for inspection and tests.

pub mod file;
pub mod memory;

#[cfg(feature = "etcd")]
pub mod etcd;

use async_trait::async_trait;
use tally_core::EntryMetadata;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Key already exists: {0}")]
    Exists(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for tally_core::CollectError {
    fn from(e: StoreError) -> Self {
        tally_core::CollectError::Unexpected(format!("store: {e}"))
    }
}

/// Minimal key-value capability the collector writes through.
///
/// Each `put` must be atomic: either value and metadata are both stored
/// under `key`, or an error is returned.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn put(&self, key: &str, value: &str, metadata: &EntryMetadata)
        -> Result<(), StoreError>;

    /// Backend name for logs and health output.
    fn kind(&self) -> &'static str;
}

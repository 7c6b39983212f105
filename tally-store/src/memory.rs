use crate::{LogStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tally_core::EntryMetadata;
use tracing::debug;

/// One stored value plus its metadata side-record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub value: String,
    pub metadata: EntryMetadata,
}

/// In-process store. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<String, StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<StoredRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All keys, sorted (and therefore in receipt order).
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn put(
        &self,
        key: &str,
        value: &str,
        metadata: &EntryMetadata,
    ) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;

        match self.records.entry(key.to_string()) {
            Entry::Occupied(_) => Err(StoreError::Exists(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(StoredRecord {
                    value: value.to_string(),
                    metadata: metadata.clone(),
                });
                debug!(key, "memory store: entry written");
                Ok(())
            }
        }
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

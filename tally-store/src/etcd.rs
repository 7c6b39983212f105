use crate::{LogStore, StoreError};
use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, Txn, TxnOp};
use std::time::Duration;
use tally_core::EntryMetadata;
use tally_core::config::EtcdConfig;
use tracing::info;

/// etcd key schema for Tally.
///
/// ```text
/// /tally/logs/{key}   full entry JSON
/// /tally/meta/{key}   metadata side-record
/// ```
pub struct KeySchema {
    prefix: String,
}

impl KeySchema {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/').to_string();
        Self { prefix }
    }

    pub fn log_key(&self, key: &str) -> String {
        format!("{}/logs/{}", self.prefix, key)
    }

    pub fn meta_key(&self, key: &str) -> String {
        format!("{}/meta/{}", self.prefix, key)
    }
}

/// etcd-backed store. Value and metadata are committed in one transaction,
/// guarded on the value key not existing yet.
pub struct EtcdStore {
    client: Client,
    schema: KeySchema,
}

impl EtcdStore {
    /// Connect to etcd.
    pub async fn connect(config: &EtcdConfig) -> Result<Self, StoreError> {
        let options = ConnectOptions::new()
            .with_connect_timeout(Duration::from_secs(config.timeout_secs))
            .with_timeout(Duration::from_secs(config.timeout_secs));
        let client = Client::connect(&config.endpoints, Some(options))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        info!(endpoints = ?config.endpoints, prefix = %config.prefix, "Connected to etcd");
        Ok(Self {
            client,
            schema: KeySchema::new(&config.prefix),
        })
    }
}

#[async_trait]
impl LogStore for EtcdStore {
    async fn put(
        &self,
        key: &str,
        value: &str,
        metadata: &EntryMetadata,
    ) -> Result<(), StoreError> {
        let log_key = self.schema.log_key(key);
        let meta_key = self.schema.meta_key(key);
        let meta_json = serde_json::to_string(metadata)?;

        // version == 0 means the key has never been written.
        let txn = Txn::new()
            .when(vec![etcd_client::Compare::version(
                log_key.clone(),
                etcd_client::CompareOp::Equal,
                0,
            )])
            .and_then(vec![
                TxnOp::put(log_key, value, None),
                TxnOp::put(meta_key, meta_json, None),
            ]);

        let mut kv = self.client.kv_client();
        let resp = kv
            .txn(txn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if resp.succeeded() {
            Ok(())
        } else {
            Err(StoreError::Exists(key.to_string()))
        }
    }

    fn kind(&self) -> &'static str {
        "etcd"
    }
}

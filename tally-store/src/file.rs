//! Directory-backed store.
//!
//! Each entry becomes `<dir>/<key>.json` with its metadata beside it in
//! `<dir>/<key>.meta.json`. The value is written to a private `.tmp` file and
//! hard-linked into place; the link fails if the name is taken, which makes
//! the value link the commit point. Metadata follows, and a failed metadata
//! write unlinks the value again.

use crate::{LogStore, StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tally_core::EntryMetadata;
use tokio::fs;

pub struct FileStore {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl FileStore {
    /// Open (and create if needed) the target directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "file store ready");
        Ok(Self {
            dir,
            tmp_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn metadata_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.meta.json"))
    }

    /// A scratch name no other writer in this process will use.
    fn tmp_path(&self, key: &str) -> PathBuf {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{key}.{}.{seq}.tmp", std::process::id()))
    }

    async fn write_metadata(&self, key: &str, contents: &[u8]) -> Result<(), StoreError> {
        let tmp = self.tmp_path(key);
        let result = async {
            fs::write(&tmp, contents).await?;
            fs::rename(&tmp, self.metadata_path(key)).await
        }
        .await;
        if result.is_err() {
            let _ = fs::remove_file(&tmp).await;
        }
        Ok(result?)
    }
}

/// Keys are generated server-side, but never let one escape the directory.
fn check_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::Backend(format!("invalid key: {key:?}")))
    }
}

#[async_trait]
impl LogStore for FileStore {
    async fn put(
        &self,
        key: &str,
        value: &str,
        metadata: &EntryMetadata,
    ) -> Result<(), StoreError> {
        check_key(key)?;
        let meta_json = serde_json::to_vec_pretty(metadata)?;

        let value_path = self.value_path(key);
        let value_tmp = self.tmp_path(key);
        if let Err(e) = fs::write(&value_tmp, value.as_bytes()).await {
            let _ = fs::remove_file(&value_tmp).await;
            return Err(e.into());
        }

        // hard_link never replaces an existing file.
        let linked = fs::hard_link(&value_tmp, &value_path).await;
        let _ = fs::remove_file(&value_tmp).await;
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::Exists(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.write_metadata(key, &meta_json).await {
            let _ = fs::remove_file(&value_path).await;
            return Err(e);
        }

        tracing::debug!(path = %value_path.display(), "file store: entry written");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

// src/memory/store.rs

//! Whole-document persistence: the adapter contract and the file-backed
//! implementation.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::memory::types::MemoryDocument;

/// Errors surfaced by document stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed memory document: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable whole-document storage. `save` must be atomic from the caller's
/// point of view: readers never observe a partially written document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Loads the entire document, or `None` when nothing was persisted yet.
    async fn load(&self) -> StoreResult<Option<MemoryDocument>>;

    /// Overwrites the entire persisted document.
    async fn save(&self, document: &MemoryDocument) -> StoreResult<()>;
}

/// JSON-file-backed store. Saves go through a sibling temp file that is
/// renamed over the target, so a crash mid-write leaves the previous
/// document intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut raw = self.path.as_os_str().to_owned();
        raw.push(".tmp");
        PathBuf::from(raw)
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn load(&self) -> StoreResult<Option<MemoryDocument>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let document = serde_json::from_slice(&raw)?;
        Ok(Some(document))
    }

    async fn save(&self, document: &MemoryDocument) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let raw = serde_json::to_vec_pretty(document)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, &raw).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!(
            "Persisted memory document to {} ({} bytes)",
            self.path.display(),
            raw.len()
        );
        Ok(())
    }
}

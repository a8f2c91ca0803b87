//! PadLengthRegistry (C5, spec.md §4.5): in-memory + on-disk per-index pad
//! length store. The on-disk file is authoritative across restarts; a read
//! that misses memory always falls through to disk before reporting
//! `not-found`, so a deleted file is never masked by a stale in-memory
//! entry (SPEC_FULL.md §4.5).
//!
//! Grounded on the teacher's `models/config.rs` `config_path()` +
//! `std::fs::write` persistence idiom, extended with the
//! write-to-temp-then-rename pattern for atomic replacement.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RegistryError;

/// `{ padToTokens, actualMaxTokens }` for one index (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PadLengthRecord {
    pub pad_to_tokens: usize,
    pub actual_max_tokens: usize,
}

pub struct PadLengthRegistry {
    dir: PathBuf,
    memory: RwLock<HashMap<String, PadLengthRecord>>,
}

impl PadLengthRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            memory: RwLock::new(HashMap::new()),
        }
    }

    fn file_path(&self, index_name: &str) -> PathBuf {
        self.dir.join(format!("{index_name}_padtokens.json"))
    }

    /// Lookup order: in-memory map, then the on-disk file, then `None`.
    pub async fn get(&self, index_name: &str) -> Result<Option<PadLengthRecord>, RegistryError> {
        if let Some(record) = self.memory.read().await.get(index_name).copied() {
            return Ok(Some(record));
        }
        self.load_from_disk(index_name).await
    }

    /// Same as `get`, but fails with `PadLengthUnknown` instead of `None` —
    /// used by the non-bulk index path (spec.md §4.7).
    pub async fn require(&self, index_name: &str) -> Result<PadLengthRecord, RegistryError> {
        self.get(index_name)
            .await?
            .ok_or_else(|| RegistryError::PadLengthUnknown(index_name.to_string()))
    }

    /// Re-reads the on-disk file unconditionally, ignoring any in-memory
    /// entry — the file is always authoritative on a cache miss or explicit
    /// reload (spec.md §4.5, SPEC_FULL.md §4.5).
    async fn load_from_disk(
        &self,
        index_name: &str,
    ) -> Result<Option<PadLengthRecord>, RegistryError> {
        let path = self.file_path(index_name);
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let record: PadLengthRecord = serde_json::from_str(&content)?;
        self.memory
            .write()
            .await
            .insert(index_name.to_string(), record);
        Ok(Some(record))
    }

    /// Writes both the in-memory map and the on-disk file (write-to-temp +
    /// rename, the crate-free idiom for an atomic config replacement).
    pub async fn put(
        &self,
        index_name: &str,
        record: PadLengthRecord,
    ) -> Result<(), RegistryError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.file_path(index_name);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        self.memory
            .write()
            .await
            .insert(index_name.to_string(), record);

        debug!(index = index_name, pad_to_tokens = record.pad_to_tokens, "pad length persisted");
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }
}

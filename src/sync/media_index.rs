//! Media reverse index.
//!
//! Remembers, for each media node the importer created, the name and parent
//! it was created with. The change handler compares live media against it
//! to tell a rename or a move apart from a plain save.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::sync::file::{read_jsonl, write_jsonl};
use crate::sync::types::SyncResult;

/// One line of `media_index.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaIndexEntry {
    /// Target identity of the live media node.
    pub key: Uuid,
    pub name: String,
    pub parent_id: i64,
}

/// Target identity → last known (name, parent).
#[derive(Debug, Default)]
pub struct MediaIndex {
    path: Option<PathBuf>,
    entries: BTreeMap<Uuid, MediaIndexEntry>,
}

impl MediaIndex {
    /// An empty index with no backing file.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the index from `path`. A missing file yields an empty index.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let mut index = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };

        if path.exists() {
            let entries: Vec<MediaIndexEntry> = read_jsonl(path)?;
            index.entries = entries.into_iter().map(|e| (e.key, e)).collect();
        }

        debug!(path = %path.display(), entries = index.len(), "Loaded media index");
        Ok(index)
    }

    /// Record (or overwrite) the name and parent of a media node.
    pub fn record(&mut self, key: Uuid, name: &str, parent_id: i64) {
        self.entries.insert(
            key,
            MediaIndexEntry {
                key,
                name: name.to_string(),
                parent_id,
            },
        );
    }

    #[must_use]
    pub fn get(&self, key: Uuid) -> Option<&MediaIndexEntry> {
        self.entries.get(&key)
    }

    pub fn remove(&mut self, key: Uuid) -> Option<MediaIndexEntry> {
        self.entries.remove(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the whole index to its backing file. No-op when in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn persist(&self) -> SyncResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let entries: Vec<_> = self.entries.values().cloned().collect();
        write_jsonl(path, &entries)
    }
}

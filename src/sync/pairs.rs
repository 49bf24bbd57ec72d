//! Correlation store: source identity ↔ target identity.
//!
//! Each environment assigns its own identities. The correlation store
//! remembers which live node in this environment stands for a node from
//! the originating environment. It is loaded once per process, mutated in
//! memory, and written back as a whole-table snapshot at the end of a run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::sync::file::{read_jsonl, write_jsonl};
use crate::sync::types::SyncResult;

/// One line of `pairs.jsonl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub source: Uuid,
    pub target: Uuid,
}

/// Bidirectional source ↔ target identity map.
///
/// Both directions are kept bijective: a source maps to at most one target
/// and a target is claimed by at most one source.
#[derive(Debug, Default)]
pub struct CorrelationStore {
    path: Option<PathBuf>,
    forward: HashMap<Uuid, Uuid>,
    reverse: HashMap<Uuid, Uuid>,
}

impl CorrelationStore {
    /// An empty store with no backing file.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the table from `path`. A missing file yields an empty table
    /// that will be created on [`persist`](Self::persist).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let mut store = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };

        if path.exists() {
            let pairs: Vec<CorrelationPair> = read_jsonl(path)?;
            store.merge(pairs);
        }

        debug!(path = %path.display(), pairs = store.len(), "Loaded correlation table");
        Ok(store)
    }

    /// Merge pairs into the table. Later pairs win.
    pub fn merge(&mut self, pairs: impl IntoIterator<Item = CorrelationPair>) {
        for pair in pairs {
            self.save_pair(pair.source, pair.target);
        }
    }

    /// Target identity for a source identity, reserving one if unseen.
    ///
    /// The reservation is the source identity itself, so a re-import into
    /// the environment the files came from finds the original node. It is
    /// replaced by [`save_pair`](Self::save_pair) once a node is created.
    pub fn resolve_target(&mut self, source: Uuid) -> Uuid {
        if let Some(target) = self.forward.get(&source) {
            return *target;
        }

        if let Some(claimed_by) = self.reverse.get(&source) {
            // The source identity is already the target of another source, so
            // reserving it would alias two nodes. Hand out an identity no live
            // node has; creation registers the real pair.
            warn!(%source, %claimed_by, "Identity already claimed, reserving a fresh one");
            return Uuid::new_v4();
        }

        self.forward.insert(source, source);
        self.reverse.insert(source, source);
        source
    }

    /// Target identity for a source identity, without reserving.
    #[must_use]
    pub fn lookup_target(&self, source: Uuid) -> Option<Uuid> {
        self.forward.get(&source).copied()
    }

    /// Source identity a target identity was created for.
    #[must_use]
    pub fn resolve_source(&self, target: Uuid) -> Option<Uuid> {
        self.reverse.get(&target).copied()
    }

    /// Insert or replace a pair, dropping whatever either side was paired
    /// with before.
    pub fn save_pair(&mut self, source: Uuid, target: Uuid) {
        if let Some(old_target) = self.forward.insert(source, target) {
            if old_target != target {
                self.reverse.remove(&old_target);
            }
        }
        if let Some(old_source) = self.reverse.insert(target, source) {
            if old_source != source {
                self.forward.remove(&old_source);
            }
        }
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// All pairs, sorted by source identity.
    #[must_use]
    pub fn pairs(&self) -> Vec<CorrelationPair> {
        let mut pairs: Vec<_> = self
            .forward
            .iter()
            .map(|(source, target)| CorrelationPair {
                source: *source,
                target: *target,
            })
            .collect();
        pairs.sort_by_key(|p| p.source);
        pairs
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rewrite the whole table to its backing file. No-op when in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn persist(&self) -> SyncResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_jsonl(path, &self.pairs())?;
        debug!(path = %path.display(), pairs = self.len(), "Persisted correlation table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_target_reserves_source_identity() {
        let mut store = CorrelationStore::in_memory();
        let source = Uuid::new_v4();

        assert_eq!(store.lookup_target(source), None);
        assert_eq!(store.resolve_target(source), source);
        assert_eq!(store.resolve_target(source), source);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_save_pair_replaces_reservation() {
        let mut store = CorrelationStore::in_memory();
        let source = Uuid::new_v4();
        let target = Uuid::new_v4();

        store.resolve_target(source);
        store.save_pair(source, target);

        assert_eq!(store.resolve_target(source), target);
        assert_eq!(store.resolve_source(target), Some(source));
        assert_eq!(store.resolve_source(source), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_save_pair_keeps_bijection() {
        let mut store = CorrelationStore::in_memory();
        let (a, b, t) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        store.save_pair(a, t);
        store.save_pair(b, t);

        assert_eq!(store.lookup_target(a), None);
        assert_eq!(store.lookup_target(b), Some(t));
        assert_eq!(store.resolve_source(t), Some(b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reservation_never_aliases_a_claimed_target() {
        let mut store = CorrelationStore::in_memory();
        let (a, t) = (Uuid::new_v4(), Uuid::new_v4());
        store.save_pair(a, t);

        let reserved = store.resolve_target(t);
        assert_ne!(reserved, t);
        assert_eq!(store.resolve_source(t), Some(a));
    }

    #[test]
    fn test_persist_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pairs.jsonl");

        let mut store = CorrelationStore::load(&path).unwrap();
        assert!(store.is_empty());
        let (s1, t1, s2, t2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.save_pair(s1, t1);
        store.save_pair(s2, t2);
        store.persist().unwrap();

        let loaded = CorrelationStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.lookup_target(s1), Some(t1));
        assert_eq!(loaded.resolve_source(t2), Some(s2));
        assert_eq!(loaded.pairs(), store.pairs());
    }

    #[test]
    fn test_in_memory_persist_is_noop() {
        let store = CorrelationStore::in_memory();
        store.persist().unwrap();
        assert!(store.path().is_none());
    }
}

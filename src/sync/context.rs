//! Sync root layout and the per-run sync context.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Settings;
use crate::model::NodeKind;
use crate::sync::media_index::MediaIndex;
use crate::sync::pairs::CorrelationStore;
use crate::sync::types::SyncResult;

/// Correlation table file inside the sync root.
pub const PAIRS_FILE: &str = "pairs.jsonl";

/// Media reverse index file inside the sync root.
pub const MEDIA_INDEX_FILE: &str = "media_index.jsonl";

/// Resolved paths of a sync root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLayout {
    pub root: PathBuf,
    pub content: PathBuf,
    pub media: PathBuf,
    pub files: PathBuf,
    pub archive: PathBuf,
    pub pairs: PathBuf,
    pub media_index: PathBuf,
}

impl SyncLayout {
    #[must_use]
    pub fn new(root: &Path, settings: &Settings) -> Self {
        Self {
            root: root.to_path_buf(),
            content: root.join(&settings.content_folder),
            media: root.join(&settings.media_folder),
            files: root.join(&settings.files_folder),
            archive: root.join(&settings.archive_folder),
            pairs: root.join(PAIRS_FILE),
            media_index: root.join(MEDIA_INDEX_FILE),
        }
    }

    /// Root folder of one tree's node files.
    #[must_use]
    pub fn kind_root(&self, kind: NodeKind) -> &Path {
        match kind {
            NodeKind::Content => &self.content,
            NodeKind::Media => &self.media,
        }
    }

    /// Create the content, media and files folders.
    ///
    /// # Errors
    ///
    /// Returns an error if a folder cannot be created.
    pub fn ensure_dirs(&self) -> SyncResult<()> {
        for dir in [&self.content, &self.media, &self.files] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Everything an import or export run shares.
///
/// Owns the correlation table and the media index. Both are loaded once
/// when the context is opened and written back by [`persist`](Self::persist)
/// at the end of the run.
#[derive(Debug)]
pub struct SyncContext {
    pub layout: SyncLayout,
    pub pairs: CorrelationStore,
    pub media_index: MediaIndex,
    /// Keep archived copies of removed node files.
    pub versions: bool,
}

impl SyncContext {
    /// Open the sync root, loading the correlation table and media index.
    ///
    /// # Errors
    ///
    /// Returns an error if either table exists but is corrupt.
    pub fn open(root: &Path, settings: &Settings) -> SyncResult<Self> {
        let layout = SyncLayout::new(root, settings);
        let pairs = CorrelationStore::load(&layout.pairs)?;
        let media_index = MediaIndex::load(&layout.media_index)?;

        debug!(root = %root.display(), pairs = pairs.len(), "Opened sync context");
        Ok(Self {
            layout,
            pairs,
            media_index,
            versions: settings.versions,
        })
    }

    /// Write the correlation table and media index back to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    pub fn persist(&self) -> SyncResult<()> {
        self.pairs.persist()?;
        self.media_index.persist()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[test]
    fn test_layout_follows_settings() {
        let settings = Settings {
            content_folder: "pages".to_string(),
            ..Settings::default()
        };
        let layout = SyncLayout::new(Path::new("/site/.contentsync"), &settings);
        assert_eq!(layout.kind_root(NodeKind::Content), Path::new("/site/.contentsync/pages"));
        assert_eq!(layout.kind_root(NodeKind::Media), Path::new("/site/.contentsync/media"));
        assert_eq!(layout.pairs, Path::new("/site/.contentsync/pairs.jsonl"));
    }

    #[test]
    fn test_persist_then_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::default();
        let (source, target) = (Uuid::new_v4(), Uuid::new_v4());

        let mut ctx = SyncContext::open(temp_dir.path(), &settings).unwrap();
        ctx.pairs.save_pair(source, target);
        ctx.media_index.record(target, "Logo", -1);
        ctx.persist().unwrap();

        let reopened = SyncContext::open(temp_dir.path(), &settings).unwrap();
        assert_eq!(reopened.pairs.lookup_target(source), Some(target));
        assert_eq!(reopened.media_index.get(target).unwrap().name, "Logo");
    }
}

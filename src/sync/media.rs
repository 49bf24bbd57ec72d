//! Media import steps.
//!
//! Media nodes go through the same walk as content. What differs happens
//! after properties are applied: the node is renamed or moved in place when
//! the file says so, staged asset files are bound to it, and it is saved
//! without any publish state.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{LiveNode, FILE_PROPERTY};
use crate::storage::LiveStore;
use crate::sync::file::staged_media_files;
use crate::sync::import::Importer;
use crate::sync::types::{store_error, SerializedNode, SyncResult};

impl<S: LiveStore> Importer<'_, S> {
    /// Finish a media node: follow renames and moves, bind assets, save.
    pub(crate) fn save_media(
        &mut self,
        live: &mut LiveNode,
        node: &SerializedNode,
        parent_id: i64,
    ) -> SyncResult<()> {
        if live.name != node.name {
            debug!(from = %live.name, to = %node.name, "Renaming media node");
            live.name.clone_from(&node.name);
        }
        if live.parent_id != parent_id {
            debug!(from = live.parent_id, to = parent_id, name = %live.name, "Moving media node");
            live.parent_id = parent_id;
        }

        let files_root = self.ctx.layout.files.clone();
        self.bind_assets(live, &files_root, node.key)?;

        self.store.save(live).map_err(store_error)
    }

    /// Attach every staged file under `files/<source key>/`. Files are
    /// visited in name order, so the last one is what the node ends up with.
    ///
    /// Unreadable assets are logged and skipped.
    fn bind_assets(&mut self, live: &mut LiveNode, files_root: &Path, source_key: Uuid) -> SyncResult<()> {
        let files = match staged_media_files(files_root, source_key) {
            Ok(files) => files,
            Err(e) => {
                warn!(key = %source_key, error = %e, "Cannot read staged assets");
                return Ok(());
            }
        };

        for path in files {
            let data = match fs::read(&path) {
                Ok(data) => data,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read staged asset");
                    continue;
                }
            };
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            self.store
                .attach_file(live, FILE_PROPERTY, &file_name, &data)
                .map_err(store_error)?;
            debug!(name = %live.name, file = %file_name, "Bound staged asset");
        }

        Ok(())
    }
}

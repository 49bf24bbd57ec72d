//! Live change handling.
//!
//! Once startup has run, edits made in the live store are mirrored into the
//! sync folder as they happen: saved or published nodes are written, renamed
//! and moved nodes take their files and child folders with them, and trashed
//! nodes have their files archived.
//!
//! [`WatchedStore`] wraps a live store and reports every mutation to a
//! [`ChangeHandler`], so callers keep using the plain [`LiveStore`] API.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EventMode;
use crate::error::Result;
use crate::model::{LiveNode, NodeKind};
use crate::storage::LiveStore;
use crate::sync::context::SyncContext;
use crate::sync::export::Exporter;
use crate::sync::file::{archive_file, clean_media_files, move_file, rename_file};
use crate::sync::types::SyncResult;

/// Reacts to live changes according to the configured [`EventMode`].
#[derive(Debug, Clone, Copy)]
pub struct ChangeHandler {
    mode: EventMode,
}

impl ChangeHandler {
    #[must_use]
    pub const fn new(mode: EventMode) -> Self {
        Self { mode }
    }

    #[must_use]
    pub const fn mode(&self) -> EventMode {
        self.mode
    }

    /// Whether the handler reacts to anything at all.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        !matches!(self.mode, EventMode::Off)
    }

    /// Wrap a live store so its mutations reach this handler.
    pub fn watch<'a, S: LiveStore>(self, store: &'a mut S, ctx: &'a mut SyncContext) -> WatchedStore<'a, S> {
        WatchedStore {
            inner: store,
            ctx,
            handler: self,
        }
    }

    /// A node was saved without being published.
    ///
    /// `previous` is the stored copy from before the save. Content files are
    /// only written in [`EventMode::Save`]; media has no publish state and is
    /// written in either mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the live store or a file operation fails.
    pub fn on_saved<S: LiveStore>(
        &self,
        store: &S,
        ctx: &mut SyncContext,
        node: &LiveNode,
        previous: Option<&LiveNode>,
    ) -> SyncResult<Option<PathBuf>> {
        if !self.is_attached() {
            return Ok(None);
        }

        self.follow_layout_change(store, ctx, node, previous)?;

        if self.mode == EventMode::Publish && node.kind == NodeKind::Content {
            return Ok(None);
        }
        write(store, ctx, node).map(Some)
    }

    /// A node was published.
    ///
    /// # Errors
    ///
    /// Returns an error if the live store or a file operation fails.
    pub fn on_published<S: LiveStore>(
        &self,
        store: &S,
        ctx: &mut SyncContext,
        node: &LiveNode,
        previous: Option<&LiveNode>,
    ) -> SyncResult<Option<PathBuf>> {
        if !self.is_attached() {
            return Ok(None);
        }

        self.follow_layout_change(store, ctx, node, previous)?;
        write(store, ctx, node).map(Some)
    }

    /// A node was moved to the recycle bin. `file` is where its node file
    /// lived before it was trashed.
    ///
    /// Returns whether a file was archived.
    ///
    /// # Errors
    ///
    /// Returns an error if a file operation fails.
    pub fn on_trashed(&self, ctx: &mut SyncContext, node: &LiveNode, file: &Path) -> SyncResult<bool> {
        if !self.is_attached() {
            return Ok(false);
        }

        let archived = archive_file(file, &ctx.layout.root, &ctx.layout.archive, ctx.versions)?;

        if node.kind == NodeKind::Media {
            let source = ctx.pairs.resolve_source(node.key).unwrap_or(node.key);
            clean_media_files(&ctx.layout.files, source)?;
            ctx.media_index.remove(node.key);
        }

        info!(name = %node.name, id = node.id, archived, "Node trashed");
        Ok(archived)
    }

    /// Carry files along when a node's name or parent changed.
    fn follow_layout_change<S: LiveStore>(
        &self,
        store: &S,
        ctx: &SyncContext,
        node: &LiveNode,
        previous: Option<&LiveNode>,
    ) -> SyncResult<()> {
        let indexed = match node.kind {
            NodeKind::Media => ctx.media_index.get(node.key).map(|e| (e.name.clone(), e.parent_id)),
            NodeKind::Content => None,
        };
        let Some((old_name, old_parent)) =
            indexed.or_else(|| previous.map(|p| (p.name.clone(), p.parent_id)))
        else {
            return Ok(());
        };

        let exporter = Exporter::new(store, ctx);

        if old_parent != node.parent_id {
            let old_dir = exporter.folder_for_parent(node.kind, old_parent)?;
            let new_dir = exporter.folder_for_parent(node.kind, node.parent_id)?;
            debug!(name = %node.name, from = %old_dir.display(), to = %new_dir.display(), "Node moved");
            move_file(&old_dir, &new_dir, &old_name, node.kind)?;
        }

        if old_name != node.name {
            let dir = exporter.folder_for_parent(node.kind, node.parent_id)?;
            debug!(from = %old_name, to = %node.name, "Node renamed");
            rename_file(&dir, &old_name, &node.name, node.kind)?;
        }

        Ok(())
    }
}

/// Write one node's file and, for media, remember where it now lives.
fn write<S: LiveStore>(store: &S, ctx: &mut SyncContext, node: &LiveNode) -> SyncResult<PathBuf> {
    let path = Exporter::new(store, ctx).export_node(node)?;
    if node.kind == NodeKind::Media {
        ctx.media_index.record(node.key, &node.name, node.parent_id);
    }
    debug!(name = %node.name, path = %path.display(), "Wrote node file");
    Ok(path)
}

/// A live store whose mutations are mirrored into the sync folder.
pub struct WatchedStore<'a, S: LiveStore> {
    inner: &'a mut S,
    ctx: &'a mut SyncContext,
    handler: ChangeHandler,
}

impl<S: LiveStore> WatchedStore<'_, S> {
    /// The handler changes are reported to.
    #[must_use]
    pub fn handler(&self) -> ChangeHandler {
        self.handler
    }

    /// The sync context changes are written through.
    #[must_use]
    pub fn context(&self) -> &SyncContext {
        &*self.ctx
    }

    fn previous(&self, node: &LiveNode) -> Result<Option<LiveNode>> {
        self.inner.find_by_id(node.kind, node.id)
    }
}

impl<S: LiveStore> LiveStore for WatchedStore<'_, S> {
    fn find_by_key(&self, kind: NodeKind, key: Uuid) -> Result<Option<LiveNode>> {
        self.inner.find_by_key(kind, key)
    }

    fn find_by_id(&self, kind: NodeKind, id: i64) -> Result<Option<LiveNode>> {
        self.inner.find_by_id(kind, id)
    }

    fn create_node(
        &mut self,
        kind: NodeKind,
        name: &str,
        parent_id: i64,
        type_alias: &str,
    ) -> Result<LiveNode> {
        self.inner.create_node(kind, name, parent_id, type_alias)
    }

    fn has_property(&self, node: &LiveNode, alias: &str) -> bool {
        self.inner.has_property(node, alias)
    }

    fn has_template(&self, alias: &str) -> Result<bool> {
        self.inner.has_template(alias)
    }

    fn save(&mut self, node: &mut LiveNode) -> Result<()> {
        let previous = self.previous(node)?;
        self.inner.save(node)?;
        self.handler
            .on_saved(&*self.inner, self.ctx, node, previous.as_ref())?;
        Ok(())
    }

    fn save_and_publish(&mut self, node: &mut LiveNode) -> Result<()> {
        let previous = self.previous(node)?;
        self.inner.save_and_publish(node)?;
        self.handler
            .on_published(&*self.inner, self.ctx, node, previous.as_ref())?;
        Ok(())
    }

    fn unpublish(&mut self, node: &mut LiveNode) -> Result<()> {
        let previous = self.previous(node)?;
        self.inner.unpublish(node)?;
        self.handler
            .on_saved(&*self.inner, self.ctx, node, previous.as_ref())?;
        Ok(())
    }

    fn trash(&mut self, node: &mut LiveNode) -> Result<()> {
        let file = Exporter::new(&*self.inner, self.ctx).node_path(node)?;
        self.inner.trash(node)?;
        self.handler.on_trashed(self.ctx, node, &file)?;
        Ok(())
    }

    fn attach_file(
        &mut self,
        node: &mut LiveNode,
        alias: &str,
        file_name: &str,
        data: &[u8],
    ) -> Result<()> {
        self.inner.attach_file(node, alias, file_name, data)
    }

    fn media_file(&self, node: &LiveNode) -> Result<Option<(String, Vec<u8>)>> {
        self.inner.media_file(node)
    }

    fn children(&self, kind: NodeKind, parent_id: i64) -> Result<Vec<LiveNode>> {
        self.inner.children(kind, parent_id)
    }
}

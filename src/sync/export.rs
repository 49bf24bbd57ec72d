//! Node file export.
//!
//! The exporter walks the live store depth first and writes one node file
//! per live node, in a folder layout derived from node names:
//!
//! ```text
//! content/Home.content
//! content/Home/AboutUs.content
//! media/Logo.media            files/<source key>/logo.png
//! ```
//!
//! Identities are written as the *source* identity whenever the node came
//! from another environment, so files keep the identity they were first
//! exported with no matter how many environments they pass through.
//!
//! # Name collisions
//!
//! Cleaned names keep ASCII letters and digits only, so siblings can clean
//! to the same string. The later sibling (by sort order, then id) is written
//! as `<name>_<n>`; a name with nothing left after cleaning is written as
//! `_<id>`. A cleaned name never contains `_`, so these never overwrite a
//! regular file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::DateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{LiveNode, NodeKind, ROOT_ID};
use crate::storage::LiveStore;
use crate::sync::context::SyncContext;
use crate::sync::file::{
    clean_file_name, ensure_gitignore, export_media_file, node_file_name, write_node_file,
};
use crate::sync::types::{
    store_error, ExportStats, SerializedNode, SerializedProperty, SyncError, SyncResult,
};

/// Alias of the structural entries that list a node's children.
pub const CHILD_LINK_ALIAS: &str = "child";

/// Exporter for node files.
pub struct Exporter<'a, S: LiveStore> {
    store: &'a S,
    ctx: &'a SyncContext,
}

impl<'a, S: LiveStore> Exporter<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, ctx: &'a SyncContext) -> Self {
        Self { store, ctx }
    }

    /// Export both live trees.
    ///
    /// Existing node files are overwritten; files of nodes that no longer
    /// exist are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the live store or a file write fails.
    pub fn export(&self) -> SyncResult<ExportStats> {
        let start = Instant::now();
        self.ctx.layout.ensure_dirs()?;
        ensure_gitignore(&self.ctx.layout.root)?;

        let mut stats = ExportStats::default();
        for kind in [NodeKind::Content, NodeKind::Media] {
            let roots = self.children(kind, ROOT_ID)?;
            let dir = self.ctx.layout.kind_root(kind).to_path_buf();
            self.export_level(&roots, &dir, &mut stats)?;
        }

        info!(
            content = stats.content_files,
            media = stats.media_files,
            assets = stats.assets,
            renamed = stats.renamed,
            elapsed_ms = start.elapsed().as_millis(),
            "Export complete"
        );
        Ok(stats)
    }

    /// Export a single node, e.g. after it was saved.
    ///
    /// Returns the path of the written file.
    ///
    /// # Errors
    ///
    /// Returns an error if the live store or the file write fails.
    pub fn export_node(&self, node: &LiveNode) -> SyncResult<PathBuf> {
        let path = self.node_path(node)?;
        let kids = self.children(node.kind, node.id)?;
        let mut stats = ExportStats::default();
        self.write_node(node, &kids, &path, &mut stats)?;
        Ok(path)
    }

    /// Where a node's file lives under the current live tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the live store fails or an ancestor is missing.
    pub fn node_path(&self, node: &LiveNode) -> SyncResult<PathBuf> {
        let dir = self.folder_for_parent(node.kind, node.parent_id)?;
        let stem = self.stem_for(node)?;
        Ok(dir.join(node_file_name(&stem, node.kind)))
    }

    /// Folder holding the files of a parent's children.
    ///
    /// # Errors
    ///
    /// Returns an error if the live store fails or an ancestor is missing.
    pub fn folder_for_parent(&self, kind: NodeKind, parent_id: i64) -> SyncResult<PathBuf> {
        let mut chain = Vec::new();
        let mut id = parent_id;
        while id != ROOT_ID {
            let parent = self
                .store
                .find_by_id(kind, id)
                .map_err(store_error)?
                .ok_or_else(|| SyncError::Database(format!("Parent node {id} not found")))?;
            id = parent.parent_id;
            chain.push(parent);
        }

        let mut dir = self.ctx.layout.kind_root(kind).to_path_buf();
        for ancestor in chain.iter().rev() {
            dir.push(self.stem_for(ancestor)?);
        }
        Ok(dir)
    }

    /// Identity written to files for a live identity.
    #[must_use]
    pub fn source_key(&self, key: Uuid) -> Uuid {
        self.ctx.pairs.resolve_source(key).unwrap_or(key)
    }

    fn export_level(&self, nodes: &[LiveNode], dir: &Path, stats: &mut ExportStats) -> SyncResult<()> {
        let stems = file_stems(nodes);

        for (node, stem) in nodes.iter().zip(&stems) {
            if *stem != clean_file_name(&node.name) {
                debug!(name = %node.name, id = node.id, file = %stem, "Disambiguated file name");
                stats.renamed += 1;
            }

            let kids = self.children(node.kind, node.id)?;
            self.write_node(node, &kids, &dir.join(node_file_name(stem, node.kind)), stats)?;

            if !kids.is_empty() {
                self.export_level(&kids, &dir.join(stem), stats)?;
            }
        }

        Ok(())
    }

    fn write_node(
        &self,
        node: &LiveNode,
        kids: &[LiveNode],
        path: &Path,
        stats: &mut ExportStats,
    ) -> SyncResult<()> {
        write_node_file(path, node.kind, &self.serialize(node, kids))?;

        match node.kind {
            NodeKind::Content => stats.content_files += 1,
            NodeKind::Media => {
                stats.media_files += 1;
                if self.stage_asset(node)? {
                    stats.assets += 1;
                }
            }
        }
        Ok(())
    }

    fn serialize(&self, node: &LiveNode, kids: &[LiveNode]) -> SerializedNode {
        let mut properties: Vec<_> = node
            .values
            .iter()
            .map(|(alias, value)| SerializedProperty::new(alias, value))
            .collect();
        properties.extend(kids.iter().map(|kid| SerializedProperty {
            alias: CHILD_LINK_ALIAS.to_string(),
            value: self.source_key(kid.key).to_string(),
            is_doc: true,
        }));

        SerializedNode {
            id: node.id,
            key: self.source_key(node.key),
            name: node.name.clone(),
            type_alias: node.type_alias.clone(),
            template: node.template.clone(),
            sort_order: node.sort_order,
            published: node.published,
            updated: DateTime::from_timestamp_millis(node.updated_at),
            properties,
        }
    }

    fn stage_asset(&self, node: &LiveNode) -> SyncResult<bool> {
        let Some((file_name, data)) = self.store.media_file(node).map_err(store_error)? else {
            return Ok(false);
        };
        export_media_file(&self.ctx.layout.files, self.source_key(node.key), &file_name, &data)?;
        Ok(true)
    }

    fn stem_for(&self, node: &LiveNode) -> SyncResult<String> {
        let siblings = self.children(node.kind, node.parent_id)?;
        let stems = file_stems(&siblings);
        Ok(siblings
            .iter()
            .zip(stems)
            .find(|(sibling, _)| sibling.id == node.id)
            .map_or_else(|| lone_stem(node), |(_, stem)| stem))
    }

    fn children(&self, kind: NodeKind, parent_id: i64) -> SyncResult<Vec<LiveNode>> {
        self.store.children(kind, parent_id).map_err(store_error)
    }
}

/// File stems for a list of siblings, in the order given.
#[must_use]
pub fn file_stems(siblings: &[LiveNode]) -> Vec<String> {
    let mut used = HashSet::new();
    siblings
        .iter()
        .map(|node| {
            let clean = clean_file_name(&node.name);
            if clean.is_empty() {
                return lone_stem(node);
            }
            if used.insert(clean.clone()) {
                return clean;
            }
            let mut n = 2;
            loop {
                let candidate = format!("{clean}_{n}");
                if used.insert(candidate.clone()) {
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

/// Stem of a node considered on its own, without siblings.
fn lone_stem(node: &LiveNode) -> String {
    let clean = clean_file_name(&node.name);
    if clean.is_empty() {
        format!("_{}", node.id)
    } else {
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::storage::SqliteStore;
    use crate::sync::file::{count_node_files, read_node_file, staged_media_files};
    use crate::sync::import::import_all;
    use tempfile::TempDir;

    fn store() -> SqliteStore {
        let mut store = SqliteStore::open_memory().unwrap();
        store
            .register_type(NodeKind::Content, "page", &["title".to_string()])
            .unwrap();
        store
            .register_type(NodeKind::Media, "image", &["alt".to_string()])
            .unwrap();
        store
    }

    fn add(store: &mut SqliteStore, name: &str, parent: i64, title: &str) -> LiveNode {
        let mut node = store.create_node(NodeKind::Content, name, parent, "page").unwrap();
        node.set_value("title", title);
        store.save_and_publish(&mut node).unwrap();
        node
    }

    #[test]
    fn test_export_writes_tree_layout() {
        let dir = TempDir::new().unwrap();
        let ctx = SyncContext::open(dir.path(), &Settings::default()).unwrap();
        let mut store = store();
        let home = add(&mut store, "Home", ROOT_ID, "Welcome");
        add(&mut store, "About Us", home.id, "About");

        let stats = Exporter::new(&store, &ctx).export().unwrap();
        assert_eq!(stats.content_files, 2);

        let home_file = ctx.layout.content.join("Home.content");
        let about_file = ctx.layout.content.join("Home").join("AboutUs.content");
        let written = read_node_file(&home_file, NodeKind::Content).unwrap();
        assert_eq!(written.key, home.key);
        assert!(written.published);
        assert!(written.properties.iter().any(|p| p.is_doc && p.alias == CHILD_LINK_ALIAS));
        assert_eq!(
            read_node_file(&about_file, NodeKind::Content).unwrap().name,
            "About Us"
        );
        assert!(dir.path().join(".gitignore").exists());
    }

    #[test]
    fn test_colliding_names_do_not_overwrite_each_other() {
        let dir = TempDir::new().unwrap();
        let ctx = SyncContext::open(dir.path(), &Settings::default()).unwrap();
        let mut store = store();
        add(&mut store, "News!", ROOT_ID, "first");
        add(&mut store, "News?", ROOT_ID, "second");
        add(&mut store, "???", ROOT_ID, "third");

        let stats = Exporter::new(&store, &ctx).export().unwrap();
        assert_eq!(stats.content_files, 3);
        assert_eq!(stats.renamed, 2);
        assert_eq!(count_node_files(&ctx.layout.content, NodeKind::Content), 3);

        let second = read_node_file(&ctx.layout.content.join("News_2.content"), NodeKind::Content)
            .unwrap();
        assert_eq!(second.name, "News?");
    }

    #[test]
    fn test_export_node_matches_full_export_path() {
        let dir = TempDir::new().unwrap();
        let ctx = SyncContext::open(dir.path(), &Settings::default()).unwrap();
        let mut store = store();
        let home = add(&mut store, "Home", ROOT_ID, "Welcome");
        add(&mut store, "Team", home.id, "first");
        let second = add(&mut store, "Team", home.id, "second");

        let path = Exporter::new(&store, &ctx).export_node(&second).unwrap();
        assert_eq!(path, ctx.layout.content.join("Home").join("Team_2.content"));
    }

    #[test]
    fn test_media_export_stages_asset_under_source_key() {
        let dir = TempDir::new().unwrap();
        let mut ctx = SyncContext::open(dir.path(), &Settings::default()).unwrap();
        let mut store = store();
        let mut logo = store.create_node(NodeKind::Media, "Logo", ROOT_ID, "image").unwrap();
        store
            .attach_file(&mut logo, crate::model::FILE_PROPERTY, "logo.png", b"png")
            .unwrap();
        store.save(&mut logo).unwrap();

        let source = Uuid::new_v4();
        ctx.pairs.save_pair(source, logo.key);

        let stats = Exporter::new(&store, &ctx).export().unwrap();
        assert_eq!(stats.media_files, 1);
        assert_eq!(stats.assets, 1);
        assert_eq!(staged_media_files(&ctx.layout.files, source).unwrap().len(), 1);
        let written = read_node_file(&ctx.layout.media.join("Logo.media"), NodeKind::Media).unwrap();
        assert_eq!(written.key, source);
    }

    #[test]
    fn test_import_then_export_round_trips() {
        let source_dir = TempDir::new().unwrap();
        let source_ctx = SyncContext::open(source_dir.path(), &Settings::default()).unwrap();
        let mut origin = store();
        let home = add(&mut origin, "Home", ROOT_ID, "Welcome");
        add(&mut origin, "About Us", home.id, "About");
        Exporter::new(&origin, &source_ctx).export().unwrap();

        let mut ctx = SyncContext::open(source_dir.path(), &Settings::default()).unwrap();
        let mut target = store();
        import_all(&mut target, &mut ctx, true).unwrap();

        let out_dir = TempDir::new().unwrap();
        let out_ctx = SyncContext {
            layout: crate::sync::context::SyncLayout::new(out_dir.path(), &Settings::default()),
            pairs: std::mem::take(&mut ctx.pairs),
            media_index: std::mem::take(&mut ctx.media_index),
            versions: false,
        };
        Exporter::new(&target, &out_ctx).export().unwrap();

        for rel in ["Home.content", "Home/AboutUs.content"] {
            let before = read_node_file(&source_ctx.layout.content.join(rel), NodeKind::Content)
                .unwrap();
            let after = read_node_file(&out_ctx.layout.content.join(rel), NodeKind::Content)
                .unwrap();
            assert_eq!(after.key, before.key);
            assert_eq!(after.name, before.name);
            assert_eq!(after.type_alias, before.type_alias);
            assert_eq!(after.published, before.published);
            assert_eq!(after.sort_order, before.sort_order);
            assert_eq!(after.properties, before.properties);
        }
    }
}

//! Node file import.
//!
//! The importer walks a tree of node files depth first and brings the live
//! store in line with it. For every node it:
//!
//! 1. resolves the node's identity through the correlation table,
//! 2. finds the live node, or creates one when there is none (or the one
//!    there is sits in the recycle bin),
//! 3. skips nodes whose live copy is at least as new as the file,
//! 4. applies template, sort order and property values,
//! 5. saves (and for content, publishes or unpublishes),
//! 6. recurses into the node's child folder with the live id as parent.
//!
//! A run is two passes over the same files. The first establishes
//! identities and applies values raw; the second applies them again with
//! cross-references rewritten to ids that exist in this environment.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::model::{LiveNode, NodeKind, ROOT_ID};
use crate::storage::LiveStore;
use crate::sync::context::SyncContext;
use crate::sync::file::{child_dir, node_files, read_node_file};
use crate::sync::rewrite::{resolve_live_id, rewrite_references, UnresolvedPolicy};
use crate::sync::types::{
    store_error, ImportPass, ImportReport, ImportStats, NodeState, PassStats, SerializedNode,
    SyncError, SyncResult,
};

/// Importer for one tree of node files.
///
/// Content and media share the walk and the state machine; the steps that
/// differ (publish state for content, asset binding and in-place rename or
/// move for media) are chosen by `kind`.
pub struct Importer<'a, S: LiveStore> {
    pub(crate) store: &'a mut S,
    pub(crate) ctx: &'a mut SyncContext,
    kind: NodeKind,
    policy: UnresolvedPolicy,
    /// Source numeric id → live numeric id for nodes created or updated by
    /// the identities pass of this run.
    id_index: HashMap<i64, i64>,
}

impl<'a, S: LiveStore> Importer<'a, S> {
    /// Create an importer for one tree, using that tree's unresolved policy.
    #[must_use]
    pub fn new(store: &'a mut S, ctx: &'a mut SyncContext, kind: NodeKind) -> Self {
        Self {
            store,
            ctx,
            kind,
            policy: UnresolvedPolicy::for_kind(kind),
            id_index: HashMap::new(),
        }
    }

    /// Override the policy for references that do not resolve.
    #[must_use]
    pub fn with_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ids recorded by the last identities pass.
    #[must_use]
    pub fn id_index(&self) -> &HashMap<i64, i64> {
        &self.id_index
    }

    /// Run the identities pass and, when `resolve` is set, the
    /// reference-resolving pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the live store fails. Unusable node files are
    /// reported in the stats instead.
    pub fn import(&mut self, resolve: bool) -> SyncResult<ImportStats> {
        let mut stats = ImportStats::new(self.kind);
        stats.identities = self.run(ImportPass::Identities)?;
        if resolve {
            stats.references = Some(self.run(ImportPass::References)?);
        }
        Ok(stats)
    }

    /// Walk the whole tree once.
    ///
    /// # Errors
    ///
    /// Returns an error if the live store fails.
    pub fn run(&mut self, pass: ImportPass) -> SyncResult<PassStats> {
        if pass == ImportPass::Identities {
            self.id_index.clear();
        }

        let root = self.ctx.layout.kind_root(self.kind).to_path_buf();
        let mut stats = PassStats::default();
        let start = Instant::now();

        if root.is_dir() {
            self.import_dir(&root, ROOT_ID, pass, &mut stats)?;
        } else {
            debug!(kind = %self.kind, root = %root.display(), "No folder to import");
        }

        info!(
            kind = %self.kind,
            ?pass,
            created = stats.created,
            updated = stats.updated,
            up_to_date = stats.up_to_date,
            failed = stats.failures.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Import pass complete"
        );
        Ok(stats)
    }

    fn import_dir(
        &mut self,
        dir: &Path,
        parent_id: i64,
        pass: ImportPass,
        stats: &mut PassStats,
    ) -> SyncResult<()> {
        let files = match node_files(dir, self.kind) {
            Ok(files) => files,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot read folder, skipping subtree");
                stats.fail(dir, e);
                return Ok(());
            }
        };

        for path in files {
            let node = match read_node_file(&path, self.kind) {
                Ok(node) => node,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping node file and its subtree");
                    stats.fail(&path, e);
                    continue;
                }
            };

            let (state, live_id) = self.import_node(&node, parent_id, pass)?;
            stats.record(state);

            let children = child_dir(&path);
            if children.is_dir() {
                self.import_dir(&children, live_id, pass, stats)?;
            }
        }

        Ok(())
    }

    /// Bring one live node in line with its file. Returns the outcome and
    /// the live id children should be attached to.
    fn import_node(
        &mut self,
        node: &SerializedNode,
        parent_id: i64,
        pass: ImportPass,
    ) -> SyncResult<(NodeState, i64)> {
        let target = self.ctx.pairs.resolve_target(node.key);
        let existing = self
            .store
            .find_by_key(self.kind, target)
            .map_err(store_error)?;

        let (mut live, state) = match existing {
            Some(live) if !live.trashed => {
                let touched_this_run =
                    pass.resolves_references() && self.id_index.contains_key(&node.id);
                if !touched_this_run && node.updated_millis() <= live.updated_at {
                    debug!(name = %node.name, id = live.id, "Live node is up to date");
                    return Ok((NodeState::UpToDate, live.id));
                }
                (live, NodeState::Updated)
            }
            found => {
                if let Some(trashed) = found {
                    debug!(name = %node.name, id = trashed.id, "Live node is trashed, creating a new one");
                }
                (self.create(node, parent_id)?, NodeState::Created)
            }
        };

        self.apply_properties(&mut live, node, pass)?;

        match self.kind {
            NodeKind::Content => self.save_content(&mut live, node)?,
            NodeKind::Media => self.save_media(&mut live, node, parent_id)?,
        }

        if pass == ImportPass::Identities {
            self.id_index.insert(node.id, live.id);
        }

        debug!(name = %node.name, id = live.id, ?state, ?pass, "Imported node");
        Ok((state, live.id))
    }

    fn create(&mut self, node: &SerializedNode, parent_id: i64) -> SyncResult<LiveNode> {
        let created = self
            .store
            .create_node(self.kind, &node.name, parent_id, &node.type_alias)
            .map_err(store_error)?;

        self.ctx.pairs.save_pair(node.key, created.key);
        if self.kind == NodeKind::Media {
            self.ctx
                .media_index
                .record(created.key, &created.name, parent_id);
        }
        Ok(created)
    }

    fn apply_properties(
        &mut self,
        live: &mut LiveNode,
        node: &SerializedNode,
        pass: ImportPass,
    ) -> SyncResult<()> {
        if self.kind == NodeKind::Content {
            if let Some(template) = &node.template {
                if self.store.has_template(template).map_err(store_error)? {
                    live.template = Some(template.clone());
                } else {
                    debug!(template = %template, name = %node.name, "Unknown template, leaving unset");
                }
            }
            live.sort_order = node.sort_order;
        }

        for prop in node.properties.iter().filter(|p| !p.is_doc) {
            if !self.store.has_property(live, &prop.alias) {
                debug!(alias = %prop.alias, name = %node.name, "Property not on node type, skipping");
                continue;
            }

            let value = if pass.resolves_references() {
                let store = &*self.store;
                let pairs = &self.ctx.pairs;
                let kind = self.kind;
                rewrite_references(&prop.value, self.policy, |token| {
                    resolve_live_id(store, pairs, kind, token)
                })?
            } else {
                prop.value.clone()
            };
            live.set_value(&prop.alias, value);
        }

        Ok(())
    }

    /// Persist a content node and settle its published state.
    fn save_content(&mut self, live: &mut LiveNode, node: &SerializedNode) -> SyncResult<()> {
        if node.published {
            self.store.save_and_publish(live).map_err(store_error)?;
        } else {
            let was_published = live.published;
            self.store.save(live).map_err(store_error)?;
            if was_published {
                self.store.unpublish(live).map_err(store_error)?;
            }
        }
        Ok(())
    }
}

/// Import media, then content, from the sync root.
///
/// Media goes first so that content values referencing media can be
/// resolved in the content reference pass.
///
/// # Errors
///
/// Returns [`SyncError::NothingToImport`] if neither tree has a folder, or
/// an error if the live store fails.
pub fn import_all<S: LiveStore>(
    store: &mut S,
    ctx: &mut SyncContext,
    resolve: bool,
) -> SyncResult<ImportReport> {
    if !ctx.layout.content.is_dir() && !ctx.layout.media.is_dir() {
        return Err(SyncError::NothingToImport);
    }

    let start = Instant::now();
    let media = Importer::new(store, ctx, NodeKind::Media).import(resolve)?;
    let content = Importer::new(store, ctx, NodeKind::Content).import(resolve)?;
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    info!(
        media = media.identities.total(),
        content = content.identities.total(),
        failures = media.failure_count() + content.failure_count(),
        duration_ms,
        "Import complete"
    );

    Ok(ImportReport {
        media,
        content,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::storage::SqliteStore;
    use crate::sync::file::write_node_file;
    use crate::sync::types::SerializedProperty;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;
    use uuid::Uuid;

    struct Fixture {
        _dir: TempDir,
        ctx: SyncContext,
        store: SqliteStore,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let ctx = SyncContext::open(dir.path(), &Settings::default()).unwrap();
        let mut store = SqliteStore::open_memory().unwrap();
        store
            .register_type(
                NodeKind::Content,
                "page",
                &["title".to_string(), "related".to_string()],
            )
            .unwrap();
        store.register_template("pageTemplate").unwrap();
        Fixture { _dir: dir, ctx, store }
    }

    fn page(id: i64, name: &str, year: i32) -> SerializedNode {
        SerializedNode {
            id,
            key: Uuid::new_v4(),
            name: name.to_string(),
            type_alias: "page".to_string(),
            template: Some("pageTemplate".to_string()),
            sort_order: 0,
            published: true,
            updated: Some(Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()),
            properties: vec![SerializedProperty::new("title", name)],
        }
    }

    fn write(f: &Fixture, rel: &str, node: &SerializedNode) {
        let path = f.ctx.layout.content.join(rel);
        write_node_file(&path, NodeKind::Content, node).unwrap();
    }

    fn import(f: &mut Fixture) -> ImportStats {
        Importer::new(&mut f.store, &mut f.ctx, NodeKind::Content)
            .import(true)
            .unwrap()
    }

    fn live(f: &Fixture, source: Uuid) -> LiveNode {
        let target = f.ctx.pairs.lookup_target(source).unwrap();
        f.store.find_by_key(NodeKind::Content, target).unwrap().unwrap()
    }

    #[test]
    fn test_creates_tree_with_structure() {
        let mut f = fixture();
        let home = page(1, "Home", 2099);
        let about = page(2, "About Us", 2099);
        write(&f, "Home.content", &home);
        write(&f, "Home/AboutUs.content", &about);

        let stats = import(&mut f);
        assert_eq!(stats.identities.created, 2);
        assert!(stats.identities.failures.is_empty());

        let home_live = live(&f, home.key);
        let about_live = live(&f, about.key);
        assert_eq!(home_live.parent_id, ROOT_ID);
        assert_eq!(about_live.parent_id, home_live.id);
        assert_eq!(about_live.value("title"), Some("About Us"));
        assert_eq!(home_live.template.as_deref(), Some("pageTemplate"));
        assert!(home_live.published);
        assert_ne!(home_live.key, home.key);
    }

    #[test]
    fn test_second_import_is_idempotent() {
        let mut f = fixture();
        let home = page(1, "Home", 2020);
        write(&f, "Home.content", &home);

        import(&mut f);
        let first = live(&f, home.key);
        let pairs_after_first = f.ctx.pairs.pairs();

        let stats = import(&mut f);
        assert_eq!(stats.identities.created, 0);
        assert_eq!(stats.identities.up_to_date, 1);
        assert_eq!(f.ctx.pairs.pairs(), pairs_after_first);

        let second = live(&f, home.key);
        assert_eq!(second.id, first.id);
        assert_eq!(second.values, first.values);
    }

    #[test]
    fn test_newer_live_node_is_not_overwritten() {
        let mut f = fixture();
        let mut home = page(1, "Home", 2020);
        write(&f, "Home.content", &home);
        import(&mut f);

        home.properties = vec![SerializedProperty::new("title", "Stale edit")];
        write(&f, "Home.content", &home);
        let stats = import(&mut f);

        assert_eq!(stats.identities.up_to_date, 1);
        assert_eq!(live(&f, home.key).value("title"), Some("Home"));
    }

    #[test]
    fn test_newer_file_updates_and_unpublishes() {
        let mut f = fixture();
        let mut home = page(1, "Home", 2020);
        write(&f, "Home.content", &home);
        import(&mut f);
        assert!(live(&f, home.key).published);

        home.updated = Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap());
        home.published = false;
        home.properties = vec![SerializedProperty::new("title", "Draft")];
        write(&f, "Home.content", &home);
        let stats = import(&mut f);

        assert_eq!(stats.identities.updated, 1);
        let updated = live(&f, home.key);
        assert_eq!(updated.value("title"), Some("Draft"));
        assert!(!updated.published);
    }

    #[test]
    fn test_trashed_node_is_recreated() {
        let mut f = fixture();
        let home = page(1, "Home", 2020);
        write(&f, "Home.content", &home);
        import(&mut f);

        let mut old = live(&f, home.key);
        f.store.trash(&mut old).unwrap();

        let stats = import(&mut f);
        assert_eq!(stats.identities.created, 1);

        let fresh = live(&f, home.key);
        assert_ne!(fresh.id, old.id);
        assert_ne!(fresh.key, old.key);
        assert!(!fresh.trashed);
        let kept = f.store.find_by_key(NodeKind::Content, old.key).unwrap().unwrap();
        assert!(kept.trashed);
        assert_eq!(f.ctx.pairs.resolve_source(fresh.key), Some(home.key));
        assert_eq!(f.ctx.pairs.resolve_source(old.key), None);
    }

    #[test]
    fn test_unknown_alias_and_type_are_tolerated() {
        let mut f = fixture();
        let mut home = page(1, "Home", 2099);
        home.properties.push(SerializedProperty::new("notOnType", "x"));
        let mut odd = page(2, "Odd", 2099);
        odd.type_alias = "missingType".to_string();
        write(&f, "Home.content", &home);
        write(&f, "Odd.content", &odd);

        let stats = import(&mut f);
        assert_eq!(stats.identities.created, 2);

        let home_live = live(&f, home.key);
        assert_eq!(home_live.value("notOnType"), None);
        assert_eq!(home_live.value("title"), Some("Home"));
        assert!(live(&f, odd.key).values.is_empty());
    }

    #[test]
    fn test_structural_marker_is_not_applied() {
        let mut f = fixture();
        let mut home = page(1, "Home", 2099);
        home.properties.push(SerializedProperty {
            alias: "title".to_string(),
            value: "child linkage".to_string(),
            is_doc: true,
        });
        write(&f, "Home.content", &home);

        import(&mut f);
        assert_eq!(live(&f, home.key).value("title"), Some("Home"));
    }

    #[test]
    fn test_malformed_node_skips_only_its_subtree() {
        let mut f = fixture();
        let sibling = page(3, "Sibling", 2099);
        let orphan = page(4, "Orphan", 2099);
        write(&f, "Sibling.content", &sibling);
        write(&f, "Broken/Orphan.content", &orphan);
        fs::write(f.ctx.layout.content.join("Broken.content"), r#"{"name":"Broken"}"#).unwrap();

        let stats = import(&mut f);
        assert_eq!(stats.identities.created, 1);
        assert_eq!(stats.identities.failures.len(), 1);
        assert!(stats.identities.failures[0].path.ends_with("Broken.content"));
        assert!(f.ctx.pairs.lookup_target(orphan.key).is_none());
        live(&f, sibling.key);
    }

    #[test]
    fn test_references_resolve_in_second_pass() {
        let mut f = fixture();
        let target = page(10, "Target", 2099);
        let mut linker = page(11, "Linker", 2099);
        let dangling = Uuid::new_v4();
        linker.properties = vec![SerializedProperty::new(
            "related",
            &format!("{},{dangling}", target.key),
        )];
        // "Aaa" sorts first, so the reference is read before its target exists.
        write(&f, "Aaa.content", &linker);
        write(&f, "Target.content", &target);

        let mut importer = Importer::new(&mut f.store, &mut f.ctx, NodeKind::Content);
        let stats = importer.import(true).unwrap();
        assert_eq!(stats.identities.created, 2);
        assert_eq!(stats.references.as_ref().unwrap().updated, 2);
        assert_eq!(importer.id_index().len(), 2);

        let target_live = live(&f, target.key);
        assert_eq!(
            live(&f, linker.key).value("related"),
            Some(format!("{},1000", target_live.id).as_str())
        );
    }

    #[test]
    fn test_identities_pass_alone_keeps_raw_values() {
        let mut f = fixture();
        let target = page(10, "Target", 2099);
        let mut linker = page(11, "Linker", 2099);
        linker.properties = vec![SerializedProperty::new("related", &target.key.to_string())];
        write(&f, "Linker.content", &linker);
        write(&f, "Target.content", &target);

        let stats = Importer::new(&mut f.store, &mut f.ctx, NodeKind::Content)
            .import(false)
            .unwrap();
        assert!(stats.references.is_none());
        assert_eq!(
            live(&f, linker.key).value("related"),
            Some(target.key.to_string().as_str())
        );
    }

    #[test]
    fn test_up_to_date_nodes_stay_untouched_in_reference_pass() {
        let mut f = fixture();
        let home = page(1, "Home", 2020);
        write(&f, "Home.content", &home);
        import(&mut f);

        let stats = import(&mut f);
        let references = stats.references.unwrap();
        assert_eq!(references.up_to_date, 1);
        assert_eq!(references.updated, 0);
    }

    #[test]
    fn test_content_references_resolve_to_media() {
        let mut f = fixture();
        f.store
            .register_type(NodeKind::Media, "image", &["alt".to_string()])
            .unwrap();
        let logo = SerializedNode {
            id: 1,
            key: Uuid::new_v4(),
            name: "Logo".to_string(),
            type_alias: "image".to_string(),
            template: None,
            sort_order: 0,
            published: false,
            updated: Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()),
            properties: vec![SerializedProperty::new("alt", "Logo")],
        };
        write_node_file(&f.ctx.layout.media.join("Logo.media"), NodeKind::Media, &logo).unwrap();

        let mut home = page(1050, "Home", 2099);
        home.properties = vec![SerializedProperty::new("related", &logo.key.to_string())];
        write(&f, "Home.content", &home);

        let report = import_all(&mut f.store, &mut f.ctx, true).unwrap();
        assert_eq!(report.media.identities.created, 1);
        assert_eq!(report.content.identities.created, 1);

        let logo_target = f.ctx.pairs.lookup_target(logo.key).unwrap();
        let logo_live = f.store.find_by_key(NodeKind::Media, logo_target).unwrap().unwrap();
        assert_eq!(
            live(&f, home.key).value("related"),
            Some(logo_live.id.to_string().as_str())
        );
    }

    #[test]
    fn test_policy_override_keeps_unresolved_tokens() {
        let mut f = fixture();
        let dangling = Uuid::new_v4();
        let mut linker = page(11, "Linker", 2099);
        linker.properties = vec![SerializedProperty::new("related", &dangling.to_string())];
        write(&f, "Linker.content", &linker);

        Importer::new(&mut f.store, &mut f.ctx, NodeKind::Content)
            .with_policy(UnresolvedPolicy::KeepToken)
            .import(true)
            .unwrap();
        assert_eq!(
            live(&f, linker.key).value("related"),
            Some(dangling.to_string().as_str())
        );
    }

    #[test]
    fn test_import_all_requires_a_folder() {
        let mut f = fixture();
        let err = import_all(&mut f.store, &mut f.ctx, true).unwrap_err();
        assert!(matches!(err, SyncError::NothingToImport));
    }
}

//! The live store contract.
//!
//! Importers, the exporter and the change handler only talk to the live tree
//! through [`LiveStore`]. Identity, numeric ids and last-modified times are
//! assigned by the store, never by callers.

use uuid::Uuid;

use crate::error::Result;
use crate::model::{LiveNode, NodeKind};

/// Operations a live content/media store exposes to the sync engine.
pub trait LiveStore {
    /// Fetch a node by its unique identity. Trashed nodes are returned too.
    fn find_by_key(&self, kind: NodeKind, key: Uuid) -> Result<Option<LiveNode>>;

    /// Fetch a node by its numeric id.
    fn find_by_id(&self, kind: NodeKind, id: i64) -> Result<Option<LiveNode>>;

    /// Create and persist a node with a store-assigned identity.
    ///
    /// A type alias the store does not know still yields a node; it simply
    /// accepts no properties.
    fn create_node(
        &mut self,
        kind: NodeKind,
        name: &str,
        parent_id: i64,
        type_alias: &str,
    ) -> Result<LiveNode>;

    /// Whether the node's type accepts a property alias.
    fn has_property(&self, node: &LiveNode, alias: &str) -> bool {
        node.schema.contains(alias)
    }

    /// Whether a template alias exists.
    fn has_template(&self, alias: &str) -> Result<bool>;

    /// Persist the working copy without changing its published state.
    fn save(&mut self, node: &mut LiveNode) -> Result<()>;

    /// Persist the working copy and publish it.
    fn save_and_publish(&mut self, node: &mut LiveNode) -> Result<()>;

    /// Retract publication.
    fn unpublish(&mut self, node: &mut LiveNode) -> Result<()>;

    /// Move a node to the recycle bin. The node keeps its identity.
    fn trash(&mut self, node: &mut LiveNode) -> Result<()>;

    /// Store a file payload for a node and point the working copy's file
    /// property at it. The property value is persisted on the next save.
    fn attach_file(
        &mut self,
        node: &mut LiveNode,
        alias: &str,
        file_name: &str,
        data: &[u8],
    ) -> Result<()>;

    /// The file attached to a media node, if any.
    fn media_file(&self, node: &LiveNode) -> Result<Option<(String, Vec<u8>)>>;

    /// Non-trashed children of a parent, ordered by sort order then id.
    fn children(&self, kind: NodeKind, parent_id: i64) -> Result<Vec<LiveNode>>;
}

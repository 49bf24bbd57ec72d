//! Live node model.
//!
//! A [`LiveNode`] is the working copy of a node owned by a live store. It is
//! read from the store, mutated in memory, and written back through the
//! store's own save/publish operations.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parent id used for nodes at the root of a tree.
pub const ROOT_ID: i64 = -1;

/// Property alias that holds a media node's attached file name.
pub const FILE_PROPERTY: &str = "file";

/// The two trees a live store keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Pages and other publishable content.
    Content,
    /// Binary assets (images, documents).
    Media,
}

impl NodeKind {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Media => "media",
        }
    }

    /// File extension used for this kind's node files.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Media => "media",
        }
    }

    /// The other tree.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Content => Self::Media,
            Self::Media => Self::Content,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(Self::Content),
            "media" => Ok(Self::Media),
            _ => Err(format!("Unknown node kind: {s}")),
        }
    }
}

/// A node type registered in the live store's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    pub kind: NodeKind,
    pub alias: String,
    /// Property aliases this type accepts.
    pub properties: Vec<String>,
}

/// Working copy of a node in the live store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveNode {
    /// Numeric id assigned by this environment.
    pub id: i64,
    /// Unique identity assigned by this environment.
    pub key: Uuid,
    pub kind: NodeKind,
    /// Parent node id, or [`ROOT_ID`].
    pub parent_id: i64,
    pub name: String,
    pub type_alias: String,
    pub template: Option<String>,
    pub sort_order: i32,
    pub published: bool,
    pub trashed: bool,
    /// Last-modified time (Unix milliseconds).
    pub updated_at: i64,
    /// Property values keyed by alias.
    pub values: BTreeMap<String, String>,
    /// Aliases recognized by this node's type. Empty for unknown types.
    #[serde(skip)]
    pub schema: BTreeSet<String>,
}

impl LiveNode {
    /// Get a property value.
    #[must_use]
    pub fn value(&self, alias: &str) -> Option<&str> {
        self.values.get(alias).map(String::as_str)
    }

    /// Set a property value on the working copy.
    ///
    /// Nothing is persisted until the node is saved through its store.
    pub fn set_value(&mut self, alias: &str, value: impl Into<String>) {
        self.values.insert(alias.to_string(), value.into());
    }
}

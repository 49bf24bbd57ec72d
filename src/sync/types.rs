//! Sync types for node files, correlation tables and run statistics.
//!
//! Node files are pretty-printed JSON objects. Every field is optional at
//! the serde level so that a malformed file becomes a per-node
//! [`NodeError`] instead of aborting the whole walk.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::NodeKind;

/// One property entry of a node file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedProperty {
    pub alias: String,
    #[serde(default)]
    pub value: String,
    /// Structural marker: child linkage written by the exporter, never applied.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_doc: bool,
}

impl SerializedProperty {
    /// A regular property entry.
    #[must_use]
    pub fn new(alias: &str, value: &str) -> Self {
        Self {
            alias: alias.to_string(),
            value: value.to_string(),
            is_doc: false,
        }
    }
}

/// On-disk shape of a `.content` or `.media` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default)]
    pub properties: Vec<SerializedProperty>,
}

/// A validated node file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedNode {
    /// Numeric id in the originating environment.
    pub id: i64,
    /// Identity in the originating environment.
    pub key: Uuid,
    pub name: String,
    pub type_alias: String,
    pub template: Option<String>,
    pub sort_order: i32,
    pub published: bool,
    pub updated: Option<DateTime<Utc>>,
    pub properties: Vec<SerializedProperty>,
}

impl SerializedNode {
    /// Validate a raw node file of the given kind.
    ///
    /// Template, sort order and published state are content-only and are
    /// ignored for media.
    ///
    /// # Errors
    ///
    /// Returns a [`NodeError`] naming the first missing or invalid field.
    pub fn from_file(kind: NodeKind, file: NodeFile) -> Result<Self, NodeError> {
        let id = file.id.ok_or(NodeError::Missing { field: "id" })?;

        let key = file.key.ok_or(NodeError::Missing { field: "key" })?;
        let key = Uuid::parse_str(key.trim()).map_err(|e| NodeError::Invalid {
            field: "key",
            message: e.to_string(),
        })?;

        let name = file.name.ok_or(NodeError::Missing { field: "name" })?;
        if name.trim().is_empty() {
            return Err(NodeError::Invalid {
                field: "name",
                message: "must not be empty".to_string(),
            });
        }

        let (alias_field, type_alias) = match kind {
            NodeKind::Content => ("node_type_alias", file.node_type_alias),
            NodeKind::Media => ("media_type_alias", file.media_type_alias),
        };
        let type_alias = type_alias.ok_or(NodeError::Missing { field: alias_field })?;

        let updated = file
            .updated
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| NodeError::Invalid {
                        field: "updated",
                        message: e.to_string(),
                    })
            })
            .transpose()?;

        let (template, sort_order, published) = match kind {
            NodeKind::Content => (
                file.template_alias.filter(|t| !t.is_empty()),
                file.sort_order.unwrap_or(0),
                file.published.unwrap_or(false),
            ),
            NodeKind::Media => (None, 0, false),
        };

        Ok(Self {
            id,
            key,
            name,
            type_alias,
            template,
            sort_order,
            published,
            updated,
            properties: file.properties,
        })
    }

    /// Convert back to the on-disk shape for the given kind.
    #[must_use]
    pub fn to_file(&self, kind: NodeKind) -> NodeFile {
        let mut file = NodeFile {
            id: Some(self.id),
            key: Some(self.key.to_string()),
            name: Some(self.name.clone()),
            updated: self.updated.map(|t| t.to_rfc3339()),
            properties: self.properties.clone(),
            ..NodeFile::default()
        };
        match kind {
            NodeKind::Content => {
                file.node_type_alias = Some(self.type_alias.clone());
                file.template_alias.clone_from(&self.template);
                file.sort_order = Some(self.sort_order);
                file.published = Some(self.published);
            }
            NodeKind::Media => file.media_type_alias = Some(self.type_alias.clone()),
        }
        file
    }

    /// Last-modified time in Unix milliseconds; an absent timestamp means now.
    #[must_use]
    pub fn updated_millis(&self) -> i64 {
        self.updated.unwrap_or_else(Utc::now).timestamp_millis()
    }
}

/// Outcome of importing one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Created,
    Updated,
    UpToDate,
}

/// Which of the two import passes is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPass {
    /// Establish identities and structure; values are applied raw.
    Identities,
    /// Re-apply values with cross-references rewritten.
    References,
}

impl ImportPass {
    /// Whether property values are rewritten in this pass.
    #[must_use]
    pub const fn resolves_references(&self) -> bool {
        matches!(self, Self::References)
    }
}

/// A node the importer skipped because its file was unusable.
#[derive(Debug, Clone, Serialize)]
pub struct NodeFailure {
    pub path: String,
    pub reason: String,
}

/// Statistics for one import pass over one tree.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PassStats {
    /// Number of new nodes created.
    pub created: usize,
    /// Number of existing nodes updated.
    pub updated: usize,
    /// Number of nodes skipped because the live copy was newer.
    pub up_to_date: usize,
    /// Nodes (and their subtrees) that could not be imported.
    pub failures: Vec<NodeFailure>,
}

impl PassStats {
    /// Count one imported node.
    pub fn record(&mut self, state: NodeState) {
        match state {
            NodeState::Created => self.created += 1,
            NodeState::Updated => self.updated += 1,
            NodeState::UpToDate => self.up_to_date += 1,
        }
    }

    /// Record a node that could not be imported.
    pub fn fail(&mut self, path: &std::path::Path, reason: impl ToString) {
        self.failures.push(NodeFailure {
            path: path.display().to_string(),
            reason: reason.to_string(),
        });
    }

    /// Total nodes counted (failures excluded).
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.up_to_date
    }
}

/// Statistics for importing one tree (one or two passes).
#[derive(Debug, Clone, Serialize)]
pub struct ImportStats {
    pub kind: NodeKind,
    pub identities: PassStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<PassStats>,
}

impl ImportStats {
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            identities: PassStats::default(),
            references: None,
        }
    }

    /// Failures across both passes.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.identities.failures.len()
            + self.references.as_ref().map_or(0, |p| p.failures.len())
    }
}

/// Result of a full import run (media first, then content).
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub media: ImportStats,
    pub content: ImportStats,
    pub duration_ms: u64,
}

/// Statistics for an export operation.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExportStats {
    /// Number of `.content` files written.
    pub content_files: usize,
    /// Number of `.media` files written.
    pub media_files: usize,
    /// Number of media assets staged under the files folder.
    pub assets: usize,
    /// Number of nodes written under a disambiguated file name.
    pub renamed: usize,
}

impl ExportStats {
    /// Total node files written.
    #[must_use]
    pub fn total(&self) -> usize {
        self.content_files + self.media_files
    }

    /// Returns true if nothing was exported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Sync status information.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Sync root directory.
    pub root: PathBuf,
    /// Number of `.content` files on disk.
    pub content_files: usize,
    /// Number of `.media` files on disk.
    pub media_files: usize,
    /// Number of staged media assets.
    pub staged_assets: usize,
    /// Number of correlation pairs.
    pub pairs: usize,
    /// Size of `pairs.jsonl` in bytes (0 if not yet written).
    pub pairs_size: u64,
    /// Number of media index entries.
    pub media_index: usize,
    /// Live node counts.
    pub live: crate::storage::NodeCounts,
}

/// Per-node errors. These never cross a node boundary: the importer turns
/// them into [`NodeFailure`] entries and moves on to the next sibling.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("missing required field `{field}`")]
    Missing { field: &'static str },

    #[error("invalid `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },

    #[error("unparseable node file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unreadable node file: {0}")]
    Io(#[from] std::io::Error),
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Live store error.
    #[error("Database error: {0}")]
    Database(String),

    /// Sync root or file not found.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Invalid record format in a JSONL table.
    #[error("Invalid record at line {line}: {message}")]
    InvalidRecord {
        /// Line number (1-indexed).
        line: usize,
        /// Error message.
        message: String,
    },

    /// Neither tree has anything to import.
    #[error("Nothing to import (no content or media folder in the sync root)")]
    NothingToImport,
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Map a live store error into the sync error space.
pub(crate) fn store_error(err: crate::error::Error) -> SyncError {
    SyncError::Database(err.to_string())
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

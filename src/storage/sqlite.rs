//! SQLite live store.
//!
//! This module provides the [`LiveStore`] implementation backed by SQLite.
//! It follows the `MutationContext` pattern for transaction discipline and
//! audit logging.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{LiveNode, NodeKind, NodeType};
use crate::storage::events::{get_events, insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use crate::storage::store::LiveStore;

const NODE_COLUMNS: &str = "id, key, kind, parent_id, name, type_alias, template, sort_order, published, trashed, updated_at";

/// Actor recorded on audit events when none is configured.
pub const DEFAULT_ACTOR: &str = "contentsync";

/// SQLite-based live store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    actor: String,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures to record audit events that are written
/// in the same transaction.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation.
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    /// Record an event with old/new values for field tracking.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value),
        );
    }
}

/// Counts of live nodes, for status output.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct NodeCounts {
    pub content: usize,
    pub media: usize,
    pub published: usize,
    pub trashed: usize,
}

impl SqliteStore {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            actor: DEFAULT_ACTOR.to_string(),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            actor: DEFAULT_ACTOR.to_string(),
        })
    }

    /// Set the actor recorded on audit events.
    #[must_use]
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// Begins an IMMEDIATE transaction, runs the closure, writes the
    /// recorded audit events and commits. Rolls back on error.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let mut ctx = MutationContext::new(op, &self.actor);
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;
        Ok(result)
    }

    // ==================
    // Schema Operations
    // ==================

    /// Register (or replace) a node type.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn register_type(&mut self, kind: NodeKind, alias: &str, properties: &[String]) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let props = serde_json::to_string(properties)?;

        self.mutate("register_type", |tx, ctx| {
            tx.execute(
                "INSERT INTO node_types (kind, alias, properties, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(kind, alias) DO UPDATE SET properties = excluded.properties",
                rusqlite::params![kind.as_str(), alias, props, now],
            )?;
            ctx.record_change(
                "node_type",
                &format!("{kind}:{alias}"),
                EventType::TypeRegistered,
                None,
                Some(props.clone()),
            );
            Ok(())
        })
    }

    /// Get a node type by alias.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored property list is corrupt.
    pub fn get_type(&self, kind: NodeKind, alias: &str) -> Result<Option<NodeType>> {
        let props: Option<String> = self
            .conn
            .query_row(
                "SELECT properties FROM node_types WHERE kind = ?1 AND alias = ?2",
                rusqlite::params![kind.as_str(), alias],
                |row| row.get(0),
            )
            .optional()?;

        props
            .map(|p| {
                Ok(NodeType {
                    kind,
                    alias: alias.to_string(),
                    properties: serde_json::from_str(&p)?,
                })
            })
            .transpose()
    }

    /// List all registered node types.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_types(&self) -> Result<Vec<NodeType>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, alias, properties FROM node_types ORDER BY kind, alias")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(kind, alias, props)| {
                Ok(NodeType {
                    kind: kind.parse().map_err(Error::Other)?,
                    alias,
                    properties: serde_json::from_str(&props)?,
                })
            })
            .collect()
    }

    /// Register a template alias.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn register_template(&mut self, alias: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.mutate("register_template", |tx, ctx| {
            tx.execute(
                "INSERT OR IGNORE INTO templates (alias, created_at) VALUES (?1, ?2)",
                rusqlite::params![alias, now],
            )?;
            ctx.record_event("template", alias, EventType::TemplateRegistered);
            Ok(())
        })
    }

    /// Count live nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_nodes(&self) -> Result<NodeCounts> {
        let counts = self.conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN kind = 'content' AND trashed = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN kind = 'media' AND trashed = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN published = 1 AND trashed = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN trashed = 1 THEN 1 ELSE 0 END), 0)
             FROM nodes",
            [],
            |row| {
                Ok(NodeCounts {
                    content: row.get::<_, i64>(0)?.try_into().unwrap_or(0),
                    media: row.get::<_, i64>(1)?.try_into().unwrap_or(0),
                    published: row.get::<_, i64>(2)?.try_into().unwrap_or(0),
                    trashed: row.get::<_, i64>(3)?.try_into().unwrap_or(0),
                })
            },
        )?;
        Ok(counts)
    }

    /// Audit trail of one node, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn node_history(&self, id: i64, limit: Option<u32>) -> Result<Vec<Event>> {
        Ok(get_events(&self.conn, "node", &id.to_string(), limit)?)
    }

    // ==================
    // Node Loading
    // ==================

    fn query_node(&self, sql: &str, params: impl rusqlite::Params) -> Result<Option<LiveNode>> {
        let node = self
            .conn
            .query_row(sql, params, node_from_row)
            .optional()?;

        match node {
            Some(mut node) => {
                self.hydrate(&mut node)?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    /// Load property values and the type schema into a freshly read node.
    fn hydrate(&self, node: &mut LiveNode) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT alias, value FROM node_values WHERE node_id = ?1")?;
        node.values = stmt
            .query_map([node.id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        node.schema = self
            .get_type(node.kind, &node.type_alias)?
            .map(|t| t.properties.into_iter().collect())
            .unwrap_or_default();
        Ok(())
    }

    fn write_node(&mut self, node: &mut LiveNode, op: &str, event_type: EventType) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate(op, |tx, ctx| {
            let changed = tx.execute(
                "UPDATE nodes SET parent_id = ?1, name = ?2, type_alias = ?3, template = ?4,
                        sort_order = ?5, published = ?6, trashed = ?7, updated_at = ?8
                 WHERE id = ?9",
                rusqlite::params![
                    node.parent_id,
                    node.name,
                    node.type_alias,
                    node.template,
                    node.sort_order,
                    node.published,
                    node.trashed,
                    now,
                    node.id,
                ],
            )?;
            if changed == 0 {
                return Err(Error::NodeNotFound {
                    id: node.id.to_string(),
                });
            }

            tx.execute("DELETE FROM node_values WHERE node_id = ?1", [node.id])?;
            for (alias, value) in &node.values {
                tx.execute(
                    "INSERT INTO node_values (node_id, alias, value) VALUES (?1, ?2, ?3)",
                    rusqlite::params![node.id, alias, value],
                )?;
            }

            ctx.record_event("node", &node.id.to_string(), event_type);
            Ok(())
        })?;

        node.updated_at = now;
        Ok(())
    }
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<LiveNode> {
    let key: String = row.get(1)?;
    let key = Uuid::parse_str(&key).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let kind: String = row.get(2)?;
    let kind = kind.parse::<NodeKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(LiveNode {
        id: row.get(0)?,
        key,
        kind,
        parent_id: row.get(3)?,
        name: row.get(4)?,
        type_alias: row.get(5)?,
        template: row.get(6)?,
        sort_order: row.get(7)?,
        published: row.get(8)?,
        trashed: row.get(9)?,
        updated_at: row.get(10)?,
        values: std::collections::BTreeMap::new(),
        schema: BTreeSet::new(),
    })
}

impl LiveStore for SqliteStore {
    fn find_by_key(&self, kind: NodeKind, key: Uuid) -> Result<Option<LiveNode>> {
        self.query_node(
            &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE key = ?1 AND kind = ?2"),
            rusqlite::params![key.to_string(), kind.as_str()],
        )
    }

    fn find_by_id(&self, kind: NodeKind, id: i64) -> Result<Option<LiveNode>> {
        self.query_node(
            &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1 AND kind = ?2"),
            rusqlite::params![id, kind.as_str()],
        )
    }

    fn create_node(
        &mut self,
        kind: NodeKind,
        name: &str,
        parent_id: i64,
        type_alias: &str,
    ) -> Result<LiveNode> {
        if self.get_type(kind, type_alias)?.is_none() {
            warn!(%kind, alias = type_alias, name, "Unknown node type, creating empty container");
        }

        let key = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp_millis();

        let id = self.mutate("create_node", |tx, ctx| {
            tx.execute(
                "INSERT INTO nodes (key, kind, parent_id, name, type_alias, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![key.to_string(), kind.as_str(), parent_id, name, type_alias, now],
            )?;
            let id = tx.last_insert_rowid();
            ctx.record_change("node", &id.to_string(), EventType::NodeCreated, None, Some(name.to_string()));
            Ok(id)
        })?;

        debug!(id, %key, name, "Created node");
        self.find_by_id(kind, id)?
            .ok_or_else(|| Error::NodeNotFound { id: id.to_string() })
    }

    fn has_template(&self, alias: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM templates WHERE alias = ?1", [alias], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn save(&mut self, node: &mut LiveNode) -> Result<()> {
        self.write_node(node, "save_node", EventType::NodeSaved)
    }

    fn save_and_publish(&mut self, node: &mut LiveNode) -> Result<()> {
        node.published = true;
        self.write_node(node, "publish_node", EventType::NodePublished)
    }

    fn unpublish(&mut self, node: &mut LiveNode) -> Result<()> {
        node.published = false;
        self.write_node(node, "unpublish_node", EventType::NodeUnpublished)
    }

    fn trash(&mut self, node: &mut LiveNode) -> Result<()> {
        node.trashed = true;
        node.published = false;
        self.write_node(node, "trash_node", EventType::NodeTrashed)
    }

    fn attach_file(
        &mut self,
        node: &mut LiveNode,
        alias: &str,
        file_name: &str,
        data: &[u8],
    ) -> Result<()> {
        let node_id = node.id;
        self.mutate("attach_file", |tx, ctx| {
            tx.execute(
                "INSERT INTO media_files (node_id, file_name, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(node_id) DO UPDATE SET file_name = excluded.file_name, data = excluded.data",
                rusqlite::params![node_id, file_name, data],
            )?;
            ctx.record_change(
                "node",
                &node_id.to_string(),
                EventType::FileAttached,
                None,
                Some(file_name.to_string()),
            );
            Ok(())
        })?;

        node.set_value(alias, file_name);
        Ok(())
    }

    fn media_file(&self, node: &LiveNode) -> Result<Option<(String, Vec<u8>)>> {
        let file = self
            .conn
            .query_row(
                "SELECT file_name, data FROM media_files WHERE node_id = ?1",
                [node.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(file)
    }

    fn children(&self, kind: NodeKind, parent_id: i64) -> Result<Vec<LiveNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes
             WHERE kind = ?1 AND parent_id = ?2 AND trashed = 0
             ORDER BY sort_order, id"
        ))?;
        let mut nodes = stmt
            .query_map(rusqlite::params![kind.as_str(), parent_id], node_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for node in &mut nodes {
            self.hydrate(node)?;
        }
        Ok(nodes)
    }
}

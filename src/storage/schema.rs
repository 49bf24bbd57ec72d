//! Database schema definitions for the live store.

use rusqlite::{Connection, Result};

/// Current schema version for tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the live store.
///
/// Note: Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Schema
-- ====================

-- Node types: the aliases a node can be created with, and the
-- property aliases each type accepts (JSON array).
CREATE TABLE IF NOT EXISTS node_types (
    kind TEXT NOT NULL CHECK (kind IN ('content', 'media')),
    alias TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL,
    PRIMARY KEY (kind, alias)
);

-- Templates content nodes may reference.
CREATE TABLE IF NOT EXISTS templates (
    alias TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);

-- ====================
-- Tree
-- ====================

CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL CHECK (kind IN ('content', 'media')),
    parent_id INTEGER NOT NULL DEFAULT -1,
    name TEXT NOT NULL,
    type_alias TEXT NOT NULL,
    template TEXT,
    sort_order INTEGER NOT NULL DEFAULT 0,
    published INTEGER NOT NULL DEFAULT 0,
    trashed INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(kind, parent_id, trashed);
CREATE INDEX IF NOT EXISTS idx_nodes_key ON nodes(key);

CREATE TABLE IF NOT EXISTS node_values (
    node_id INTEGER NOT NULL,
    alias TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (node_id, alias),
    FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE CASCADE
);

-- Binary payload of a media node's attached file.
CREATE TABLE IF NOT EXISTS media_files (
    node_id INTEGER PRIMARY KEY,
    file_name TEXT NOT NULL,
    data BLOB NOT NULL,
    FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE CASCADE
);

-- ====================
-- Audit
-- ====================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    comment TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at DESC);
"#;

/// Apply the schema to a connection.
///
/// # Errors
///
/// Returns an error if a pragma or DDL statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

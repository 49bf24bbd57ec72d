//! Audit event storage and retrieval.
//!
//! Every mutation of the live tree records an event, so an import run can be
//! traced node by node after the fact.

use rusqlite::{Connection, Result};
use serde::Serialize;

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NodeCreated,
    NodeSaved,
    NodePublished,
    NodeUnpublished,
    NodeTrashed,
    FileAttached,
    TypeRegistered,
    TemplateRegistered,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NodeCreated => "node_created",
            Self::NodeSaved => "node_saved",
            Self::NodePublished => "node_published",
            Self::NodeUnpublished => "node_unpublished",
            Self::NodeTrashed => "node_trashed",
            Self::FileAttached => "file_attached",
            Self::TypeRegistered => "type_registered",
            Self::TemplateRegistered => "template_registered",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "node_created" => Self::NodeCreated,
            "node_saved" => Self::NodeSaved,
            "node_published" => Self::NodePublished,
            "node_unpublished" => Self::NodeUnpublished,
            "node_trashed" => Self::NodeTrashed,
            "file_attached" => Self::FileAttached,
            "type_registered" => Self::TypeRegistered,
            "template_registered" => Self::TemplateRegistered,
            _ => return None,
        })
    }
}

/// An audit event record.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            comment: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values for field change tracking.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for an entity, newest first.
///
/// Rows with an event type this build does not know are skipped.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(rusqlite::params![entity_type, entity_id, limit], |row| {
        let event_type: String = row.get(3)?;
        let event = Event {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            event_type: EventType::NodeSaved,
            actor: row.get(4)?,
            old_value: row.get(5)?,
            new_value: row.get(6)?,
            comment: row.get(7)?,
            created_at: row.get(8)?,
        };
        Ok((event_type, event))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (event_type, mut event) = row?;
        if let Some(parsed) = EventType::parse(&event_type) {
            event.event_type = parsed;
            events.push(event);
        }
    }
    Ok(events)
}

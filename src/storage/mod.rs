//! Live store layer for contentsync.
//!
//! The sync engine talks to the live content and media trees through the
//! [`LiveStore`] trait. The bundled implementation persists both trees in
//! SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Audit events for history
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - SQLite live store
//! - [`store`] - The live store contract

pub mod events;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use sqlite::{MutationContext, NodeCounts, SqliteStore};
pub use store::LiveStore;

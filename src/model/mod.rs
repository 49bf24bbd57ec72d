//! Data models for the live content tree.
//!
//! - [`LiveNode`] - working copy of a content or media node
//! - [`NodeType`] - schema entry (alias + accepted properties)
//! - [`NodeKind`] - content or media

pub mod node;

pub use node::{FILE_PROPERTY, LiveNode, NodeKind, NodeType, ROOT_ID};

//! contentsync - file-based content tree sync between environments
//!
//! This crate provides the core functionality for the `csync` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Live node types (`LiveNode`, `NodeType`, `NodeKind`)
//! - [`storage`] - The `LiveStore` trait and its SQLite implementation
//! - [`sync`] - Node file export/import, identity pairs, change handling
//! - [`startup`] - Run-once startup sequence
//! - [`config`] - Sync root discovery and settings
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod startup;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};

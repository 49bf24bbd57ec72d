//! Command implementations.

pub mod completions;
pub mod init;
pub mod start;
pub mod sync;
pub mod types;
pub mod version;

use crate::cli::Cli;
use crate::config::{default_actor, load_settings, resolve_db_path, resolve_sync_root, Settings};
use crate::error::{Error, Result};
use crate::storage::SqliteStore;
use std::path::PathBuf;

/// An initialized sync root with its settings and live database.
pub struct Workspace {
    pub root: PathBuf,
    pub settings: Settings,
    pub store: SqliteStore,
}

impl Workspace {
    /// Resolve and open the workspace named by the global flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if no sync root or live database
    /// can be found.
    pub fn open(cli: &Cli) -> Result<Self> {
        let root = resolve_sync_root(cli.root.as_deref()).ok_or(Error::NotInitialized)?;
        if !root.is_dir() {
            return Err(Error::NotInitialized);
        }

        let db_path = resolve_db_path(cli.db.as_deref(), Some(&root)).ok_or(Error::NotInitialized)?;
        if !db_path.exists() {
            return Err(Error::NotInitialized);
        }

        let actor = cli.actor.clone().unwrap_or_else(default_actor);
        let store = SqliteStore::open(&db_path)?.with_actor(&actor);
        let settings = load_settings(&root);

        Ok(Self {
            root,
            settings,
            store,
        })
    }
}

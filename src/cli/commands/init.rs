//! Initialize a sync root.
//!
//! Creates `.contentsync/` in the current directory (or at `--root`) with
//! the content, media and files folders, a default `settings.json`, a
//! `.gitignore` and the live database. The database is environment-local
//! and ignored by git; everything else is meant to be committed.

use crate::config::{resolve_db_path, save_settings, Settings, SETTINGS_FILE, SYNC_DIR_NAME};
use crate::error::{Error, Result};
use crate::storage::SqliteStore;
use crate::sync::{ensure_gitignore, SyncLayout};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    path: PathBuf,
    database: PathBuf,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns [`Error::AlreadyInitialized`] if the root already has settings
/// and `force` is not set, or an error if a folder or the database cannot
/// be created.
pub fn execute(root: Option<&Path>, db: Option<&Path>, force: bool, json: bool) -> Result<()> {
    let root = root.map_or_else(|| Path::new(".").join(SYNC_DIR_NAME), Path::to_path_buf);

    let settings_path = root.join(SETTINGS_FILE);
    if settings_path.exists() && !force {
        return Err(Error::AlreadyInitialized { path: root });
    }

    fs::create_dir_all(&root)?;
    let settings = Settings::default();
    save_settings(&root, &settings)?;
    SyncLayout::new(&root, &settings).ensure_dirs()?;
    ensure_gitignore(&root)?;

    let db_path = resolve_db_path(db, Some(&root))
        .ok_or_else(|| Error::Config("Could not determine live database path".to_string()))?;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    // Opening applies the schema.
    SqliteStore::open(&db_path)?;

    if json {
        let output = InitOutput {
            path: root,
            database: db_path,
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
    } else {
        println!("Initialized sync root at {}", root.display());
        println!("  Database: {}", db_path.display());
        println!();
        println!("Next: register node types with 'csync type add', then 'csync export'.");
    }

    Ok(())
}

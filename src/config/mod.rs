//! Configuration management.
//!
//! This module provides functions for discovering the sync root, resolving
//! the live database path, and loading `settings.json`.
//!
//! # Layout
//!
//! - **Sync root**: a `.contentsync/` directory, normally committed next to
//!   the site so it can travel between environments
//! - **Live database**: `live.db` inside the sync root unless overridden;
//!   it is environment-local and ignored by git

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Name of the sync root directory.
pub const SYNC_DIR_NAME: &str = ".contentsync";

/// Settings file inside the sync root.
pub const SETTINGS_FILE: &str = "settings.json";

/// Live database file inside the sync root.
pub const DB_FILE: &str = "live.db";

/// When the change handler writes node files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventMode {
    /// Do not react to live changes.
    Off,
    /// Write a node file on every save.
    #[default]
    Save,
    /// Write a node file only when a node is published.
    Publish,
}

/// Settings loaded from `settings.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Export the live tree at startup.
    pub export: bool,
    /// Import the sync folder at startup.
    pub import: bool,
    /// Change handler mode.
    pub events: EventMode,
    pub content_folder: String,
    pub media_folder: String,
    pub files_folder: String,
    pub archive_folder: String,
    /// Keep a timestamped copy of node files before removing them.
    pub versions: bool,
    /// Run the second, reference-resolving import pass.
    pub resolve_references: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            export: true,
            import: true,
            events: EventMode::Save,
            content_folder: "content".to_string(),
            media_folder: "media".to_string(),
            files_folder: "files".to_string(),
            archive_folder: "archive".to_string(),
            versions: false,
            resolve_references: true,
        }
    }
}

/// Load settings from the sync root, returning the error on failure.
///
/// A missing settings file yields the defaults.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn try_load_settings(root: &Path) -> Result<Settings> {
    let path = root.join(SETTINGS_FILE);
    if !path.exists() {
        debug!(path = %path.display(), "No settings file, using defaults");
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))
}

/// Load settings from the sync root, falling back to defaults.
///
/// A broken settings file never stops a sync run; the failure is logged.
#[must_use]
pub fn load_settings(root: &Path) -> Settings {
    try_load_settings(root).unwrap_or_else(|e| {
        warn!(error = %e, "Using default settings");
        Settings::default()
    })
}

/// Write settings to the sync root as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_settings(root: &Path, settings: &Settings) -> Result<()> {
    fs::create_dir_all(root)?;
    let mut content = serde_json::to_string_pretty(settings)?;
    content.push('\n');
    fs::write(root.join(SETTINGS_FILE), content)?;
    Ok(())
}

/// Discover the sync root.
///
/// Resolution strategy:
/// 1. Check the **git root** first; if it has `.contentsync/`, use it.
/// 2. Fall back to walking up from CWD (for non-git sites).
#[must_use]
pub fn discover_sync_root() -> Option<PathBuf> {
    if let Some(git_root) = git_toplevel() {
        let candidate = git_root.join(SYNC_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
    }

    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .map(|dir| dir.join(SYNC_DIR_NAME))
        .find(|candidate| candidate.is_dir())
}

/// Get the git repository root directory.
fn git_toplevel() -> Option<PathBuf> {
    std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
}

/// Global fallback directory, `~/.contentsync/`.
#[must_use]
pub fn global_sync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(SYNC_DIR_NAME))
}

/// Resolve the sync root.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `CONTENTSYNC_ROOT` environment variable
/// 3. Discovered `.contentsync/` (git root, then walking up from CWD)
#[must_use]
pub fn resolve_sync_root(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(root) = std::env::var("CONTENTSYNC_ROOT") {
        if !root.trim().is_empty() {
            return Some(PathBuf::from(root));
        }
    }

    discover_sync_root()
}

/// Resolve the live database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `CONTENTSYNC_DB` environment variable
/// 3. `live.db` inside the sync root
/// 4. Global location: `~/.contentsync/live.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>, sync_root: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("CONTENTSYNC_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    if let Some(root) = sync_root {
        return Some(root.join(DB_FILE));
    }

    global_sync_dir().map(|dir| dir.join(DB_FILE))
}

/// Get the default actor name recorded on audit events.
///
/// Priority:
/// 1. `CONTENTSYNC_ACTOR` environment variable
/// 2. Git user name
/// 3. System username
/// 4. "unknown"
#[must_use]
pub fn default_actor() -> String {
    if let Ok(actor) = std::env::var("CONTENTSYNC_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
    {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    if let Ok(user) = std::env::var("USER") {
        return user;
    }

    "unknown".to_string()
}

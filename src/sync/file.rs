//! File operations for sync.
//!
//! This module provides the on-disk mechanics of the sync folder:
//! - Atomic writes: write to temp file, sync to disk, then rename
//! - JSONL tables (correlation pairs, media index)
//! - Node files and the name-derived directory convention
//! - Housekeeping: archive, move and rename of node files
//! - Media asset staging under `files/<source-key>/`

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::model::NodeKind;
use crate::sync::types::{NodeError, NodeFile, SerializedNode, SyncError, SyncResult};

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a temporary file (same path with a `.tmp` suffix)
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> SyncResult<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!("{file_name}.tmp"));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Write records to a JSONL file atomically, one JSON object per line.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> SyncResult<()> {
    let mut content = String::new();
    for record in records {
        let line = serde_json::to_string(record)?;
        content.push_str(&line);
        content.push('\n');
    }
    atomic_write(path, &content)
}

/// Read all records from a JSONL file.
///
/// Invalid lines cause an error with the line number for debugging.
///
/// # Errors
///
/// Returns an error if:
/// - The file does not exist or cannot be opened
/// - Any line cannot be parsed as a `T`
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> SyncResult<Vec<T>> {
    if !path.exists() {
        return Err(SyncError::FileNotFound(path.display().to_string()));
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(&line).map_err(|e| SyncError::InvalidRecord {
            line: line_num + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Generate .gitignore content for the sync root.
///
/// The sync root is meant to be committed and carried between
/// environments; the live database next to it is not.
#[must_use]
pub fn gitignore_content() -> &'static str {
    r"# contentsync sync root
# Node files, tables and staged assets are tracked. The live store is local.

*.db
*.db-wal
*.db-shm
*.tmp
"
}

/// Ensure .gitignore exists in the sync root.
///
/// If the file already exists, it is not modified (user may have customized it).
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn ensure_gitignore(root: &Path) -> SyncResult<()> {
    let gitignore_path = root.join(".gitignore");

    if gitignore_path.exists() {
        return Ok(());
    }

    fs::create_dir_all(root)?;

    let mut file = File::create(&gitignore_path)?;
    file.write_all(gitignore_content().as_bytes())?;
    file.sync_all()?;

    Ok(())
}

// ==================
// Node files
// ==================

/// Reduce a display name to the characters allowed in file names.
///
/// Only ASCII letters and digits survive, so `"About Us!"` becomes
/// `"AboutUs"`. Distinct names may clean to the same string.
#[must_use]
pub fn clean_file_name(name: &str) -> String {
    name.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// File name of a node file, e.g. `AboutUs.content`.
#[must_use]
pub fn node_file_name(clean_name: &str, kind: NodeKind) -> String {
    format!("{clean_name}.{}", kind.extension())
}

/// Directory holding the children of the node stored at `path`.
#[must_use]
pub fn child_dir(path: &Path) -> PathBuf {
    match (path.parent(), path.file_stem()) {
        (Some(parent), Some(stem)) => parent.join(stem),
        _ => path.with_extension(""),
    }
}

/// Node files of one kind directly inside `dir`, sorted by file name.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn node_files(dir: &Path, kind: NodeKind) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == kind.extension()) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Read and validate a node file.
///
/// # Errors
///
/// Returns a [`NodeError`] if the file is unreadable, unparseable or
/// misses a required field.
pub fn read_node_file(path: &Path, kind: NodeKind) -> Result<SerializedNode, NodeError> {
    let content = fs::read_to_string(path)?;
    let file: NodeFile = serde_json::from_str(&content)?;
    SerializedNode::from_file(kind, file)
}

/// Write a node file atomically as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_node_file(path: &Path, kind: NodeKind, node: &SerializedNode) -> SyncResult<()> {
    let mut content = serde_json::to_string_pretty(&node.to_file(kind))?;
    content.push('\n');
    atomic_write(path, &content)
}

/// Count node files of one kind below `dir`, recursively.
#[must_use]
pub fn count_node_files(dir: &Path, kind: NodeKind) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .map(|path| {
            if path.is_dir() {
                count_node_files(&path, kind)
            } else {
                usize::from(path.extension().is_some_and(|e| e == kind.extension()))
            }
        })
        .sum()
}

// ==================
// Housekeeping
// ==================

/// Remove a node file, optionally keeping a timestamped copy.
///
/// With `versions` set the file is first copied to
/// `<archive_root>/<path relative to sync root>/<stem>_<ddmmyy_HHMMSS>.<ext>`.
/// Returns whether a file was removed.
///
/// # Errors
///
/// Returns an error if the copy or removal fails.
pub fn archive_file(
    file: &Path,
    sync_root: &Path,
    archive_root: &Path,
    versions: bool,
) -> SyncResult<bool> {
    if !file.exists() {
        return Ok(false);
    }

    if versions {
        let relative = file
            .parent()
            .and_then(|p| p.strip_prefix(sync_root).ok())
            .unwrap_or_else(|| Path::new(""));
        let folder = archive_root.join(relative);
        fs::create_dir_all(&folder)?;

        let stem = file.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        let ext = file.extension().map(|s| s.to_string_lossy()).unwrap_or_default();
        let stamp = chrono::Utc::now().format("%d%m%y_%H%M%S");
        let dest = folder.join(format!("{stem}_{stamp}.{ext}"));

        fs::copy(file, &dest)?;
        debug!(from = %file.display(), to = %dest.display(), "Archived node file");
    }

    fs::remove_file(file)?;
    Ok(true)
}

/// Move a node's file and child folder after its parent changed.
///
/// The old node file is removed (the caller writes the new one); the old
/// child folder, if any, is moved under `new_dir`.
///
/// # Errors
///
/// Returns an error if a removal or rename fails.
pub fn move_file(old_dir: &Path, new_dir: &Path, name: &str, kind: NodeKind) -> SyncResult<()> {
    let clean = clean_file_name(name);

    let old_file = old_dir.join(node_file_name(&clean, kind));
    if old_file.exists() {
        fs::remove_file(&old_file)?;
    }

    let old_folder = old_dir.join(&clean);
    if old_folder.is_dir() {
        let new_folder = new_dir.join(&clean);
        if let Some(parent) = new_folder.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&old_folder, &new_folder)?;
        debug!(from = %old_folder.display(), to = %new_folder.display(), "Moved child folder");
    }

    Ok(())
}

/// Rename a node's file and child folder in place after its name changed.
///
/// # Errors
///
/// Returns an error if a removal or rename fails.
pub fn rename_file(dir: &Path, old_name: &str, new_name: &str, kind: NodeKind) -> SyncResult<()> {
    let old_clean = clean_file_name(old_name);
    let new_clean = clean_file_name(new_name);

    let old_file = dir.join(node_file_name(&old_clean, kind));
    if old_file.exists() {
        fs::remove_file(&old_file)?;
    }

    let old_folder = dir.join(&old_clean);
    let new_folder = dir.join(&new_clean);
    if old_clean != new_clean && old_folder.is_dir() && !new_folder.exists() {
        fs::rename(&old_folder, &new_folder)?;
        debug!(from = %old_folder.display(), to = %new_folder.display(), "Renamed child folder");
    }

    Ok(())
}

// ==================
// Media assets
// ==================

/// Folder holding the staged assets of one media node.
#[must_use]
pub fn staged_asset_dir(files_root: &Path, source_key: Uuid) -> PathBuf {
    files_root.join(source_key.to_string())
}

/// Stage a media asset for export under `files/<source-key>/<file name>`.
///
/// Only the final path component of `file_name` is used.
///
/// # Errors
///
/// Returns an error if the folder or file cannot be written.
pub fn export_media_file(
    files_root: &Path,
    source_key: Uuid,
    file_name: &str,
    data: &[u8],
) -> SyncResult<PathBuf> {
    let folder = staged_asset_dir(files_root, source_key);
    fs::create_dir_all(&folder)?;

    let name = Path::new(file_name)
        .file_name()
        .map_or_else(|| source_key.to_string(), |n| n.to_string_lossy().into_owned());
    let dest = folder.join(name);
    fs::write(&dest, data)?;

    Ok(dest)
}

/// Staged assets for one media node, sorted by file name.
///
/// A missing folder yields an empty list.
///
/// # Errors
///
/// Returns an error if the folder exists but cannot be read.
pub fn staged_media_files(files_root: &Path, source_key: Uuid) -> io::Result<Vec<PathBuf>> {
    let folder = staged_asset_dir(files_root, source_key);
    if !folder.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(&folder)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Remove the staged assets of one media node.
///
/// # Errors
///
/// Returns an error if the folder exists but cannot be removed.
pub fn clean_media_files(files_root: &Path, source_key: Uuid) -> SyncResult<()> {
    let folder = staged_asset_dir(files_root, source_key);
    if folder.is_dir() {
        fs::remove_dir_all(&folder)?;
    }
    Ok(())
}

/// Count staged asset files below the files folder.
#[must_use]
pub fn count_staged_assets(files_root: &Path) -> usize {
    let Ok(entries) = fs::read_dir(files_root) else {
        return 0;
    };
    entries
        .filter_map(std::result::Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| fs::read_dir(e.path()).ok())
        .map(|files| files.filter_map(std::result::Result::ok).count())
        .sum()
}

//! Sync status display.
//!
//! Summarizes what is on disk in the sync root and what is in the live
//! store, so both sides of a sync can be compared at a glance.

use std::fs;

use colored::Colorize;

use crate::model::NodeKind;
use crate::storage::SqliteStore;
use crate::sync::context::SyncContext;
use crate::sync::file::{count_node_files, count_staged_assets};
use crate::sync::types::{store_error, SyncResult, SyncStatus};

/// Get the current sync status.
///
/// # Errors
///
/// Returns an error if database queries fail.
pub fn get_sync_status(store: &SqliteStore, ctx: &SyncContext) -> SyncResult<SyncStatus> {
    let live = store.count_nodes().map_err(store_error)?;
    let layout = &ctx.layout;

    Ok(SyncStatus {
        root: layout.root.clone(),
        content_files: count_node_files(&layout.content, NodeKind::Content),
        media_files: count_node_files(&layout.media, NodeKind::Media),
        staged_assets: count_staged_assets(&layout.files),
        pairs: ctx.pairs.len(),
        pairs_size: fs::metadata(&layout.pairs).map(|m| m.len()).unwrap_or(0),
        media_index: ctx.media_index.len(),
        live,
    })
}

/// Print sync status to stdout in a human-readable format.
pub fn print_status(status: &SyncStatus) {
    println!("{}", "Sync Status".bold().underline());
    println!();
    println!("  Root: {}", status.root.display());
    println!();

    println!("{}", "Sync Folder:".blue().bold());
    if status.content_files + status.media_files == 0 {
        println!("  {}", "No node files found.".dimmed());
        println!("{}", "  Run 'csync export' to write the live tree.".dimmed());
    } else {
        println!("  Content files: {}", status.content_files);
        println!("  Media files:   {}", status.media_files);
        println!("  Staged assets: {}", status.staged_assets);
    }
    println!(
        "  Pairs:         {} ({})",
        status.pairs,
        format_size(status.pairs_size)
    );
    println!("  Media index:   {}", status.media_index);
    println!();

    println!("{}", "Live Store:".blue().bold());
    let live = &status.live;
    if live.content + live.media == 0 {
        println!("  {}", "Empty.".dimmed());
        if status.content_files + status.media_files > 0 {
            println!("{}", "  Run 'csync import' to load the sync folder.".dimmed());
        }
    } else {
        println!("  Content:   {}", live.content);
        println!("  Media:     {}", live.media);
        println!("  Published: {}", live.published.to_string().green());
        if live.trashed > 0 {
            println!("  Trashed:   {}", live.trashed.to_string().yellow());
        }
    }
}

/// Format a byte size as a human-readable string.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::model::ROOT_ID;
    use crate::storage::LiveStore;
    use crate::sync::export::Exporter;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }

    #[test]
    fn test_get_sync_status_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open_memory().unwrap();
        let ctx = SyncContext::open(temp_dir.path(), &Settings::default()).unwrap();

        let status = get_sync_status(&store, &ctx).unwrap();

        assert_eq!(status.content_files, 0);
        assert_eq!(status.media_files, 0);
        assert_eq!(status.pairs, 0);
        assert_eq!(status.pairs_size, 0);
        assert_eq!(status.live.content, 0);
    }

    #[test]
    fn test_get_sync_status_after_export() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SqliteStore::open_memory().unwrap();
        let ctx = SyncContext::open(temp_dir.path(), &Settings::default()).unwrap();
        let mut home = store
            .create_node(NodeKind::Content, "Home", ROOT_ID, "page")
            .unwrap();
        store.save_and_publish(&mut home).unwrap();
        Exporter::new(&store, &ctx).export().unwrap();

        let status = get_sync_status(&store, &ctx).unwrap();

        assert_eq!(status.content_files, 1);
        assert_eq!(status.live.content, 1);
        assert_eq!(status.live.published, 1);
    }
}

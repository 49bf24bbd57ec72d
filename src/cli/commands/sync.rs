//! Sync command implementations (export, import, status, pairs, history).
//!
//! Every command works on the sync root resolved from `--root`, the
//! `CONTENTSYNC_ROOT` variable, or the nearest `.contentsync/` directory.

use crate::cli::Cli;
use crate::cli::commands::Workspace;
use crate::error::Result;
use crate::sync::{
    get_sync_status, import_all, print_status, Exporter, ImportReport, ImportStats, PassStats,
    SyncContext, SyncError,
};

/// Execute the export command.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened or the export fails.
pub fn export(cli: &Cli, json: bool) -> Result<()> {
    let ws = Workspace::open(cli)?;
    let ctx = SyncContext::open(&ws.root, &ws.settings)?;

    let stats = Exporter::new(&ws.store, &ctx).export()?;

    if json {
        let output = serde_json::json!({
            "success": true,
            "root": ws.root.display().to_string(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if stats.is_empty() {
        println!("Live tree is empty, nothing exported.");
    } else {
        println!("Export complete: {}", ws.root.display());
        println!();
        println!("  Content files: {}", stats.content_files);
        println!("  Media files:   {}", stats.media_files);
        if stats.assets > 0 {
            println!("  Assets:        {}", stats.assets);
        }
        if stats.renamed > 0 {
            println!("  Renamed:       {} (name collisions)", stats.renamed);
        }
    }

    Ok(())
}

/// Execute the import command.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened, a table is corrupt,
/// or the live store fails.
pub fn import(cli: &Cli, no_resolve: bool, json: bool) -> Result<()> {
    let mut ws = Workspace::open(cli)?;
    let mut ctx = SyncContext::open(&ws.root, &ws.settings)?;
    let resolve = ws.settings.resolve_references && !no_resolve;

    match import_all(&mut ws.store, &mut ctx, resolve) {
        Ok(report) => {
            ctx.persist()?;
            if json {
                let output = serde_json::json!({
                    "success": true,
                    "root": ws.root.display().to_string(),
                    "report": report,
                });
                println!("{}", serde_json::to_string(&output)?);
            } else {
                print_import_report(&report);
            }
            Ok(())
        }
        Err(SyncError::NothingToImport) => {
            if json {
                let output = serde_json::json!({
                    "error": "nothing_to_import",
                    "root": ws.root.display().to_string(),
                });
                println!("{output}");
            } else {
                println!("Nothing to import in: {}", ws.root.display());
                println!("Run 'csync export' in the source environment first.");
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Print an import report in a human-readable format.
pub fn print_import_report(report: &ImportReport) {
    println!("Import complete ({} ms)", report.duration_ms);
    println!();
    print_tree_stats("Media", &report.media);
    print_tree_stats("Content", &report.content);

    let failures: Vec<_> = [&report.media, &report.content]
        .into_iter()
        .flat_map(|stats| {
            stats
                .identities
                .failures
                .iter()
                .chain(stats.references.iter().flat_map(|p| p.failures.iter()))
        })
        .collect();
    if !failures.is_empty() {
        println!();
        println!("Skipped {} node(s):", failures.len());
        for failure in failures {
            println!("  {}: {}", failure.path, failure.reason);
        }
    }
}

fn print_tree_stats(name: &str, stats: &ImportStats) {
    print_pass(name, "identities", &stats.identities);
    if let Some(references) = &stats.references {
        print_pass(name, "references", references);
    }
}

fn print_pass(name: &str, pass: &str, stats: &PassStats) {
    if stats.total() > 0 {
        println!(
            "  {name} ({pass}): {} created, {} updated, {} up to date",
            stats.created, stats.updated, stats.up_to_date
        );
    }
}

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened or a query fails.
pub fn status(cli: &Cli, json: bool) -> Result<()> {
    let ws = Workspace::open(cli)?;
    let ctx = SyncContext::open(&ws.root, &ws.settings)?;

    let sync_status = get_sync_status(&ws.store, &ctx)?;

    if json {
        let output = serde_json::json!({
            "settings": ws.settings,
            "status": sync_status,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        print_status(&sync_status);
    }

    Ok(())
}

/// Execute the pairs command.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened or the table is corrupt.
pub fn pairs(cli: &Cli, limit: Option<usize>, json: bool) -> Result<()> {
    let ws = Workspace::open(cli)?;
    let ctx = SyncContext::open(&ws.root, &ws.settings)?;

    let total = ctx.pairs.len();
    let pairs: Vec<_> = ctx
        .pairs
        .pairs()
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    if json {
        let output = serde_json::json!({
            "total": total,
            "pairs": pairs,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if pairs.is_empty() {
        println!("No pairs recorded yet.");
    } else {
        for pair in &pairs {
            println!("{}  ->  {}", pair.source, pair.target);
        }
        if pairs.len() < total {
            println!();
            println!("({} of {total} shown)", pairs.len());
        }
    }

    Ok(())
}

/// Execute the history command.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened or the query fails.
pub fn history(cli: &Cli, id: i64, limit: Option<u32>, json: bool) -> Result<()> {
    let ws = Workspace::open(cli)?;
    let events = ws.store.node_history(id, limit)?;

    if json {
        let output = serde_json::json!({
            "id": id,
            "count": events.len(),
            "events": events,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if events.is_empty() {
        println!("No events for node {id}.");
    } else {
        for event in &events {
            let when = chrono::DateTime::from_timestamp_millis(event.created_at)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            let detail = event.new_value.as_deref().unwrap_or("");
            println!(
                "{when}  {:<18} {:<10} {detail}",
                event.event_type.as_str(),
                event.actor
            );
        }
    }

    Ok(())
}

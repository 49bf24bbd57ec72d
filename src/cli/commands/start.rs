//! Start command: run the startup sequence once.

use crate::cli::Cli;
use crate::cli::commands::sync::print_import_report;
use crate::cli::commands::Workspace;
use crate::config::EventMode;
use crate::error::Result;
use crate::startup::{start, STARTUP};
use crate::sync::SyncContext;

/// Execute the start command.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened or the sequence fails.
pub fn execute(cli: &Cli, json: bool) -> Result<()> {
    let mut ws = Workspace::open(cli)?;
    let mut ctx = SyncContext::open(&ws.root, &ws.settings)?;

    let Some(report) = start(&STARTUP, &mut ws.store, &mut ctx, &ws.settings)? else {
        if !json {
            println!("Startup already ran in this process.");
        }
        return Ok(());
    };

    if json {
        let output = serde_json::json!({
            "success": true,
            "root": ws.root.display().to_string(),
            "report": report,
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    match &report.exported {
        Some(stats) => println!(
            "Exported {} content and {} media file(s).",
            stats.content_files, stats.media_files
        ),
        None => println!("Sync folder present, export skipped."),
    }
    match &report.imported {
        Some(imported) => {
            println!();
            print_import_report(imported);
        }
        None => println!("Import skipped."),
    }
    println!();
    if report.events == EventMode::Off {
        println!("Change events: off");
    } else {
        println!("Change events: on {:?}", report.events);
    }

    Ok(())
}

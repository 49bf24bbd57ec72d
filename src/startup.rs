//! Startup sequence.
//!
//! Brings the live store and the sync folder in line when a process comes
//! up: export the live tree if there is nothing on disk yet (or settings
//! ask for it), import the folder, then attach the change handler.
//!
//! Attaching only settles the mode. Edits made afterwards reach the folder
//! only when the host routes them through the returned handler:
//!
//! ```no_run
//! # use contentsync::config::Settings;
//! # use contentsync::startup::{start, STARTUP};
//! # use contentsync::storage::SqliteStore;
//! # use contentsync::sync::SyncContext;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let settings = Settings::default();
//! # let mut store = SqliteStore::open_memory()?;
//! # let mut ctx = SyncContext::open(std::path::Path::new(".contentsync"), &settings)?;
//! if let Some(report) = start(&STARTUP, &mut store, &mut ctx, &settings)? {
//!     let watched = report.handler().watch(&mut store, &mut ctx);
//!     // every save, publish, trash and rename on `watched` is mirrored to disk
//! #   drop(watched);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{EventMode, Settings};
use crate::storage::LiveStore;
use crate::sync::{
    import_all, ChangeHandler, ExportStats, Exporter, ImportReport, SyncContext, SyncError,
    SyncResult,
};

/// Process-wide guard for [`start`].
pub static STARTUP: StartupGuard = StartupGuard::new();

/// Runs a closure at most once, even when called from several threads.
///
/// The started flag is checked and set under the same lock, so a second
/// caller blocks until the first run finishes and then skips. A failed run
/// leaves the flag unset so the sequence can be retried.
#[derive(Debug, Default)]
pub struct StartupGuard {
    started: Mutex<bool>,
}

impl StartupGuard {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            started: Mutex::new(false),
        }
    }

    /// Whether a run has completed successfully.
    #[must_use]
    pub fn has_started(&self) -> bool {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` unless a previous run succeeded. Returns `Ok(None)` when skipped.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn run_once<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<Option<T>, E> {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if *started {
            debug!("Startup already ran, skipping");
            return Ok(None);
        }
        let value = f()?;
        *started = true;
        Ok(Some(value))
    }
}

/// What the startup sequence did.
#[derive(Debug, Serialize)]
pub struct StartupReport {
    /// Export stats, if the live tree was exported.
    pub exported: Option<ExportStats>,
    /// Import report, if the folder was imported.
    pub imported: Option<ImportReport>,
    /// Mode the change handler was attached in.
    pub events: EventMode,
}

impl StartupReport {
    /// The change handler to route further live edits through.
    ///
    /// Wrap the live store with [`ChangeHandler::watch`]; edits made on the
    /// bare store bypass the handler and leave the folder stale.
    #[must_use]
    pub const fn handler(&self) -> ChangeHandler {
        ChangeHandler::new(self.events)
    }
}

/// Run the startup sequence without the guard.
///
/// The context is persisted once at the end, after both steps.
///
/// # Errors
///
/// Returns an error if export or import fails. An import with no folders
/// to read is not an error here.
pub fn run_startup<S: LiveStore>(
    store: &mut S,
    ctx: &mut SyncContext,
    settings: &Settings,
) -> SyncResult<StartupReport> {
    let exported = if !ctx.layout.content.is_dir() || settings.export {
        info!(root = %ctx.layout.root.display(), "Exporting live tree");
        Some(Exporter::new(&*store, ctx).export()?)
    } else {
        None
    };

    let imported = if settings.import {
        match import_all(store, ctx, settings.resolve_references) {
            Ok(report) => Some(report),
            Err(SyncError::NothingToImport) => {
                debug!("Nothing to import");
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    ctx.persist()?;

    let handler = ChangeHandler::new(settings.events);
    if handler.is_attached() {
        info!(mode = ?settings.events, "Change handler attached");
    }

    Ok(StartupReport {
        exported,
        imported,
        events: settings.events,
    })
}

/// Run the startup sequence once per guard.
///
/// Returns `Ok(None)` if the guard has already seen a successful run.
///
/// # Errors
///
/// Returns an error if the sequence fails; the guard stays unset.
pub fn start<S: LiveStore>(
    guard: &StartupGuard,
    store: &mut S,
    ctx: &mut SyncContext,
    settings: &Settings,
) -> SyncResult<Option<StartupReport>> {
    guard.run_once(|| run_startup(store, ctx, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeKind, ROOT_ID};
    use crate::storage::SqliteStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn store_with_home() -> SqliteStore {
        let mut store = SqliteStore::open_memory().unwrap();
        store
            .register_type(NodeKind::Content, "page", &["title".to_string()])
            .unwrap();
        let mut home = store
            .create_node(NodeKind::Content, "Home", ROOT_ID, "page")
            .unwrap();
        store.save_and_publish(&mut home).unwrap();
        store
    }

    #[test]
    fn test_guard_runs_once() {
        let guard = StartupGuard::new();
        let first: Result<Option<u8>, ()> = guard.run_once(|| Ok(1));
        let second: Result<Option<u8>, ()> = guard.run_once(|| Ok(2));
        assert_eq!(first, Ok(Some(1)));
        assert_eq!(second, Ok(None));
        assert!(guard.has_started());
    }

    #[test]
    fn test_guard_retries_after_failure() {
        let guard = StartupGuard::new();
        let failed: Result<Option<u8>, &str> = guard.run_once(|| Err("boom"));
        assert_eq!(failed, Err("boom"));
        assert!(!guard.has_started());

        let retried: Result<Option<u8>, &str> = guard.run_once(|| Ok(3));
        assert_eq!(retried, Ok(Some(3)));
    }

    #[test]
    fn test_guard_under_concurrent_callers() {
        let guard = Arc::new(StartupGuard::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let runs = Arc::clone(&runs);
                std::thread::spawn(move || {
                    let _: Result<Option<()>, ()> = guard.run_once(|| {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_startup_exports_when_folder_missing() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            export: false,
            ..Settings::default()
        };
        let mut ctx = SyncContext::open(dir.path(), &settings).unwrap();
        let mut store = store_with_home();

        let report = run_startup(&mut store, &mut ctx, &settings).unwrap();

        let exported = report.exported.unwrap();
        assert_eq!(exported.content_files, 1);
        assert!(ctx.layout.content.join("Home.content").is_file());
        // The import that follows sees the exported node as already live.
        let imported = report.imported.unwrap();
        assert_eq!(imported.content.identities.up_to_date, 1);
        assert!(ctx.layout.pairs.is_file());
    }

    #[test]
    fn test_startup_skips_export_when_folder_exists() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            export: false,
            import: false,
            ..Settings::default()
        };
        let mut ctx = SyncContext::open(dir.path(), &settings).unwrap();
        ctx.layout.ensure_dirs().unwrap();
        let mut store = store_with_home();

        let report = run_startup(&mut store, &mut ctx, &settings).unwrap();

        assert!(report.exported.is_none());
        assert!(report.imported.is_none());
        assert!(!ctx.layout.content.join("Home.content").exists());
    }

    #[test]
    fn test_start_is_guarded() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            events: EventMode::Publish,
            ..Settings::default()
        };
        let mut ctx = SyncContext::open(dir.path(), &settings).unwrap();
        let mut store = store_with_home();
        let guard = StartupGuard::new();

        let first = start(&guard, &mut store, &mut ctx, &settings).unwrap();
        let second = start(&guard, &mut store, &mut ctx, &settings).unwrap();

        let report = first.unwrap();
        assert_eq!(report.events, EventMode::Publish);
        assert!(report.handler().is_attached());
        assert!(second.is_none());
    }

    #[test]
    fn test_edits_through_report_handler_reach_the_folder() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            events: EventMode::Save,
            ..Settings::default()
        };
        let mut ctx = SyncContext::open(dir.path(), &settings).unwrap();
        let mut store = store_with_home();
        let guard = StartupGuard::new();

        let report = start(&guard, &mut store, &mut ctx, &settings).unwrap().unwrap();
        let news_file = ctx.layout.content.join("News.content");

        let mut watched = report.handler().watch(&mut store, &mut ctx);
        let mut news = watched
            .create_node(NodeKind::Content, "News", ROOT_ID, "page")
            .unwrap();
        watched.save(&mut news).unwrap();
        drop(watched);

        assert!(news_file.is_file());
    }
}

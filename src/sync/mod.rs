//! File-based content tree sync.
//!
//! This module moves a content tree between a live store and a folder of
//! git-friendly node files:
//!
//! - **Export**: live tree → one `.content` / `.media` JSON file per node,
//!   nested in folders that mirror the tree
//! - **Import**: node files → live store in two passes (identities, then
//!   cross-references)
//! - **Pairs**: persistent source ↔ target identity correlation
//! - **Events**: keep the folder current as nodes are saved, published or
//!   trashed
//! - **Status**: compare what is on disk with what is live
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   content/Home.content
//!   content/Home/About.content
//!   media/Logo.media
//!   files/<source key>/logo.png
//!   pairs.jsonl
//!   media_index.jsonl
//! ```
//!
//! # Example
//!
//! ```ignore
//! use contentsync::sync::{import_all, Exporter, SyncContext};
//!
//! let mut ctx = SyncContext::open(&root, &settings)?;
//! let report = import_all(&mut store, &mut ctx, true)?;
//! ctx.persist()?;
//!
//! let stats = Exporter::new(&store, &ctx).export()?;
//! ```

mod context;
mod events;
mod export;
mod file;
mod import;
mod media;
mod media_index;
mod pairs;
mod rewrite;
mod status;
mod types;

pub use context::{SyncContext, SyncLayout, MEDIA_INDEX_FILE, PAIRS_FILE};
pub use events::{ChangeHandler, WatchedStore};
pub use export::{file_stems, Exporter, CHILD_LINK_ALIAS};
pub use file::{
    archive_file, atomic_write, clean_file_name, clean_media_files, ensure_gitignore,
    export_media_file, gitignore_content, move_file, node_file_name, read_jsonl, read_node_file,
    rename_file, write_jsonl, write_node_file,
};
pub use import::{import_all, Importer};
pub use media_index::{MediaIndex, MediaIndexEntry};
pub use pairs::{CorrelationPair, CorrelationStore};
pub use rewrite::{find_tokens, rewrite_references, UnresolvedPolicy, CONTENT_SENTINEL_ID};
pub use status::{get_sync_status, print_status};
pub use types::{
    ExportStats, ImportPass, ImportReport, ImportStats, NodeError, NodeFailure, NodeState,
    PassStats, SerializedNode, SerializedProperty, SyncError, SyncResult, SyncStatus,
};
pub(crate) use types::store_error;

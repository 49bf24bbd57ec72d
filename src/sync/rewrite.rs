//! Cross-reference rewriting.
//!
//! Property values can embed references to other nodes as identity tokens
//! (UUIDs). Identities differ between environments, so during the
//! reference-resolving pass every token is replaced by the numeric id of the
//! node it stands for in this environment.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use uuid::Uuid;

use crate::model::NodeKind;
use crate::storage::LiveStore;
use crate::sync::pairs::CorrelationStore;
use crate::sync::types::{store_error, SyncResult};

/// Id substituted for content references that cannot be resolved.
pub const CONTENT_SENTINEL_ID: i64 = 1000;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9A-F]{8}(?:-[0-9A-F]{4}){3}-[0-9A-F]{12}\b")
        .expect("token pattern is valid")
});

/// What to write for a token that does not resolve to a live node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedPolicy {
    /// Replace the token with a fixed id.
    Sentinel(i64),
    /// Leave the token as it is.
    KeepToken,
}

impl UnresolvedPolicy {
    /// Policy used by each tree's importer.
    #[must_use]
    pub const fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Content => Self::Sentinel(CONTENT_SENTINEL_ID),
            NodeKind::Media => Self::KeepToken,
        }
    }
}

/// Distinct identity tokens in a raw value, in order of first appearance.
#[must_use]
pub fn find_tokens(raw: &str) -> Vec<Uuid> {
    let mut tokens = Vec::new();
    for m in TOKEN.find_iter(raw) {
        if let Ok(token) = Uuid::parse_str(m.as_str()) {
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
    }
    tokens
}

/// Rewrite every identity token in `raw`.
///
/// `resolve` maps a token to the live numeric id it refers to. Each distinct
/// token is resolved once; the value is then rewritten in a single sweep.
///
/// # Errors
///
/// Returns the first error reported by `resolve`.
pub fn rewrite_references<F>(raw: &str, policy: UnresolvedPolicy, mut resolve: F) -> SyncResult<String>
where
    F: FnMut(Uuid) -> SyncResult<Option<i64>>,
{
    let tokens = find_tokens(raw);
    if tokens.is_empty() {
        return Ok(raw.to_string());
    }

    let mut replacements: HashMap<Uuid, Option<String>> = HashMap::with_capacity(tokens.len());
    for token in tokens {
        let replacement = match resolve(token)? {
            Some(id) => Some(id.to_string()),
            None => match policy {
                UnresolvedPolicy::Sentinel(id) => Some(id.to_string()),
                UnresolvedPolicy::KeepToken => None,
            },
        };
        replacements.insert(token, replacement);
    }

    let rewritten = TOKEN.replace_all(raw, |caps: &Captures<'_>| {
        let text = &caps[0];
        Uuid::parse_str(text)
            .ok()
            .and_then(|token| replacements.get(&token).cloned().flatten())
            .unwrap_or_else(|| text.to_string())
    });
    Ok(rewritten.into_owned())
}

/// Live numeric id a token refers to, if the node exists and is not trashed.
///
/// The token may be a source identity (written by another environment) or
/// a target identity (written by this one); both are followed through the
/// correlation table to a live node. Nodes of `kind` are tried first, then
/// the other tree, since content values routinely point at media.
///
/// # Errors
///
/// Returns an error if the live store lookup fails.
pub fn resolve_live_id<S: LiveStore + ?Sized>(
    store: &S,
    pairs: &CorrelationStore,
    kind: NodeKind,
    token: Uuid,
) -> SyncResult<Option<i64>> {
    let source = pairs.resolve_source(token).unwrap_or(token);
    let target = pairs.lookup_target(source).unwrap_or(source);

    for kind in [kind, kind.other()] {
        let node = store.find_by_key(kind, target).map_err(store_error)?;
        if let Some(node) = node.filter(|n| !n.trashed) {
            return Ok(Some(node.id));
        }
    }
    Ok(None)
}

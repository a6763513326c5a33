//! Stable, filesystem-safe action keys.
//!
//! A key is `<type>-<ordinal>` (ordinal zero-padded to two digits) or
//! `<type>-<sanitized id>` when the action carries an explicit artifact id.
//! Keys name artifact subdirectories, so they must stay identical across runs
//! for an unchanged step definition.

use std::fmt;

use serde::Serialize;

use crate::model::action::Action;

/// Identifier for one action within a step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ActionKey(String);

impl ActionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the key for `action` sitting at zero-based position `ordinal`.
///
/// Guard wrappers take the key of the innermost wrapped action. The first
/// non-empty explicit id found from the outside in wins over the ordinal.
pub fn derive_key(action: &Action, ordinal: usize) -> ActionKey {
    let type_name = action.innermost().kind.type_name().to_ascii_lowercase();
    let suffix = match action.explicit_id() {
        Some(id) => sanitize(id),
        None => format!("{ordinal:02}"),
    };
    ActionKey(format!("{}-{}", sanitize(&type_name), suffix))
}

/// Collapse every run of characters outside `[A-Za-z0-9._-]` into one `-`.
///
/// An empty result becomes `x` so the output is always a usable path segment.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_run = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }
    if out.is_empty() { "x".to_string() } else { out }
}

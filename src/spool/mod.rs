//! Loaded spool state reported by the spool-tracking integration, plus the
//! `[sm_name = ...]` annotation a slicer profile embeds in its filament notes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// What the spool-tracking integration reports for the extruder slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "slots", rename_all = "snake_case")]
pub enum Loaded {
    /// The integration is not installed.
    Unavailable,
    /// The integration is installed but the lookup failed.
    Error(String),
    /// One entry per slot, `None` where nothing is loaded.
    Loaded(Vec<Option<String>>),
}

impl Loaded {
    /// Value loaded in a 0-based slot. `None` for empty slots and for the
    /// `Unavailable`/`Error` states.
    pub fn slot(&self, index: usize) -> Option<&str> {
        match self {
            Loaded::Loaded(slots) => slots.get(index).and_then(|s| s.as_deref()),
            _ => None,
        }
    }

    /// Number of slots with something loaded.
    pub fn loaded_count(&self) -> usize {
        match self {
            Loaded::Loaded(slots) => slots.iter().filter(|s| s.is_some()).count(),
            _ => 0,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Loaded::Loaded(_))
    }
}

fn sm_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[\s*sm_name\s*=\s*([^\]]*\S)\s*\]").expect("valid sm_name pattern")
    })
}

/// Extract the spool name from a filament note such as
/// `"Bought 2023 [sm_name = Galaxy Black]"`.
pub fn embedded_spool_name(note: &str) -> Option<String> {
    sm_name_pattern()
        .captures(note)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Replace the spool name inside a note's `[sm_name = ...]` token.
/// Returns `None` when the note carries no token.
pub fn replace_spool_name(note: &str, name: &str) -> Option<String> {
    let pattern = sm_name_pattern();
    if !pattern.is_match(note) {
        return None;
    }
    let replacement = format!("[sm_name = {}]", name);
    Some(
        pattern
            .replace(note, regex::NoExpand(&replacement))
            .into_owned(),
    )
}

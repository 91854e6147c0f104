//! Slicer post-processing step
//!
//! Writes the spool chosen for each extruder into the `[sm_name = ...]`
//! token of the file's `; filament_notes = ...` trailer line, so the check
//! run can later compare it with the spool actually loaded. Only the
//! trailer is touched; everything before it is written back unchanged.

use crate::parser::{self, TRAILER_LINES};
use crate::spool;
use log::{debug, info};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid spool map: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid extruder number {0:?} in spool map (expected 1, 2, ...)")]
    BadSlot(String),
}

pub type Result<T> = std::result::Result<T, PostError>;

#[derive(Deserialize)]
struct Entry {
    sm_name: Option<String>,
}

/// Spool name to write for each 0-based slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpoolMap {
    names: BTreeMap<usize, String>,
}

impl SpoolMap {
    /// Parse `{"1": {"sm_name": "Galaxy Black"}, ...}`. Keys are 1-based
    /// extruder numbers; entries with an empty name are ignored.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, Entry> = serde_json::from_str(json)?;
        let mut names = BTreeMap::new();
        for (key, entry) in raw {
            let slot = key
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| PostError::BadSlot(key.clone()))?;
            if let Some(name) = entry.sm_name.map(|n| n.trim().to_string()) {
                if !name.is_empty() {
                    names.insert(slot - 1, name);
                }
            }
        }
        Ok(Self { names })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| PostError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn name(&self, slot: usize) -> Option<&str> {
        self.names.get(&slot).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn notes_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^;[ \t]*filament_notes[ \t]*=[ \t]*([^\r\n]*)")
            .expect("valid filament_notes pattern")
    })
}

/// Rewrite the spool tokens of the first `filament_notes` line in `trailer`.
/// Slots without a map entry, or whose note has no token, are left alone.
/// Returns the new text and the number of notes changed.
pub fn rewrite_trailer(trailer: &str, spools: &SpoolMap) -> (String, usize) {
    let Some(value) = notes_line().captures(trailer).and_then(|c| c.get(1)) else {
        debug!("no filament_notes line in trailer");
        return (trailer.to_string(), 0);
    };

    let mut changed = 0;
    let notes: Vec<String> = value
        .as_str()
        .split(';')
        .enumerate()
        .map(|(slot, note)| {
            match spools
                .name(slot)
                .and_then(|name| spool::replace_spool_name(note, name))
            {
                Some(updated) => {
                    if updated != note {
                        changed += 1;
                    }
                    updated
                }
                None => note.to_string(),
            }
        })
        .collect();

    let mut out = String::with_capacity(trailer.len());
    out.push_str(&trailer[..value.start()]);
    out.push_str(&notes.join(";"));
    out.push_str(&trailer[value.end()..]);
    (out, changed)
}

/// Rewrite `content`, looking for the notes only in its last `lines` lines.
pub fn rewrite_gcode(content: &str, spools: &SpoolMap, lines: usize) -> (String, usize) {
    let offset = parser::trailer_offset(content, lines);
    let (trailer, changed) = rewrite_trailer(&content[offset..], spools);
    (format!("{}{}", &content[..offset], trailer), changed)
}

/// Apply the spool map at `map_path` to the G-code file at `gcode_path` in
/// place. The file is only rewritten when a note changed.
pub fn process_file(map_path: &Path, gcode_path: &Path) -> Result<usize> {
    let spools = SpoolMap::load(map_path)?;
    let content = std::fs::read_to_string(gcode_path).map_err(|source| PostError::Read {
        path: gcode_path.display().to_string(),
        source,
    })?;

    let (rewritten, changed) = rewrite_gcode(&content, &spools, TRAILER_LINES);
    if changed > 0 {
        std::fs::write(gcode_path, rewritten).map_err(|source| PostError::Write {
            path: gcode_path.display().to_string(),
            source,
        })?;
    }
    info!("{}: {} spool name(s) written", gcode_path.display(), changed);
    Ok(changed)
}

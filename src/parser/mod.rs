//! Slicer metadata extraction
//! Reads the trailing comment block of a G-code file and turns it into per-slot records

use crate::lexer;
use crate::spool;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

/// Slicer settings live in the last few hundred lines of the file.
pub const TRAILER_LINES: usize = 1000;

const CHUNK: usize = 8 * 1024;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Everything the validator needs for one extruder slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    /// 0-based slot index
    pub index: usize,
    pub nozzle_diameter: Option<f64>,
    pub filament_type: Option<String>,
    /// mm of filament consumed by this slot
    pub filament_used: Option<f64>,
    pub note: Option<String>,
}

impl Slot {
    /// 1-based extruder position, as shown to the user
    pub fn position(&self) -> u32 {
        self.index as u32 + 1
    }

    /// A slot that consumed exactly no filament is not part of the print.
    pub fn is_unused(&self) -> bool {
        self.filament_used == Some(0.0)
    }

    /// Spool name embedded in the slot's filament note
    pub fn spool_name(&self) -> Option<String> {
        self.note.as_deref().and_then(spool::embedded_spool_name)
    }
}

/// Metadata parsed from a G-code trailer. Rebuilt for every check.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GcodeMetadata {
    pub slots: Vec<Slot>,
    /// Lengths of the declared lists; 0 when the list is absent
    pub nozzle_count: usize,
    pub filament_type_count: usize,
    pub filament_used_count: usize,
    pub printer_model: Option<String>,
    pub skip_validation: bool,
}

impl GcodeMetadata {
    /// Slots the per-extruder checks run on: one per declared nozzle.
    /// Filament entries past the nozzle list are not checked.
    pub fn checked_slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().take(self.nozzle_count)
    }
}

/// Parse the trailer of the G-code file at `path`.
pub fn parse_file(path: &Path, lines: usize) -> Result<GcodeMetadata> {
    let trailer = read_trailer(path, lines)?;
    Ok(parse_trailer(&trailer))
}

/// Read the last `lines` lines of a file without loading the rest of it.
/// Stops at the start of the file when it is shorter.
pub fn read_trailer(path: &Path, lines: usize) -> Result<String> {
    let io_err = |source| ParseError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    if lines == 0 {
        return Ok(String::new());
    }

    let len = file.seek(SeekFrom::End(0)).map_err(io_err)?;
    let mut start = 0u64;
    let mut pos = len;
    let mut newlines = 0usize;
    let mut buf = vec![0u8; CHUNK];

    'scan: while pos > 0 {
        let read = CHUNK.min(pos as usize);
        pos -= read as u64;
        file.seek(SeekFrom::Start(pos)).map_err(io_err)?;
        file.read_exact(&mut buf[..read]).map_err(io_err)?;

        for (i, byte) in buf[..read].iter().enumerate().rev() {
            let offset = pos + i as u64;
            // the newline ending the final line does not open another line
            if *byte != b'\n' || offset + 1 == len {
                continue;
            }
            newlines += 1;
            if newlines == lines {
                start = offset + 1;
                break 'scan;
            }
        }
    }

    file.seek(SeekFrom::Start(start)).map_err(io_err)?;
    let mut tail = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut tail).map_err(io_err)?;
    Ok(String::from_utf8_lossy(&tail).into_owned())
}

/// Byte offset where the last `lines` lines of `content` begin.
pub fn trailer_offset(content: &str, lines: usize) -> usize {
    if lines == 0 {
        return content.len();
    }
    let bytes = content.as_bytes();
    let mut newlines = 0;
    for (i, byte) in bytes.iter().enumerate().rev() {
        if *byte != b'\n' || i + 1 == bytes.len() {
            continue;
        }
        newlines += 1;
        if newlines == lines {
            return i + 1;
        }
    }
    0
}

/// Extract the recognised settings from trailer text. Absent or malformed
/// fields come back empty rather than failing.
pub fn parse_trailer(trailer: &str) -> GcodeMetadata {
    let mut nozzles: Option<Vec<Option<f64>>> = None;
    let mut types: Option<Vec<Option<String>>> = None;
    let mut used: Option<Vec<Option<f64>>> = None;
    let mut notes: Option<Vec<String>> = None;
    let mut printer_model = None;
    let mut skip_validation = false;

    // First occurrence of each key wins
    for setting in lexer::settings(trailer) {
        match (setting.key, setting.value) {
            ("nozzle_diameter", Some(v)) if nozzles.is_none() => {
                nozzles = Some(split_numbers(v, ','));
            }
            ("filament_type", Some(v)) if types.is_none() => {
                types = Some(split_tokens(v, ';'));
            }
            ("filament used [mm]", Some(v)) if used.is_none() => {
                used = Some(split_numbers(v, ','));
            }
            ("filament_notes", Some(v)) if notes.is_none() => {
                notes = Some(v.split(';').map(|n| n.to_string()).collect());
            }
            ("printer_model", Some(v)) if printer_model.is_none() => {
                let v = v.trim();
                if !v.is_empty() {
                    printer_model = Some(v.to_string());
                }
            }
            (key, _) if key.starts_with("skip_validation") => skip_validation = true,
            _ => {}
        }
    }

    let nozzle_count = nozzles.as_ref().map_or(0, Vec::len);
    let filament_type_count = types.as_ref().map_or(0, Vec::len);
    let filament_used_count = used.as_ref().map_or(0, Vec::len);
    let note_count = notes.as_ref().map_or(0, Vec::len);
    let slot_count = nozzle_count
        .max(filament_type_count)
        .max(filament_used_count)
        .max(note_count);

    let slots = (0..slot_count)
        .map(|index| Slot {
            index,
            nozzle_diameter: nozzles.as_ref().and_then(|n| n.get(index).copied().flatten()),
            filament_type: types.as_ref().and_then(|t| t.get(index).cloned().flatten()),
            filament_used: used.as_ref().and_then(|u| u.get(index).copied().flatten()),
            note: notes.as_ref().and_then(|n| n.get(index).cloned()),
        })
        .collect();

    GcodeMetadata {
        slots,
        nozzle_count,
        filament_type_count,
        filament_used_count,
        printer_model,
        skip_validation,
    }
}

fn split_numbers(value: &str, sep: char) -> Vec<Option<f64>> {
    value
        .split(sep)
        .map(|v| v.trim().parse::<f64>().ok())
        .collect()
}

fn split_tokens(value: &str, sep: char) -> Vec<Option<String>> {
    value
        .split(sep)
        .map(|v| {
            let v = v.trim();
            (!v.is_empty()).then(|| v.to_string())
        })
        .collect()
}

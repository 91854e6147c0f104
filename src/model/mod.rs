//! Printer model matching
//!
//! Slicer profiles name a printer with optional suffixes: `is` for input
//! shaping and `mmu2`/`mmu3` (optionally `s`) for an attached multi-material
//! unit. `MK4ISMMU3`, `MK4MMU3IS` and `MK4MMU3` all describe an MK4 with an
//! MMU3; only the base model has to agree between G-code and printer.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Multi-material unit attached to a printer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mmu {
    pub generation: u8,
    pub s_variant: bool,
}

/// A printer model split into base name and suffixes. Always lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterModel {
    base: String,
    input_shaping: bool,
    mmu: Option<Mmu>,
}

fn suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // One alternation so `is` is consumed at most once: either as part of an
    // MMU suffix on either side, or alone.
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<base>.*?)(?:is(?P<a>mmu[23]s?)|(?P<b>mmu[23]s?)is|(?P<c>mmu[23]s?)|(?P<is>is))$")
            .expect("valid printer model pattern")
    })
}

impl PrinterModel {
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        let Some(caps) = suffix_pattern().captures(&lower) else {
            return Self {
                base: lower,
                input_shaping: false,
                mmu: None,
            };
        };

        let base = caps.name("base").map_or("", |m| m.as_str()).to_string();
        let (mmu, input_shaping) = if let Some(m) = caps.name("a") {
            (Some(m.as_str()), true)
        } else if let Some(m) = caps.name("b") {
            (Some(m.as_str()), true)
        } else if let Some(m) = caps.name("c") {
            (Some(m.as_str()), false)
        } else {
            (None, caps.name("is").is_some())
        };

        Self {
            base,
            input_shaping,
            mmu: mmu.map(parse_mmu),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn has_input_shaping(&self) -> bool {
        self.input_shaping
    }

    pub fn mmu(&self) -> Option<Mmu> {
        self.mmu
    }

    /// Same printer, ignoring input-shaping and MMU suffixes
    pub fn same_printer(&self, other: &PrinterModel) -> bool {
        self.base == other.base
    }
}

fn parse_mmu(text: &str) -> Mmu {
    // text is `mmu2`, `mmu3`, `mmu2s` or `mmu3s`
    let generation = if text.as_bytes().get(3) == Some(&b'2') { 2 } else { 3 };
    Mmu {
        generation,
        s_variant: text.ends_with('s'),
    }
}

impl fmt::Display for PrinterModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        if self.input_shaping {
            write!(f, "is")?;
        }
        if let Some(mmu) = self.mmu {
            write!(f, "mmu{}", mmu.generation)?;
            if mmu.s_variant {
                write!(f, "s")?;
            }
        }
        Ok(())
    }
}

/// Canonical lowercase spelling: base, then `is`, then the MMU suffix.
pub fn normalize(raw: &str) -> String {
    PrinterModel::parse(raw).to_string()
}

/// Whether the model names an attached MMU in any accepted form
pub fn has_mmu_suffix(raw: &str) -> bool {
    PrinterModel::parse(raw).mmu().is_some()
}

/// Outcome of comparing the G-code's printer model with the configured one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelCheck {
    /// The G-code does not name a printer
    Undeclared,
    Match {
        /// The printer supports input shaping but the profile does not use it
        input_shaping_unused: bool,
    },
    Mismatch,
}

pub fn compare(configured: &str, gcode: Option<&str>) -> ModelCheck {
    let Some(gcode) = gcode.map(str::trim).filter(|g| !g.is_empty()) else {
        return ModelCheck::Undeclared;
    };

    let configured = PrinterModel::parse(configured);
    let declared = PrinterModel::parse(gcode);

    if !configured.same_printer(&declared) {
        return ModelCheck::Mismatch;
    }

    ModelCheck::Match {
        input_shaping_unused: configured.has_input_shaping() && !declared.has_input_shaping(),
    }
}

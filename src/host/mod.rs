//! Collaborators provided by the print host
//!
//! The validator never talks to a printer, a UI or a spool inventory
//! directly; it goes through these traits. `console` has the implementations
//! used by the command-line binary.

use crate::spool::Loaded;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod console;

#[cfg(test)]
pub(crate) mod testing;

/// Printer profile as configured on the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterProfile {
    pub model: String,
    pub extruder_count: usize,
    /// All extruders feed one nozzle
    pub shared_nozzle: bool,
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self {
            model: String::new(),
            extruder_count: 1,
            shared_nozzle: false,
        }
    }
}

impl PrinterProfile {
    /// Several tool heads with their own nozzles
    pub fn is_multi_tool_head(&self) -> bool {
        self.extruder_count > 1 && !self.shared_nozzle
    }
}

pub trait ProfileSource: Send + Sync {
    fn current_profile(&self) -> PrinterProfile;
}

pub trait PrintControl: Send + Sync {
    fn pause_print(&self);
    fn cancel_print(&self);
}

/// Spool-tracking integration
pub trait SpoolSource: Send + Sync {
    /// Material of the spool loaded in each slot, e.g. `PLA`
    fn loaded_materials(&self) -> Loaded;
    /// Display name of the spool loaded in each slot
    fn loaded_spool_names(&self) -> Loaded;
}

pub trait AlertSink: Send + Sync {
    fn send_alert(&self, alert: Alert);
}

/// Alert types understood by the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    Popup,
    Error,
    Info,
    Success,
    /// Prompt to load a different spool before the print continues
    SpoolSwitch {
        expected: String,
        loaded: Option<String>,
        extruder: u32,
        timeout: u64,
    },
}

/// One-way message to the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(flatten)]
    pub kind: AlertKind,
    pub msg: String,
}

impl Alert {
    pub fn new(kind: AlertKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self::new(AlertKind::Info, msg)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(AlertKind::Error, msg)
    }

    pub fn success(msg: impl Into<String>) -> Self {
        Self::new(AlertKind::Success, msg)
    }
}

/// The full set of host collaborators
#[derive(Clone)]
pub struct Host {
    pub profile: Arc<dyn ProfileSource>,
    pub printer: Arc<dyn PrintControl>,
    pub spools: Arc<dyn SpoolSource>,
    pub alerts: Arc<dyn AlertSink>,
}

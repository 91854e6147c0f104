//! Host collaborators for running checks from a terminal

use super::{Alert, AlertKind, AlertSink, PrintControl, PrinterProfile, ProfileSource, SpoolSource};
use crate::spool::Loaded;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// A fixed printer profile
pub struct StaticProfile(pub PrinterProfile);

impl ProfileSource for StaticProfile {
    fn current_profile(&self) -> PrinterProfile {
        self.0.clone()
    }
}

/// A spool loaded in one slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoolSnapshot {
    pub material: String,
    pub name: String,
}

/// Spools as recorded in the settings file. `None` means no spool
/// inventory is available at all.
pub struct SnapshotSpools {
    pub slots: Option<Vec<Option<SpoolSnapshot>>>,
}

impl SnapshotSpools {
    fn map(&self, field: impl Fn(&SpoolSnapshot) -> String) -> Loaded {
        match &self.slots {
            None => Loaded::Unavailable,
            Some(slots) => Loaded::Loaded(slots.iter().map(|s| s.as_ref().map(&field)).collect()),
        }
    }
}

impl SpoolSource for SnapshotSpools {
    fn loaded_materials(&self) -> Loaded {
        self.map(|s| s.material.clone())
    }

    fn loaded_spool_names(&self) -> Loaded {
        self.map(|s| s.name.clone())
    }
}

/// Writes alerts to stderr and the log
pub struct ConsoleAlerts;

impl AlertSink for ConsoleAlerts {
    fn send_alert(&self, alert: Alert) {
        match &alert.kind {
            AlertKind::Error => error!("{}", alert.msg),
            AlertKind::SpoolSwitch { .. } => warn!("{}", alert.msg),
            _ => info!("{}", alert.msg),
        }
        eprintln!("[{}] {}", label(&alert.kind), alert.msg);
        if let AlertKind::SpoolSwitch { .. } = alert.kind {
            eprintln!("Type 'ok' once the spool is loaded or 'cancel' to stop the print.");
        }
    }
}

fn label(kind: &AlertKind) -> &'static str {
    match kind {
        AlertKind::Popup => "popup",
        AlertKind::Error => "error",
        AlertKind::Info => "info",
        AlertKind::Success => "success",
        AlertKind::SpoolSwitch { .. } => "spool",
    }
}

/// Records pause and cancel requests instead of driving a printer
#[derive(Default)]
pub struct ConsolePrinter {
    paused: AtomicBool,
    cancelled: AtomicBool,
}

impl ConsolePrinter {
    pub fn was_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl PrintControl for ConsolePrinter {
    fn pause_print(&self) {
        warn!("print paused");
        self.paused.store(true, Ordering::SeqCst);
    }

    fn cancel_print(&self) {
        warn!("print cancelled");
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_spools() {
        let spools = SnapshotSpools {
            slots: Some(vec![
                Some(SpoolSnapshot { material: "PLA".into(), name: "Galaxy Black".into() }),
                None,
            ]),
        };
        assert_eq!(
            spools.loaded_materials(),
            Loaded::Loaded(vec![Some("PLA".into()), None])
        );
        assert_eq!(spools.loaded_spool_names().slot(0), Some("Galaxy Black"));

        let missing = SnapshotSpools { slots: None };
        assert_eq!(missing.loaded_materials(), Loaded::Unavailable);
    }

    #[test]
    fn test_console_printer_records() {
        let printer = ConsolePrinter::default();
        assert!(!printer.was_paused());
        printer.pause_print();
        printer.cancel_print();
        assert!(printer.was_paused());
        assert!(printer.was_cancelled());
    }
}

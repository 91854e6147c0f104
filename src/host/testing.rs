//! Recording host used by the unit tests

use super::{Alert, AlertKind, AlertSink, Host, PrintControl, PrinterProfile, ProfileSource, SpoolSource};
use crate::spool::Loaded;
use crate::wait::{SpoolWait, WaitState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) struct FakeHost {
    pub profile: Mutex<PrinterProfile>,
    pub materials: Mutex<Loaded>,
    pub spool_names: Mutex<Loaded>,
    pub alerts: Mutex<Vec<Alert>>,
    pauses: AtomicUsize,
    cancels: AtomicUsize,
    /// Answer a spool-switch prompt as soon as it is shown
    answer: Mutex<Option<(SpoolWait, WaitState)>>,
}

impl FakeHost {
    pub fn new(profile: PrinterProfile) -> Arc<Self> {
        Arc::new(Self {
            profile: Mutex::new(profile),
            materials: Mutex::new(Loaded::Loaded(Vec::new())),
            spool_names: Mutex::new(Loaded::Loaded(Vec::new())),
            alerts: Mutex::new(Vec::new()),
            pauses: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            answer: Mutex::new(None),
        })
    }

    pub fn host(self: &Arc<Self>) -> Host {
        Host {
            profile: self.clone(),
            printer: self.clone(),
            spools: self.clone(),
            alerts: self.clone(),
        }
    }

    pub fn load(&self, slots: &[Option<(&str, &str)>]) {
        *self.materials.lock() =
            Loaded::Loaded(slots.iter().map(|s| s.map(|(m, _)| m.to_string())).collect());
        *self.spool_names.lock() =
            Loaded::Loaded(slots.iter().map(|s| s.map(|(_, n)| n.to_string())).collect());
    }

    pub fn answer_spool_switch(&self, wait: &SpoolWait, state: WaitState) {
        *self.answer.lock() = Some((wait.clone(), state));
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<String> {
        self.alerts.lock().iter().map(|a| a.msg.clone()).collect()
    }

    pub fn has_message(&self, needle: &str) -> bool {
        self.alerts.lock().iter().any(|a| a.msg.contains(needle))
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.alerts
            .lock()
            .iter()
            .filter(|a| {
                let tag = match a.kind {
                    AlertKind::Popup => "popup",
                    AlertKind::Error => "error",
                    AlertKind::Info => "info",
                    AlertKind::Success => "success",
                    AlertKind::SpoolSwitch { .. } => "spool_switch",
                };
                tag == kind
            })
            .count()
    }
}

impl ProfileSource for FakeHost {
    fn current_profile(&self) -> PrinterProfile {
        self.profile.lock().clone()
    }
}

impl PrintControl for FakeHost {
    fn pause_print(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn cancel_print(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

impl SpoolSource for FakeHost {
    fn loaded_materials(&self) -> Loaded {
        self.materials.lock().clone()
    }

    fn loaded_spool_names(&self) -> Loaded {
        self.spool_names.lock().clone()
    }
}

impl AlertSink for FakeHost {
    fn send_alert(&self, alert: Alert) {
        let is_switch = matches!(alert.kind, AlertKind::SpoolSwitch { .. });
        self.alerts.lock().push(alert);
        if is_switch {
            if let Some((wait, state)) = self.answer.lock().as_ref() {
                wait.set(*state);
            }
        }
    }
}

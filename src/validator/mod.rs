//! Pre-print checks
//!
//! [`Validator::check_print`] compares what a sliced file expects (printer,
//! nozzles, filaments, spools) with what the printer has, and pauses or
//! cancels the print when they disagree. A detected contradiction cancels;
//! anything that merely cannot be verified pauses so the operator can
//! resume on purpose.

use crate::host::{Alert, AlertKind, Host};
use crate::model::{self, ModelCheck};
use crate::parser::{self, GcodeMetadata, ParseError, Slot};
use crate::spool::Loaded;
use crate::store::{BuildPlate, FilamentPolicy, Store, StoreError};
use crate::wait::{SpoolWait, WaitOutcome};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// A contradiction between the file and the printer. Cancels the print.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Mismatch {
    #[error("Incorrect printer model, {found} found in gcode but {configured} is set.")]
    PrinterModel { found: String, configured: String },

    #[error(
        "Number of nozzles ({declared}) in the gcode is longer than the number of extruders on your machine ({extruders})"
    )]
    TooManyNozzles { declared: usize, extruders: usize },

    #[error("Loaded filaments ({loaded}) is shorter than the number specified in the gcode ({declared})")]
    NotEnoughFilament { loaded: usize, declared: usize },

    #[error("Incorrect filament type on extruder {position}. expected {expected}, but {loaded} is currently loaded")]
    FilamentType {
        position: u32,
        expected: String,
        loaded: String,
    },

    #[error(
        "Incorrect nozzle size on extruder {position}. expected {expected}mm nozzle, but {installed}mm nozzle is currently installed"
    )]
    NozzleSize {
        position: u32,
        expected: f64,
        installed: f64,
    },

    #[error("Incompatible build plate, {plate} doesn't support {filament}")]
    BuildPlate { plate: String, filament: String },

    #[error("Spool switch on extruder {position} was cancelled")]
    SpoolSwitchCancelled { position: u32 },

    #[error("Spool switch on extruder {position} timed out after {seconds}s")]
    SpoolSwitchTimedOut { position: u32, seconds: u64 },
}

#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Mismatch(#[from] Mismatch),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// How a check run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", content = "reasons", rename_all = "snake_case")]
pub enum Verdict {
    /// The file asked for validation to be skipped
    Skipped,
    Passed,
    /// The print was paused; one reason per pause request
    Paused(Vec<String>),
    Cancelled(String),
}

#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    /// Trailing lines of the file scanned for slicer settings
    pub trailer_lines: usize,
    /// Put the spool wait back to `ok` before each run so a stale answer
    /// from an earlier print is not picked up.
    pub reset_wait_state_each_run: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            trailer_lines: parser::TRAILER_LINES,
            reset_wait_state_each_run: true,
        }
    }
}

/// State of a single check run
struct RunContext<'h> {
    host: &'h Host,
    paused: bool,
    reasons: Vec<String>,
    nozzle_passed: bool,
    filament_passed: bool,
    mmu_single_mode: bool,
    skipped: bool,
}

impl<'h> RunContext<'h> {
    fn new(host: &'h Host) -> Self {
        Self {
            host,
            paused: false,
            reasons: Vec::new(),
            nozzle_passed: true,
            filament_passed: true,
            mmu_single_mode: false,
            skipped: false,
        }
    }

    fn notify(&self, alert: Alert) {
        self.host.alerts.send_alert(alert);
    }

    /// Tell the operator and pause. Only the first request reaches the printer.
    fn pause(&mut self, alert: Alert) {
        warn!("pause requested: {}", alert.msg);
        if !self.reasons.contains(&alert.msg) {
            self.reasons.push(alert.msg.clone());
        }
        self.notify(alert);
        if !self.paused {
            self.paused = true;
            self.host.printer.pause_print();
        }
    }

    fn finish(mut self, outcome: Result<(), CheckError>) -> Verdict {
        match outcome {
            Err(CheckError::Mismatch(mismatch)) => {
                error!("Print aborted: {}", mismatch);
                self.notify(Alert::error(format!("Print aborted: {}", mismatch)));
                self.host.printer.cancel_print();
                Verdict::Cancelled(mismatch.to_string())
            }
            Err(e) => {
                self.pause(Alert::error(format!(
                    "An error occurred while running checks, please report this error. \n\
                     Error: \"{}\" \n please check your config and press resume to continue.",
                    e
                )));
                Verdict::Paused(self.reasons)
            }
            Ok(()) if self.skipped => Verdict::Skipped,
            Ok(()) if self.paused => Verdict::Paused(self.reasons),
            Ok(()) => Verdict::Passed,
        }
    }
}

pub struct Validator {
    store: Store,
    host: Host,
    wait: SpoolWait,
    options: ValidatorOptions,
}

impl Validator {
    pub fn new(store: Store, host: Host, wait: SpoolWait) -> Self {
        Self {
            store,
            host,
            wait,
            options: ValidatorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ValidatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Handle used to answer a pending spool switch
    pub fn wait_handle(&self) -> SpoolWait {
        self.wait.clone()
    }

    /// Run every check against the file at `path`. Pausing and cancelling
    /// happen through the host; the verdict reports what was done.
    pub fn check_print(&self, path: &Path) -> Verdict {
        info!("checking {}", path.display());
        if self.options.reset_wait_state_each_run {
            self.wait.reset();
        }

        let mut run = RunContext::new(&self.host);
        let outcome = self.run_checks(path, &mut run);
        let verdict = run.finish(outcome);
        info!("{}: {:?}", path.display(), verdict);
        verdict
    }

    fn run_checks(&self, path: &Path, run: &mut RunContext<'_>) -> Result<(), CheckError> {
        if !path.exists() {
            run.pause(Alert::error(format!(
                "File {} not found, no checks will be performed. Press RESUME to continue anyways",
                path.display()
            )));
            return Ok(());
        }

        let gcode = parser::parse_file(path, self.options.trailer_lines)?;
        if gcode.skip_validation {
            info!("skip_validation set, not checking");
            run.skipped = true;
            return Ok(());
        }

        let profile = self.host.profile.current_profile();
        let extruders = profile.extruder_count;

        self.check_printer_model(&profile.model, &gcode, run)?;

        if model::has_mmu_suffix(&profile.model)
            && gcode.nozzle_count == 1
            && gcode.filament_type_count == 1
            && gcode.filament_used_count == 1
        {
            run.mmu_single_mode = true;
            let filament = gcode.slots[0].filament_type.as_deref().unwrap_or("the sliced");
            run.notify(Alert::info(format!(
                "MMU single mode detected, skipping filament checks, please make sure you pick a tool with {} filament",
                filament
            )));
        }

        self.check_extruder_count(&gcode, extruders, run)?;

        let policy = self.store.filament_policy()?;
        for slot in gcode.checked_slots().filter(|s| !s.is_unused()) {
            self.check_spool_id(slot, &policy, run)?;
        }

        let materials = self.host.spools.loaded_materials();
        if let Loaded::Loaded(_) = materials {
            let loaded = materials.loaded_count();
            if loaded < gcode.filament_type_count {
                return Err(Mismatch::NotEnoughFilament {
                    loaded,
                    declared: gcode.filament_type_count,
                }
                .into());
            }
            if gcode.filament_type_count < extruders && !run.mmu_single_mode {
                run.pause(Alert::info(format!(
                    "Print paused: loaded filaments ({}) is longer than the number specified in the gcode ({}). Press RESUME to continue",
                    loaded, gcode.filament_type_count
                )));
            }
        }

        // Checked again after the spool waits
        self.check_extruder_count(&gcode, extruders, run)?;

        let plate = self.store.current_build_plate()?;
        let mut plate_reported = false;
        let mut checked = 0;
        for slot in gcode.checked_slots() {
            if slot.is_unused() {
                debug!("extruder {} unused, skipping", slot.position());
                continue;
            }
            checked += 1;
            if !run.mmu_single_mode {
                self.check_filament_type(slot, &materials, run)?;
            }
            self.check_nozzle(slot, run)?;
            check_build_plate(slot, plate.as_ref(), &mut plate_reported, run)?;
        }

        if checked == 0 {
            info!("no extruder slot to check");
        } else if run.nozzle_passed && run.filament_passed {
            info!("Print passed nozzle and filament check");
            run.notify(Alert::success("Print passed nozzle and filament check"));
        } else {
            let failed: Vec<&str> = [
                (!run.nozzle_passed).then_some("nozzle_passed"),
                (!run.filament_passed).then_some("filament_passed"),
            ]
            .into_iter()
            .flatten()
            .collect();
            run.pause(Alert::info(format!(
                "Not all checks passed, the following checks failed: {}.\nPlease check your config and press resume to continue.",
                failed.join(", ")
            )));
        }
        Ok(())
    }

    fn check_printer_model(
        &self,
        configured: &str,
        gcode: &GcodeMetadata,
        run: &mut RunContext<'_>,
    ) -> Result<(), Mismatch> {
        match model::compare(configured, gcode.printer_model.as_deref()) {
            ModelCheck::Undeclared => {
                run.notify(Alert::info(
                    "No printer model found in GCODE, printer model checking won't be performed",
                ));
                Ok(())
            }
            ModelCheck::Match { input_shaping_unused } => {
                if input_shaping_unused {
                    run.notify(Alert::info(
                        "Printing with non InputShaping profile on a printer that supports input shaping",
                    ));
                }
                Ok(())
            }
            ModelCheck::Mismatch => Err(Mismatch::PrinterModel {
                found: gcode.printer_model.clone().unwrap_or_default(),
                configured: configured.to_string(),
            }),
        }
    }

    fn check_extruder_count(
        &self,
        gcode: &GcodeMetadata,
        extruders: usize,
        run: &mut RunContext<'_>,
    ) -> Result<(), Mismatch> {
        if gcode.nozzle_count > extruders {
            return Err(Mismatch::TooManyNozzles {
                declared: gcode.nozzle_count,
                extruders,
            });
        }
        if gcode.nozzle_count < extruders && !run.mmu_single_mode {
            run.pause(Alert::info(format!(
                "Print paused: Number of nozzles in gcode ({}) is shorter than the number of extruders({}). Press RESUME to continue",
                gcode.nozzle_count, extruders
            )));
        }
        Ok(())
    }

    /// Make sure the spool the file was sliced for is the one loaded,
    /// prompting the operator to switch and waiting for an answer if not.
    fn check_spool_id(
        &self,
        slot: &Slot,
        policy: &FilamentPolicy,
        run: &mut RunContext<'_>,
    ) -> Result<(), Mismatch> {
        if !policy.enable_spool_checking {
            return Ok(());
        }
        let position = slot.position();

        let Some(expected) = slot.spool_name() else {
            run.pause(Alert::info(format!(
                "No spool name found in the filament notes for extruder {}, spool checking won't be performed",
                position
            )));
            return Ok(());
        };

        let names = self.host.spools.loaded_spool_names();
        let loaded = match &names {
            Loaded::Unavailable => {
                run.pause(Alert::info(
                    "Spool Manager plugin is not installed. Spools will not be checked.",
                ));
                return Ok(());
            }
            Loaded::Error(e) => {
                run.pause(Alert::info(format!(
                    "Error retrieving loaded spools ({}), spool checking won't be performed",
                    e
                )));
                return Ok(());
            }
            Loaded::Loaded(_) => names.slot(slot.index),
        };

        if loaded == Some(expected.as_str()) {
            debug!("extruder {} has spool {}", position, expected);
            return Ok(());
        }

        let shown = loaded.unwrap_or("None Selected");
        self.wait.begin();
        run.notify(Alert::new(
            AlertKind::SpoolSwitch {
                expected: expected.clone(),
                loaded: loaded.map(String::from),
                extruder: position,
                timeout: policy.timeout_seconds,
            },
            format!(
                "Please load spool {} on extruder {}. {} is currently selected. The print will be cancelled in {} seconds.",
                expected, position, shown, policy.timeout_seconds
            ),
        ));
        info!("waiting for spool {} on extruder {}", expected, position);

        match self.wait.wait(Duration::from_secs(policy.timeout_seconds)) {
            WaitOutcome::Resumed => Ok(()),
            WaitOutcome::Cancelled => Err(Mismatch::SpoolSwitchCancelled { position }),
            WaitOutcome::TimedOut => Err(Mismatch::SpoolSwitchTimedOut {
                position,
                seconds: policy.timeout_seconds,
            }),
        }
    }

    fn check_filament_type(
        &self,
        slot: &Slot,
        materials: &Loaded,
        run: &mut RunContext<'_>,
    ) -> Result<(), Mismatch> {
        if !run.filament_passed {
            return Ok(());
        }
        let position = slot.position();

        let soft = match (&slot.filament_type, materials) {
            (None, _) => Some(format!(
                "No filament type found in GCODE for extruder {}, error checking won't be performed",
                position
            )),
            (_, Loaded::Unavailable) => Some(
                "Spool Manager plugin is not installed. Filament type will not be checked.".to_string(),
            ),
            (_, Loaded::Error(e)) => Some(format!(
                "Error retrieving loaded filament ({}), filament error checking won't be performed",
                e
            )),
            (Some(_), Loaded::Loaded(_)) if materials.slot(slot.index).is_none() => Some(format!(
                "No filament loaded on extruder {}, error checking won't be performed",
                position
            )),
            _ => None,
        };
        if let Some(msg) = soft {
            run.notify(Alert::info(msg));
            run.filament_passed = false;
            return Ok(());
        }

        if let (Some(expected), Some(loaded)) = (&slot.filament_type, materials.slot(slot.index)) {
            if !expected.eq_ignore_ascii_case(loaded) {
                return Err(Mismatch::FilamentType {
                    position,
                    expected: expected.clone(),
                    loaded: loaded.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_nozzle(&self, slot: &Slot, run: &mut RunContext<'_>) -> Result<(), CheckError> {
        if !run.nozzle_passed {
            return Ok(());
        }
        let position = slot.position();

        let Some(expected) = slot.nozzle_diameter else {
            run.notify(Alert::info(format!(
                "No nozzle size found in GCODE for extruder {}, error checking won't be performed",
                position
            )));
            run.nozzle_passed = false;
            return Ok(());
        };

        let Some(installed) = self.store.nozzle_size_for_extruder(position)? else {
            run.notify(Alert::info(format!(
                "No nozzle selected for extruder {}, error checking won't be performed",
                position
            )));
            run.nozzle_passed = false;
            return Ok(());
        };

        if expected != installed {
            return Err(Mismatch::NozzleSize {
                position,
                expected,
                installed,
            }
            .into());
        }
        Ok(())
    }
}

fn check_build_plate(
    slot: &Slot,
    plate: Option<&BuildPlate>,
    reported: &mut bool,
    run: &mut RunContext<'_>,
) -> Result<(), Mismatch> {
    let Some(filament) = &slot.filament_type else {
        return Ok(());
    };

    match plate {
        Some(plate) if !plate.accepts(filament) => Err(Mismatch::BuildPlate {
            plate: plate.name.clone(),
            filament: filament.clone(),
        }),
        Some(_) => Ok(()),
        None => {
            if !*reported {
                *reported = true;
                run.pause(Alert::info(
                    "No build plate selected, build plate compatibility won't be checked",
                ));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::FakeHost;
    use crate::host::{PrinterProfile, ProfileSource};
    use crate::store::tests::{seed, temp_store};
    use crate::wait::WaitState;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Instant;

    struct Rig {
        dir: tempfile::TempDir,
        store: Store,
        fake: Arc<FakeHost>,
        validator: Validator,
    }

    impl Rig {
        fn new(model: &str, extruder_count: usize) -> Self {
            let profile = PrinterProfile {
                model: model.into(),
                extruder_count,
                shared_nozzle: false,
            };
            let (dir, store) = temp_store();
            store.seed(&seed());
            store.sync_extruders(&profile).unwrap();
            store.set_spool_checking(false).unwrap();

            let fake = FakeHost::new(profile);
            let validator = Validator::new(store.clone(), fake.host(), SpoolWait::new());
            Self { dir, store, fake, validator }
        }

        fn gcode(&self, trailer: &str) -> PathBuf {
            let path = self.dir.path().join("print.gcode");
            std::fs::write(&path, format!("G28\nG1 X10 Y10 E0.5\nM107\n{}", trailer)).unwrap();
            path
        }

        fn check(&self, trailer: &str) -> Verdict {
            self.validator.check_print(&self.gcode(trailer))
        }
    }

    const SINGLE_PLA: &str = "; filament used [mm] = 1250.75
; filament_notes = \"\"
; filament_type = PLA
; nozzle_diameter = 0.4
; printer_model = MK4
";

    #[test]
    fn test_matching_print_passes() {
        let rig = Rig::new("MK4", 1);
        rig.fake.load(&[Some(("PLA", "Galaxy Black"))]);

        assert_eq!(rig.check(SINGLE_PLA), Verdict::Passed);
        assert_eq!(rig.fake.pauses(), 0);
        assert_eq!(rig.fake.count_kind("success"), 1);
    }

    #[test]
    fn test_missing_file_pauses() {
        let rig = Rig::new("MK4", 1);
        let verdict = rig.validator.check_print(&rig.dir.path().join("gone.gcode"));

        assert!(matches!(verdict, Verdict::Paused(_)));
        assert_eq!(rig.fake.pauses(), 1);
        assert_eq!(rig.fake.cancels(), 0);
        assert!(rig.fake.has_message("not found"));
    }

    #[test]
    fn test_skip_validation_has_no_side_effects() {
        let rig = Rig::new("MK4", 1);
        let verdict = rig.check("; nozzle_diameter = 0.8\n; printer_model = XL\n; skip_validation\n");

        assert_eq!(verdict, Verdict::Skipped);
        assert!(rig.fake.messages().is_empty());
        assert_eq!(rig.fake.pauses() + rig.fake.cancels(), 0);
    }

    #[test]
    fn test_wrong_printer_cancels() {
        let rig = Rig::new("MK4IS", 1);
        rig.fake.load(&[Some(("PLA", "Galaxy Black"))]);
        let verdict = rig.check(&SINGLE_PLA.replace("MK4", "MK3S"));

        assert!(matches!(verdict, Verdict::Cancelled(_)));
        assert_eq!(rig.fake.cancels(), 1);
        assert!(rig.fake.has_message("Print aborted: Incorrect printer model, MK3S"));
    }

    #[test]
    fn test_input_shaping_notice_only() {
        let rig = Rig::new("MK4IS", 1);
        rig.fake.load(&[Some(("PLA", "Galaxy Black"))]);

        assert_eq!(rig.check(SINGLE_PLA), Verdict::Passed);
        assert!(rig.fake.has_message("non InputShaping profile"));
    }

    #[test]
    fn test_mmu_model_forms() {
        for declared in ["MK4ISMMU3", "MK4MMU3IS", "MK4MMU3"] {
            let rig = Rig::new("MK4IS", 1);
            rig.fake.load(&[Some(("PLA", "Galaxy Black"))]);
            let verdict = rig.check(&SINGLE_PLA.replace("= MK4", &format!("= {}", declared)));
            assert_eq!(verdict, Verdict::Passed, "{declared}");
            assert_eq!(rig.fake.cancels(), 0);
        }
    }

    #[test]
    fn test_second_slot_nozzle_mismatch_cancels() {
        let rig = Rig::new("MK4", 2);
        let large = rig.store.add_nozzle(0.6).unwrap();
        rig.store
            .update_extruder(2, large, &rig.fake.current_profile())
            .unwrap();
        rig.fake.load(&[Some(("PLA", "a")), Some(("PLA", "b"))]);

        let verdict = rig.check(
            "; filament used [mm] = 10.0, 12.0
; filament_type = PLA;PLA
; nozzle_diameter = 0.4,0.4
; printer_model = MK4
",
        );

        assert!(matches!(verdict, Verdict::Cancelled(ref m) if m.contains("extruder 2")));
        assert!(rig.fake.has_message("expected 0.4mm nozzle, but 0.6mm nozzle"));
        assert!(!rig.fake.has_message("extruder 1."));
    }

    #[test]
    fn test_unused_slot_is_skipped() {
        let rig = Rig::new("MK4", 2);
        rig.fake.load(&[Some(("PETG", "a")), Some(("PLA", "b"))]);

        let verdict = rig.check(
            "; filament used [mm] = 0, 12.5
; filament_type = ABS;PLA
; nozzle_diameter = 0.8,0.4
; printer_model = MK4
",
        );

        assert_eq!(verdict, Verdict::Passed);
        assert_eq!(rig.fake.pauses() + rig.fake.cancels(), 0);
    }

    #[test]
    fn test_filament_mismatch_cancels() {
        let rig = Rig::new("MK4", 1);
        rig.fake.load(&[Some(("PETG", "Galaxy Black"))]);

        let verdict = rig.check(SINGLE_PLA);
        assert!(matches!(verdict, Verdict::Cancelled(_)));
        assert!(rig.fake.has_message("expected PLA, but PETG is currently loaded"));
    }

    #[test]
    fn test_filament_compare_ignores_case() {
        let rig = Rig::new("MK4", 1);
        rig.fake.load(&[Some(("pla", "Galaxy Black"))]);
        assert_eq!(rig.check(SINGLE_PLA), Verdict::Passed);
    }

    #[test]
    fn test_missing_metadata_pauses_once() {
        let rig = Rig::new("MK4", 1);
        rig.fake.load(&[Some(("PLA", "Galaxy Black"))]);

        let verdict = rig.check("; filament used [mm] = 5\n; nozzle_diameter = 0.4\n; filament_type = \n");
        let Verdict::Paused(reasons) = verdict else {
            panic!("expected a pause, got {:?}", verdict);
        };
        assert!(reasons.iter().any(|r| r.contains("filament_passed")));
        assert!(!reasons.iter().any(|r| r.contains("nozzle_passed")));
        assert!(rig.fake.has_message("No printer model found"));
        assert_eq!(rig.fake.pauses(), 1);
    }

    #[test]
    fn test_spool_source_unavailable_is_soft() {
        let rig = Rig::new("MK4", 1);
        *rig.fake.materials.lock() = Loaded::Unavailable;

        let verdict = rig.check(SINGLE_PLA);
        assert!(matches!(verdict, Verdict::Paused(_)));
        assert!(rig.fake.has_message("Spool Manager plugin is not installed"));
        assert_eq!(rig.fake.cancels(), 0);
    }

    #[test]
    fn test_too_many_nozzles_cancels() {
        let rig = Rig::new("MK4", 1);
        rig.fake.load(&[Some(("PLA", "a")), Some(("PLA", "b"))]);
        let verdict = rig.check("; nozzle_diameter = 0.4,0.4\n; filament_type = PLA;PLA\n");

        assert!(matches!(verdict, Verdict::Cancelled(ref m) if m.contains("Number of nozzles (2)")));
    }

    #[test]
    fn test_not_enough_filament_cancels() {
        let rig = Rig::new("MK4", 2);
        rig.fake.load(&[Some(("PLA", "a")), None]);
        let verdict = rig.check(
            "; filament used [mm] = 10, 10\n; filament_type = PLA;PLA\n; nozzle_diameter = 0.4,0.4\n",
        );

        assert!(matches!(verdict, Verdict::Cancelled(ref m) if m.contains("Loaded filaments (1)")));
    }

    #[test]
    fn test_incompatible_build_plate_cancels() {
        let rig = Rig::new("MK4", 1);
        rig.fake.load(&[Some(("ABS", "Galaxy Black"))]);

        let verdict = rig.check(&SINGLE_PLA.replace("PLA", "ABS"));
        assert!(matches!(verdict, Verdict::Cancelled(ref m) if m.contains("Smooth PEI doesn't support ABS")));
    }

    #[test]
    fn test_extra_extruders_pause_only_once() {
        let rig = Rig::new("MK4", 2);
        rig.fake.load(&[Some(("PLA", "a")), Some(("PLA", "b"))]);

        let verdict = rig.check(SINGLE_PLA);
        let Verdict::Paused(reasons) = verdict else {
            panic!("expected a pause, got {:?}", verdict);
        };
        assert_eq!(reasons.len(), 2);
        assert_eq!(rig.fake.pauses(), 1);
        assert_eq!(
            rig.fake
                .messages()
                .iter()
                .filter(|m| m.contains("Number of nozzles in gcode (1)"))
                .count(),
            2
        );
    }

    #[test]
    fn test_mmu_single_mode_skips_filament_type() {
        let rig = Rig::new("MK4MMU3", 1);
        rig.fake.load(&[Some(("PLA", "Galaxy Black"))]);

        let verdict = rig.check(&SINGLE_PLA.replace("PLA", "PETG").replace("= MK4", "= MK4MMU3"));
        assert_eq!(verdict, Verdict::Passed);
        assert!(rig.fake.has_message("MMU single mode detected"));
        assert!(rig.fake.has_message("with PETG filament"));
    }

    const NAMED_SPOOL: &str = "; filament used [mm] = 1250.75
; filament_notes = \"dry first [sm_name = Galaxy Black]\"
; filament_type = PLA
; nozzle_diameter = 0.4
; printer_model = MK4
";

    #[test]
    fn test_spool_checking_disabled_never_waits() {
        let rig = Rig::new("MK4", 1);
        rig.fake.load(&[Some(("PLA", "Jet Black"))]);

        let started = Instant::now();
        assert_eq!(rig.check(NAMED_SPOOL), Verdict::Passed);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(rig.fake.count_kind("spool_switch"), 0);
    }

    #[test]
    fn test_spool_wait_times_out_and_cancels() {
        let rig = Rig::new("MK4", 1);
        rig.store.set_spool_checking(true).unwrap();
        rig.store.set_spool_check_timeout(2).unwrap();
        rig.fake.load(&[Some(("PLA", "Jet Black"))]);

        let started = Instant::now();
        let verdict = rig.check(NAMED_SPOOL);

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(matches!(verdict, Verdict::Cancelled(ref m) if m.contains("timed out")));
        assert_eq!(rig.validator.wait_handle().state(), WaitState::Cancel);
        assert_eq!(rig.fake.count_kind("spool_switch"), 1);
        assert_eq!(rig.fake.cancels(), 1);
    }

    #[test]
    fn test_spool_switch_answered() {
        let rig = Rig::new("MK4", 1);
        rig.store.set_spool_checking(true).unwrap();
        rig.fake.load(&[Some(("PLA", "Jet Black"))]);

        rig.fake
            .answer_spool_switch(&rig.validator.wait_handle(), WaitState::Ok);
        assert_eq!(rig.check(NAMED_SPOOL), Verdict::Passed);
        assert!(rig.fake.has_message("Jet Black is currently selected"));

        rig.fake
            .answer_spool_switch(&rig.validator.wait_handle(), WaitState::Cancel);
        assert!(matches!(rig.check(NAMED_SPOOL), Verdict::Cancelled(ref m) if m.contains("was cancelled")));
    }

    #[test]
    fn test_empty_slot_prompts_with_none_selected() {
        let rig = Rig::new("MK4", 1);
        rig.store.set_spool_checking(true).unwrap();
        *rig.fake.spool_names.lock() = Loaded::Loaded(vec![None]);
        rig.fake
            .answer_spool_switch(&rig.validator.wait_handle(), WaitState::Ok);

        rig.check(NAMED_SPOOL);
        assert!(rig.fake.has_message("None Selected"));
    }

    #[test]
    fn test_note_without_spool_name_pauses() {
        let rig = Rig::new("MK4", 1);
        rig.store.set_spool_checking(true).unwrap();
        rig.fake.load(&[Some(("PLA", "Galaxy Black"))]);

        let verdict = rig.check(SINGLE_PLA);
        assert!(matches!(verdict, Verdict::Paused(_)));
        assert_eq!(rig.fake.count_kind("spool_switch"), 0);
    }

    #[test]
    fn test_stale_wait_state_is_reset() {
        let rig = Rig::new("MK4", 1);
        rig.fake.load(&[Some(("PLA", "Galaxy Black"))]);
        rig.validator.wait_handle().set(WaitState::Cancel);

        assert_eq!(rig.check(SINGLE_PLA), Verdict::Passed);
        assert_eq!(rig.validator.wait_handle().state(), WaitState::Ok);
    }

    #[test]
    fn test_store_fault_pauses_with_message() {
        let rig = Rig::new("MK4", 1);
        rig.fake.load(&[Some(("PLA", "Galaxy Black"))]);
        rusqlite::Connection::open(rig.store.path())
            .unwrap()
            .execute_batch("DROP TABLE extruders")
            .unwrap();

        let verdict = rig.check(SINGLE_PLA);
        assert!(matches!(verdict, Verdict::Paused(ref r) if r.iter().any(|m| m.contains("An error occurred"))));
        assert_eq!(rig.fake.cancels(), 0);
    }

    #[test]
    fn test_entries_past_nozzle_list_are_not_checked() {
        let rig = Rig::new("MK4", 1);
        rig.store.set_spool_checking(true).unwrap();
        rig.fake.load(&[Some(("PLA", "Galaxy Black"))]);

        let verdict = rig.check(
            "; filament used [mm] = 12
; filament_notes = \"[sm_name = Galaxy Black]\";\"\";\"[sm_name = Prusa Orange]\"
; filament_type = PLA
; nozzle_diameter = 0.4
; printer_model = MK4
",
        );

        assert_eq!(verdict, Verdict::Passed);
        assert_eq!(rig.fake.count_kind("spool_switch"), 0);
        assert!(!rig.fake.has_message("extruder 2"));
        assert!(!rig.fake.has_message("extruder 3"));
    }

    #[test]
    fn test_no_slots_sends_no_success_notice() {
        let rig = Rig::new("MK4", 1);
        rig.fake.load(&[Some(("PLA", "Galaxy Black"))]);

        let verdict = rig.check("; printer_model = MK4\n");
        assert!(matches!(verdict, Verdict::Paused(ref r) if r.iter().any(|m| m.contains("Number of nozzles in gcode (0)"))));
        assert_eq!(rig.fake.count_kind("success"), 0);
    }
}

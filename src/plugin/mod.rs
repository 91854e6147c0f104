//! Host glue
//!
//! Turns host events and UI commands into store updates and check runs.
//! Commands arrive as JSON objects tagged by a `command` field; ids and
//! flags are accepted as numbers or as the strings a web form sends.

use crate::host::{Alert, Host};
use crate::spool::Loaded;
use crate::store::{BuildPlate, Extruder, FilamentPolicy, Nozzle, Seed, Store, StoreError};
use crate::validator::{Validator, ValidatorOptions, Verdict};
use crate::wait::{SpoolWait, WaitState};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Every command the UI can send
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    #[serde(rename = "addNozzle")]
    AddNozzle {
        #[serde(deserialize_with = "lenient::number")]
        size: f64,
    },

    #[serde(rename = "removeNozzle")]
    RemoveNozzle {
        #[serde(rename = "nozzleId", deserialize_with = "lenient::id")]
        nozzle_id: i64,
    },

    /// Adds a plate, or updates the plate with `id` when one is given
    #[serde(rename = "add_build_plate")]
    AddBuildPlate {
        name: String,
        #[serde(rename = "compatibleFilaments", deserialize_with = "lenient::filaments")]
        compatible_filaments: Vec<String>,
        #[serde(default, deserialize_with = "lenient::optional_id")]
        id: Option<i64>,
    },

    #[serde(rename = "select_build_plate")]
    SelectBuildPlate {
        #[serde(rename = "buildPlateId", deserialize_with = "lenient::id")]
        build_plate_id: i64,
    },

    #[serde(rename = "remove_build_plate")]
    RemoveBuildPlate {
        #[serde(rename = "buildPlateId", deserialize_with = "lenient::id")]
        build_plate_id: i64,
    },

    #[serde(rename = "get_build_plate")]
    GetBuildPlate {
        #[serde(rename = "buildPlateId", deserialize_with = "lenient::id")]
        build_plate_id: i64,
    },

    #[serde(rename = "add_extruder")]
    AddExtruder {
        #[serde(rename = "nozzleId", default, deserialize_with = "lenient::optional_id")]
        nozzle_id: Option<i64>,
        #[serde(rename = "extruderPosition", deserialize_with = "lenient::position")]
        extruder_position: u32,
    },

    #[serde(rename = "update_extruder")]
    UpdateExtruder {
        #[serde(rename = "nozzleId", deserialize_with = "lenient::id")]
        nozzle_id: i64,
        #[serde(rename = "extruderPosition", deserialize_with = "lenient::position")]
        extruder_position: u32,
    },

    #[serde(rename = "remove_extruder")]
    RemoveExtruder {
        #[serde(rename = "extruderPosition", deserialize_with = "lenient::position")]
        extruder_position: u32,
    },

    #[serde(rename = "get_extruder_info")]
    GetExtruderInfo {
        #[serde(rename = "extruderPosition", deserialize_with = "lenient::position")]
        extruder_position: u32,
    },

    #[serde(rename = "get_filament_info")]
    GetFilamentInfo,

    /// `null` drops the override and follows the printer profile again
    #[serde(rename = "set_multi_tool_head")]
    SetMultiToolHead {
        #[serde(default, deserialize_with = "lenient::optional_flag")]
        enabled: Option<bool>,
    },

    #[serde(rename = "updateWaitState")]
    UpdateWaitState { state: WaitState },

    #[serde(rename = "update_check_spool_id")]
    UpdateCheckSpoolId {
        #[serde(rename = "checkSpoolId", deserialize_with = "lenient::flag")]
        check_spool_id: bool,
    },

    #[serde(rename = "update_check_spool_id_timeout")]
    UpdateCheckSpoolIdTimeout {
        #[serde(deserialize_with = "lenient::seconds")]
        timeout: u64,
    },
}

impl Command {
    pub fn from_json(json: &str) -> Result<Self, ApiError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Spool policy plus what the spool tracker currently reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilamentInfo {
    #[serde(flatten)]
    pub policy: FilamentPolicy,
    pub wait_state: WaitState,
    pub loaded_filaments: Loaded,
    pub loaded_spools: Loaded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success { success: bool },
    BuildPlate(BuildPlate),
    Extruder(Extruder),
    FilamentInfo(FilamentInfo),
}

impl Response {
    fn ok() -> Self {
        Response::Success { success: true }
    }
}

/// Everything the settings page shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub nozzles: Vec<Nozzle>,
    pub build_plates: Vec<BuildPlate>,
    pub current_build_plate: Option<i64>,
    pub extruders: Vec<Extruder>,
    pub multi_tool_head: bool,
    pub filament: FilamentInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Startup,
    PrintStarted { path: PathBuf },
    PrinterProfileModified,
}

pub struct Plugin {
    store: Store,
    host: Host,
    seed: Seed,
    validator: Validator,
}

impl Plugin {
    pub fn new(store: Store, host: Host, seed: Seed, options: ValidatorOptions) -> Self {
        let validator =
            Validator::new(store.clone(), host.clone(), SpoolWait::new()).with_options(options);
        Self {
            store,
            host,
            seed,
            validator,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn wait_handle(&self) -> SpoolWait {
        self.validator.wait_handle()
    }

    /// Write missing default rows and match the extruders to the profile.
    pub fn on_startup(&self) {
        self.store.seed(&self.seed);
        self.sync_extruders();
        info!("Nozzle filament validator initialized");
    }

    /// Returns the verdict when the event started a check.
    pub fn on_event(&self, event: Event) -> Option<Verdict> {
        match event {
            Event::Startup => {
                self.on_startup();
                None
            }
            Event::PrintStarted { path } => {
                info!("detected print start for {}", path.display());
                Some(self.validator.check_print(&path))
            }
            Event::PrinterProfileModified => {
                self.sync_extruders();
                None
            }
        }
    }

    fn sync_extruders(&self) {
        let profile = self.host.profile.current_profile();
        if let Err(e) = self.store.sync_extruders(&profile) {
            error!("could not sync extruders with the printer profile: {}", e);
        }
    }

    /// Parse and run a JSON command.
    pub fn on_api_json(&self, json: &str) -> Result<Response, ApiError> {
        self.on_api_command(Command::from_json(json)?)
    }

    /// Run a command. Store failures are also shown to the operator.
    pub fn on_api_command(&self, command: Command) -> Result<Response, ApiError> {
        self.dispatch(command).map_err(|e| {
            error!("command failed: {}", e);
            self.host.alerts.send_alert(Alert::error(format!("Error: {}", e)));
            ApiError::from(e)
        })
    }

    fn dispatch(&self, command: Command) -> Result<Response, StoreError> {
        let store = &self.store;
        match command {
            Command::AddNozzle { size } => {
                store.add_nozzle(size)?;
            }
            Command::RemoveNozzle { nozzle_id } => store.remove_nozzle(nozzle_id)?,
            Command::AddBuildPlate {
                name,
                compatible_filaments,
                id,
            } => match id {
                Some(id) => store.update_build_plate(id, &name, &compatible_filaments)?,
                None => {
                    store.add_build_plate(&name, &compatible_filaments)?;
                }
            },
            Command::SelectBuildPlate { build_plate_id } => {
                store.select_build_plate(build_plate_id)?
            }
            Command::RemoveBuildPlate { build_plate_id } => {
                store.remove_build_plate(build_plate_id)?
            }
            Command::GetBuildPlate { build_plate_id } => {
                let plate = store.build_plate(build_plate_id)?.ok_or(StoreError::NotFound {
                    what: "build plate",
                    id: build_plate_id,
                })?;
                return Ok(Response::BuildPlate(plate));
            }
            Command::AddExtruder {
                nozzle_id,
                extruder_position,
            } => {
                let profile = self.host.profile.current_profile();
                store.add_extruder(nozzle_id, extruder_position, &profile)?;
            }
            Command::UpdateExtruder {
                nozzle_id,
                extruder_position,
            } => {
                let profile = self.host.profile.current_profile();
                store.update_extruder(extruder_position, nozzle_id, &profile)?;
            }
            Command::RemoveExtruder { extruder_position } => {
                store.remove_extruder(extruder_position)?
            }
            Command::GetExtruderInfo { extruder_position } => {
                let extruder = store.extruder(extruder_position)?.ok_or(StoreError::NotFound {
                    what: "extruder",
                    id: extruder_position.into(),
                })?;
                return Ok(Response::Extruder(extruder));
            }
            Command::GetFilamentInfo => return Ok(Response::FilamentInfo(self.filament_info()?)),
            Command::SetMultiToolHead { enabled } => {
                store.set_multi_tool_head(enabled)?;
                store.sync_extruders(&self.host.profile.current_profile())?;
            }
            Command::UpdateWaitState { state } => self.validator.wait_handle().set(state),
            Command::UpdateCheckSpoolId { check_spool_id } => {
                store.set_spool_checking(check_spool_id)?
            }
            Command::UpdateCheckSpoolIdTimeout { timeout } => {
                store.set_spool_check_timeout(timeout)?
            }
        }
        Ok(Response::ok())
    }

    fn filament_info(&self) -> Result<FilamentInfo, StoreError> {
        Ok(FilamentInfo {
            policy: self.store.filament_policy()?,
            wait_state: self.validator.wait_handle().state(),
            loaded_filaments: self.host.spools.loaded_materials(),
            loaded_spools: self.host.spools.loaded_spool_names(),
        })
    }

    pub fn on_api_get(&self) -> Result<Overview, ApiError> {
        let profile = self.host.profile.current_profile();
        Ok(Overview {
            nozzles: self.store.list_nozzles()?,
            build_plates: self.store.list_build_plates()?,
            current_build_plate: self.store.current_build_plate_id()?,
            extruders: self.store.list_extruders()?,
            multi_tool_head: self.store.is_multi_tool_head(&profile)?,
            filament: self.filament_info()?,
        })
    }
}

/// Field deserializers for values a web form may send as strings
mod lenient {
    use crate::store::build_plates::parse_filament_list;
    use crate::store::filament::MAX_TIMEOUT_SECONDS;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Value {
        Int(i64),
        Float(f64),
        Bool(bool),
        Text(String),
        Null,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Filaments {
        List(Vec<String>),
        Joined(String),
    }

    fn is_null_text(s: &str) -> bool {
        let s = s.trim();
        s.is_empty() || s.eq_ignore_ascii_case("null")
    }

    fn to_id<E: Error>(value: Value) -> Result<i64, E> {
        match value {
            Value::Int(i) => Ok(i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected an id, got {:?}", s))),
            _ => Err(E::custom("expected an id")),
        }
    }

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        to_id(Value::deserialize(d)?)
    }

    pub fn optional_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::Text(s) if is_null_text(&s) => Ok(None),
            other => to_id(other).map(Some),
        }
    }

    pub fn position<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let id = id(d)?;
        u32::try_from(id)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| D::Error::custom(format!("invalid extruder position {}", id)))
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Value::deserialize(d)? {
            Value::Int(i) => Ok(i as f64),
            Value::Float(f) => Ok(f),
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("expected a number, got {:?}", s))),
            _ => Err(D::Error::custom("expected a number")),
        }
    }

    pub fn seconds<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let n = number(d)?;
        if n.is_finite() && (0.0..=MAX_TIMEOUT_SECONDS as f64).contains(&n) {
            Ok(n as u64)
        } else {
            Err(D::Error::custom(format!("invalid timeout {}", n)))
        }
    }

    fn to_flag<E: Error>(value: Value) -> Result<bool, E> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(E::custom(format!("expected a flag, got {:?}", s))),
            },
            _ => Err(E::custom("expected a flag")),
        }
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        to_flag(Value::deserialize(d)?)
    }

    pub fn optional_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::Text(s) if is_null_text(&s) => Ok(None),
            other => to_flag(other).map(Some),
        }
    }

    pub fn filaments<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Filaments::deserialize(d)? {
            Filaments::List(list) => list
                .iter()
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect(),
            Filaments::Joined(joined) => parse_filament_list(&joined),
        })
    }
}

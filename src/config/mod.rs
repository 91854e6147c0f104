//! Settings file
//!
//! A JSON object; every field is optional and falls back to its default.
//! Besides the store location and first-run defaults it describes the
//! printer and loaded spools for hosts that have no live integration.

use crate::host::console::SpoolSnapshot;
use crate::host::PrinterProfile;
use crate::parser::TRAILER_LINES;
use crate::store::build_plates::COMMON_FILAMENTS;
use crate::store::{FilamentPolicy, Seed};
use crate::validator::ValidatorOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read settings {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultBuildPlate {
    pub name: String,
    pub compatible_filaments: Vec<String>,
}

impl Default for DefaultBuildPlate {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            compatible_filaments: COMMON_FILAMENTS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Holds the database file
    pub data_folder: PathBuf,
    pub trailer_lines: usize,
    pub default_nozzle_size: f64,
    pub default_build_plate: DefaultBuildPlate,
    pub enable_spool_checking: bool,
    /// Seconds
    pub spool_check_timeout: u64,
    pub reset_wait_state_each_run: bool,
    pub printer: PrinterProfile,
    /// Loaded spool per slot, `null` for an empty slot. `null` as a whole
    /// means no spool tracking.
    pub spools: Option<Vec<Option<SpoolSnapshot>>>,
}

impl Default for Settings {
    fn default() -> Self {
        let policy = FilamentPolicy::default();
        Self {
            data_folder: PathBuf::from("./nfv-data"),
            trailer_lines: TRAILER_LINES,
            default_nozzle_size: 0.4,
            default_build_plate: DefaultBuildPlate::default(),
            enable_spool_checking: policy.enable_spool_checking,
            spool_check_timeout: policy.timeout_seconds,
            reset_wait_state_each_run: true,
            printer: PrinterProfile::default(),
            spools: Some(Vec::new()),
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load `path` when given, the defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn seed(&self) -> Seed {
        Seed {
            nozzle_size: self.default_nozzle_size,
            build_plate_name: self.default_build_plate.name.clone(),
            build_plate_filaments: self.default_build_plate.compatible_filaments.clone(),
            policy: FilamentPolicy {
                enable_spool_checking: self.enable_spool_checking,
                timeout_seconds: self.spool_check_timeout,
            },
        }
    }

    pub fn validator_options(&self) -> ValidatorOptions {
        ValidatorOptions {
            trailer_lines: self.trailer_lines,
            reset_wait_state_each_run: self.reset_wait_state_each_run,
        }
    }
}

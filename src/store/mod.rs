//! SQLite backing store
//!
//! Every accessor opens its own connection and closes it when done; nothing
//! holds a transaction across calls. Seeding default rows retries a bounded
//! number of times when another connection has the database locked.

use log::{error, info, warn};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;

pub mod build_plates;
pub mod extruders;
pub mod filament;
pub mod nozzles;

pub use build_plates::BuildPlate;
pub use extruders::{Extruder, SyncReport};
pub use filament::FilamentPolicy;
pub use nozzles::Nozzle;

pub const DB_FILE: &str = "nozzle_filament_database.db";
pub const SEED_ATTEMPTS: u32 = 3;

/// Keys of the `current_selections` table
pub(crate) const SELECTION_BUILD_PLATE: &str = "build_plate";
pub(crate) const SELECTION_MULTI_TOOL_HEAD: &str = "multi_tool_head";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("could not create data folder {path}: {source}")]
    DataFolder {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("nozzle size {0} already exists")]
    DuplicateNozzle(f64),

    #[error("invalid nozzle size {0}")]
    InvalidNozzleSize(f64),

    #[error("nozzle {0} is still installed on an extruder")]
    NozzleInUse(i64),

    #[error("build plate name {0} already exists")]
    DuplicateBuildPlate(String),

    #[error("spool check timeout {0}s is out of range (0 to {max}s)", max = filament::MAX_TIMEOUT_SECONDS)]
    InvalidTimeout(u64),

    #[error("extruder position {0} already exists")]
    DuplicateExtruder(u32),

    #[error("no {what} with id {id}")]
    NotFound { what: &'static str, id: i64 },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Rows written on first start
#[derive(Debug, Clone)]
pub struct Seed {
    pub nozzle_size: f64,
    pub build_plate_name: String,
    pub build_plate_filaments: Vec<String>,
    pub policy: FilamentPolicy,
}

/// Handle to the database file; cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    retry_backoff: Duration,
}

impl Store {
    /// Open (creating if needed) the database in `data_folder` and make sure
    /// the tables exist.
    pub fn open(data_folder: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_folder).map_err(|source| StoreError::DataFolder {
            path: data_folder.display().to_string(),
            source,
        })?;

        let store = Self {
            path: data_folder.join(DB_FILE),
            retry_backoff: Duration::from_secs(1),
        };
        store.create_tables()?;
        Ok(store)
    }

    /// Override the pause between seeding attempts
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nozzles (id INTEGER PRIMARY KEY, size REAL UNIQUE);
             CREATE TABLE IF NOT EXISTS extruders (
                 id INTEGER PRIMARY KEY,
                 extruder_position INTEGER UNIQUE,
                 nozzle_id INTEGER
             );
             CREATE TABLE IF NOT EXISTS build_plates (
                 id INTEGER PRIMARY KEY,
                 name TEXT UNIQUE,
                 compatible_filaments TEXT
             );
             CREATE TABLE IF NOT EXISTS current_selections (id TEXT PRIMARY KEY, selection INTEGER);
             CREATE TABLE IF NOT EXISTS filament_data (id TEXT PRIMARY KEY, data INTEGER);",
        )?;
        Ok(())
    }

    /// Insert the default rows that are missing. Failures are logged and
    /// leave the store usable with whatever rows exist.
    pub fn seed(&self, seed: &Seed) {
        self.seed_row("nozzles", || {
            if self.list_nozzles()?.is_empty() {
                self.add_nozzle(seed.nozzle_size)?;
            }
            Ok(())
        });

        self.seed_row("build_plates", || {
            if self.list_build_plates()?.is_empty() {
                self.add_build_plate(&seed.build_plate_name, &seed.build_plate_filaments)?;
            }
            Ok(())
        });

        self.seed_row("current_selections", || {
            if self.selection(SELECTION_BUILD_PLATE)?.is_none() {
                if let Some(first) = self.list_build_plates()?.first() {
                    self.set_selection(SELECTION_BUILD_PLATE, Some(first.id))?;
                }
            }
            Ok(())
        });

        self.seed_row("filament_data", || self.seed_filament_policy(&seed.policy));
    }

    /// Run `insert` up to [`SEED_ATTEMPTS`] times while the database reports
    /// itself busy or locked. Returns whether the insert went through.
    pub(crate) fn seed_row(&self, table: &str, mut insert: impl FnMut() -> Result<()>) -> bool {
        for attempt in 1..=SEED_ATTEMPTS {
            match insert() {
                Ok(()) => return true,
                Err(e) if is_transient(&e) => {
                    warn!("Database operation on {} failed: {}", table, e);
                    if attempt < SEED_ATTEMPTS {
                        warn!("Retrying...");
                        thread::sleep(self.retry_backoff);
                    }
                }
                Err(e) => {
                    error!("Error adding default row to {}: {}", table, e);
                    return false;
                }
            }
        }
        error!(
            "Failed to insert row into {} after {} attempts. Plugin initialization may be incomplete.",
            table, SEED_ATTEMPTS
        );
        false
    }

    pub(crate) fn selection(&self, key: &str) -> Result<Option<i64>> {
        let conn = self.connect()?;
        let value = conn
            .query_row(
                "SELECT selection FROM current_selections WHERE id = ?1",
                params![key],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    pub(crate) fn set_selection(&self, key: &str, value: Option<i64>) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO current_selections (id, selection) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET selection = excluded.selection",
            params![key, value],
        )?;
        info!("selection {} set to {:?}", key, value);
        Ok(())
    }
}

fn is_transient(e: &StoreError) -> bool {
    match e {
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
            matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        }
        _ => false,
    }
}

use super::{Result, Store, StoreError};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

const ENABLE_SPOOL_CHECKING: &str = "enable_spool_checking";
const TIMEOUT: &str = "timeout";

/// Longest spool-switch wait that can be configured, one day
pub const MAX_TIMEOUT_SECONDS: u64 = 24 * 60 * 60;

/// Whether spool names are checked before a print, and how long to wait
/// for the operator to swap a spool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilamentPolicy {
    pub enable_spool_checking: bool,
    pub timeout_seconds: u64,
}

impl Default for FilamentPolicy {
    fn default() -> Self {
        Self {
            enable_spool_checking: true,
            timeout_seconds: 300,
        }
    }
}

fn read(conn: &Connection, key: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row("SELECT data FROM filament_data WHERE id = ?1", params![key], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .optional()
    .map(Option::flatten)
}

fn write(conn: &Connection, key: &str, value: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO filament_data (id, data) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        params![key, value],
    )?;
    Ok(())
}

impl Store {
    /// The stored policy; missing rows read as the defaults.
    pub fn filament_policy(&self) -> Result<FilamentPolicy> {
        let conn = self.connect()?;
        let defaults = FilamentPolicy::default();
        Ok(FilamentPolicy {
            enable_spool_checking: read(&conn, ENABLE_SPOOL_CHECKING)?
                .map_or(defaults.enable_spool_checking, |v| v != 0),
            timeout_seconds: read(&conn, TIMEOUT)?
                .map_or(defaults.timeout_seconds, |v| {
                    u64::try_from(v).unwrap_or(0).min(MAX_TIMEOUT_SECONDS)
                }),
        })
    }

    /// Write whichever policy rows do not exist yet
    pub fn seed_filament_policy(&self, policy: &FilamentPolicy) -> Result<()> {
        let conn = self.connect()?;
        if read(&conn, ENABLE_SPOOL_CHECKING)?.is_none() {
            write(&conn, ENABLE_SPOOL_CHECKING, i64::from(policy.enable_spool_checking))?;
        }
        if read(&conn, TIMEOUT)?.is_none() {
            write(&conn, TIMEOUT, clamp(policy.timeout_seconds))?;
        }
        Ok(())
    }

    pub fn set_spool_checking(&self, enabled: bool) -> Result<()> {
        write(&self.connect()?, ENABLE_SPOOL_CHECKING, i64::from(enabled))?;
        info!("spool checking {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn set_spool_check_timeout(&self, seconds: u64) -> Result<()> {
        if seconds > MAX_TIMEOUT_SECONDS {
            return Err(StoreError::InvalidTimeout(seconds));
        }
        write(&self.connect()?, TIMEOUT, clamp(seconds))?;
        info!("spool check timeout set to {}s", seconds);
        Ok(())
    }
}

fn clamp(seconds: u64) -> i64 {
    i64::try_from(seconds.min(MAX_TIMEOUT_SECONDS)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::temp_store;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_rows_read_as_defaults() {
        let (_dir, store) = temp_store();
        assert_eq!(store.filament_policy().unwrap(), FilamentPolicy::default());
    }

    #[test]
    fn test_seed_keeps_existing_rows() {
        let (_dir, store) = temp_store();
        store.set_spool_check_timeout(30).unwrap();
        store
            .seed_filament_policy(&FilamentPolicy { enable_spool_checking: false, timeout_seconds: 600 })
            .unwrap();

        assert_eq!(
            store.filament_policy().unwrap(),
            FilamentPolicy { enable_spool_checking: false, timeout_seconds: 30 }
        );
    }

    #[test]
    fn test_updates() {
        let (_dir, store) = temp_store();
        store.seed_filament_policy(&FilamentPolicy::default()).unwrap();
        store.set_spool_checking(false).unwrap();
        store.set_spool_check_timeout(2).unwrap();

        let policy = store.filament_policy().unwrap();
        assert!(!policy.enable_spool_checking);
        assert_eq!(policy.timeout_seconds, 2);
    }

    #[test]
    fn test_timeout_out_of_range() {
        let (_dir, store) = temp_store();
        store.set_spool_check_timeout(MAX_TIMEOUT_SECONDS).unwrap();
        assert!(matches!(
            store.set_spool_check_timeout(MAX_TIMEOUT_SECONDS + 1),
            Err(StoreError::InvalidTimeout(_))
        ));
        assert!(matches!(
            store.set_spool_check_timeout(u64::MAX),
            Err(StoreError::InvalidTimeout(_))
        ));
        assert_eq!(store.filament_policy().unwrap().timeout_seconds, MAX_TIMEOUT_SECONDS);
    }

    #[test]
    fn test_oversized_stored_timeout_reads_capped() {
        let (_dir, store) = temp_store();
        write(&store.connect().unwrap(), TIMEOUT, i64::MAX).unwrap();
        assert_eq!(store.filament_policy().unwrap().timeout_seconds, MAX_TIMEOUT_SECONDS);

        store
            .seed_filament_policy(&FilamentPolicy { enable_spool_checking: true, timeout_seconds: u64::MAX })
            .unwrap();
        assert_eq!(store.filament_policy().unwrap().timeout_seconds, MAX_TIMEOUT_SECONDS);
    }
}

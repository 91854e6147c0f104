use super::{Result, Store, StoreError};
use log::info;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// A nozzle the operator owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nozzle {
    pub id: i64,
    /// Diameter in mm
    pub size: f64,
}

impl Store {
    pub fn list_nozzles(&self) -> Result<Vec<Nozzle>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, size FROM nozzles ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Nozzle {
                id: row.get(0)?,
                size: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Add a nozzle size; sizes are unique.
    pub fn add_nozzle(&self, size: f64) -> Result<i64> {
        if !size.is_finite() || size <= 0.0 {
            return Err(StoreError::InvalidNozzleSize(size));
        }

        let conn = self.connect()?;
        let existing: Option<i64> = conn
            .query_row("SELECT id FROM nozzles WHERE size = ?1", params![size], |row| row.get(0))
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::DuplicateNozzle(size));
        }

        conn.execute("INSERT INTO nozzles (size) VALUES (?1)", params![size])?;
        let id = conn.last_insert_rowid();
        info!("added {}mm nozzle as id {}", size, id);
        Ok(id)
    }

    pub fn nozzle_size(&self, id: i64) -> Result<Option<f64>> {
        let conn = self.connect()?;
        let size = conn
            .query_row("SELECT size FROM nozzles WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(size)
    }

    /// Remove a nozzle that no extruder has installed.
    pub fn remove_nozzle(&self, id: i64) -> Result<()> {
        let conn = self.connect()?;
        let in_use: i64 = conn.query_row(
            "SELECT COUNT(*) FROM extruders WHERE nozzle_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if in_use > 0 {
            return Err(StoreError::NozzleInUse(id));
        }

        let removed = conn.execute("DELETE FROM nozzles WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StoreError::NotFound { what: "nozzle", id });
        }
        info!("removed nozzle {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PrinterProfile;
    use crate::store::tests::temp_store;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_and_list() {
        let (_dir, store) = temp_store();
        let a = store.add_nozzle(0.4).unwrap();
        let b = store.add_nozzle(0.6).unwrap();

        assert_eq!(
            store.list_nozzles().unwrap(),
            vec![Nozzle { id: a, size: 0.4 }, Nozzle { id: b, size: 0.6 }]
        );
        assert_eq!(store.nozzle_size(b).unwrap(), Some(0.6));
        assert_eq!(store.nozzle_size(99).unwrap(), None);
    }

    #[test]
    fn test_sizes_are_unique() {
        let (_dir, store) = temp_store();
        store.add_nozzle(0.4).unwrap();
        assert!(matches!(store.add_nozzle(0.4), Err(StoreError::DuplicateNozzle(_))));
        assert!(matches!(store.add_nozzle(0.0), Err(StoreError::InvalidNozzleSize(_))));
        assert!(matches!(store.add_nozzle(f64::NAN), Err(StoreError::InvalidNozzleSize(_))));
    }

    #[test]
    fn test_remove_refuses_installed_nozzle() {
        let (_dir, store) = temp_store();
        let installed = store.add_nozzle(0.4).unwrap();
        let spare = store.add_nozzle(0.8).unwrap();
        store.sync_extruders(&PrinterProfile::default()).unwrap();
        store.update_extruder(1, installed, &PrinterProfile::default()).unwrap();

        assert!(matches!(store.remove_nozzle(installed), Err(StoreError::NozzleInUse(_))));
        store.remove_nozzle(spare).unwrap();
        assert!(matches!(
            store.remove_nozzle(spare),
            Err(StoreError::NotFound { what: "nozzle", .. })
        ));
    }
}

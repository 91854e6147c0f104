use super::{Result, Store, StoreError, SELECTION_MULTI_TOOL_HEAD};
use crate::host::PrinterProfile;
use log::{debug, info};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A tool position and the nozzle installed on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extruder {
    pub id: i64,
    /// 1-based
    pub extruder_position: u32,
    pub nozzle_id: Option<i64>,
}

impl Extruder {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            extruder_position: row.get(1)?,
            nozzle_id: row.get(2)?,
        })
    }
}

/// What [`Store::sync_extruders`] changed, by extruder position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub added: Vec<u32>,
    pub removed: Vec<u32>,
    pub repointed: Vec<u32>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.repointed.is_empty()
    }
}

impl Store {
    pub fn list_extruders(&self) -> Result<Vec<Extruder>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, extruder_position, nozzle_id FROM extruders ORDER BY extruder_position",
        )?;
        let rows = stmt.query_map([], Extruder::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn extruder(&self, position: u32) -> Result<Option<Extruder>> {
        let conn = self.connect()?;
        let extruder = conn
            .query_row(
                "SELECT id, extruder_position, nozzle_id FROM extruders WHERE extruder_position = ?1",
                params![position],
                Extruder::from_row,
            )
            .optional()?;
        Ok(extruder)
    }

    pub fn nozzle_id_for_extruder(&self, position: u32) -> Result<Option<i64>> {
        Ok(self.extruder(position)?.and_then(|e| e.nozzle_id))
    }

    /// Size of the nozzle installed at `position`, if both the extruder and
    /// the nozzle it points at exist.
    pub fn nozzle_size_for_extruder(&self, position: u32) -> Result<Option<f64>> {
        match self.nozzle_id_for_extruder(position)? {
            Some(id) => self.nozzle_size(id),
            None => Ok(None),
        }
    }

    /// Whether each extruder carries its own nozzle. A stored override wins
    /// over what the printer profile implies.
    pub fn is_multi_tool_head(&self, profile: &PrinterProfile) -> Result<bool> {
        Ok(match self.selection(SELECTION_MULTI_TOOL_HEAD)? {
            Some(flag) => flag != 0,
            None => profile.is_multi_tool_head(),
        })
    }

    /// Store or clear the multi-tool-head override
    pub fn set_multi_tool_head(&self, enabled: Option<bool>) -> Result<()> {
        self.set_selection(SELECTION_MULTI_TOOL_HEAD, enabled.map(i64::from))
    }

    /// Add an extruder. On a shared-nozzle printer the new row takes the
    /// nozzle of position 1 regardless of `nozzle_id`.
    pub fn add_extruder(
        &self,
        nozzle_id: Option<i64>,
        position: u32,
        profile: &PrinterProfile,
    ) -> Result<i64> {
        if self.extruder(position)?.is_some() {
            return Err(StoreError::DuplicateExtruder(position));
        }

        let nozzle_id = if self.is_multi_tool_head(profile)? || position == 1 {
            nozzle_id
        } else {
            self.nozzle_id_for_extruder(1)?.or(nozzle_id)
        };

        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO extruders (extruder_position, nozzle_id) VALUES (?1, ?2)",
            params![position, nozzle_id],
        )?;
        let id = conn.last_insert_rowid();
        info!("added extruder {} with nozzle {:?}", position, nozzle_id);
        Ok(id)
    }

    pub fn remove_extruder(&self, position: u32) -> Result<()> {
        let conn = self.connect()?;
        let removed =
            conn.execute("DELETE FROM extruders WHERE extruder_position = ?1", params![position])?;
        if removed == 0 {
            return Err(StoreError::NotFound { what: "extruder", id: position.into() });
        }
        info!("removed extruder {}", position);
        Ok(())
    }

    /// Install `nozzle_id` at `position`. On a shared-nozzle printer every
    /// other extruder follows.
    pub fn update_extruder(
        &self,
        position: u32,
        nozzle_id: i64,
        profile: &PrinterProfile,
    ) -> Result<()> {
        if self.nozzle_size(nozzle_id)?.is_none() {
            return Err(StoreError::NotFound { what: "nozzle", id: nozzle_id });
        }

        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE extruders SET nozzle_id = ?1 WHERE extruder_position = ?2",
            params![nozzle_id, position],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound { what: "extruder", id: position.into() });
        }
        drop(conn);

        if !self.is_multi_tool_head(profile)? {
            let conn = self.connect()?;
            conn.execute(
                "UPDATE extruders SET nozzle_id = ?1 WHERE extruder_position != ?2",
                params![nozzle_id, position],
            )?;
        }
        info!("extruder {} now uses nozzle {}", position, nozzle_id);
        Ok(())
    }

    /// Bring the extruder rows in line with the printer profile: one row per
    /// position `1..=extruder_count`, and on a shared-nozzle printer every
    /// row on the nozzle of position 1. Running it twice changes nothing the
    /// second time.
    pub fn sync_extruders(&self, profile: &PrinterProfile) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let count = u32::try_from(profile.extruder_count).unwrap_or(u32::MAX);
        let existing = self.list_extruders()?;
        debug!("{} extruders in database, {} in profile", existing.len(), count);

        for extruder in existing.iter().filter(|e| e.extruder_position > count) {
            self.remove_extruder(extruder.extruder_position)?;
            report.removed.push(extruder.extruder_position);
        }

        let default_nozzle = self.list_nozzles()?.first().map(|n| n.id);
        for position in 1..=count {
            if !existing.iter().any(|e| e.extruder_position == position) {
                self.add_extruder(default_nozzle, position, profile)?;
                report.added.push(position);
            }
        }

        if !self.is_multi_tool_head(profile)? {
            let first = self.nozzle_id_for_extruder(1)?;
            let conn = self.connect()?;
            for extruder in self.list_extruders()? {
                if extruder.nozzle_id != first {
                    conn.execute(
                        "UPDATE extruders SET nozzle_id = ?1 WHERE id = ?2",
                        params![first, extruder.id],
                    )?;
                    report.repointed.push(extruder.extruder_position);
                }
            }
        }

        if !report.is_empty() {
            info!("synced extruders to profile: {:?}", report);
        }
        Ok(report)
    }
}

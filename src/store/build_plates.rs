use super::{Result, Store, StoreError, SELECTION_BUILD_PLATE};
use log::{info, warn};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Filament types a fresh install trusts on its default plate
pub const COMMON_FILAMENTS: &[&str] = &[
    "PLA", "PETG", "ASA", "ABS", "TPU", "Nylon", "PC", "Wood", "Metal", "Carbon Fiber", "PVA",
    "HIPS", "PETT", "PP", "PEI", "POM", "PMMA", "PBT", "PES", "PC-ABS", "PPO", "PEEK", "PEKK",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPlate {
    pub id: i64,
    pub name: String,
    pub compatible_filaments: Vec<String>,
}

impl BuildPlate {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let filaments: Option<String> = row.get(2)?;
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            compatible_filaments: parse_filament_list(filaments.as_deref().unwrap_or("")),
        })
    }

    /// Exact, case-sensitive membership
    pub fn accepts(&self, filament_type: &str) -> bool {
        self.compatible_filaments.iter().any(|f| f == filament_type)
    }
}

/// Split a stored `PLA,PETG` list. Entries are trimmed and empties dropped.
pub fn parse_filament_list(stored: &str) -> Vec<String> {
    stored
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn join_filament_list(filaments: &[String]) -> String {
    filaments
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

impl Store {
    pub fn list_build_plates(&self) -> Result<Vec<BuildPlate>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT id, name, compatible_filaments FROM build_plates ORDER BY id")?;
        let rows = stmt.query_map([], BuildPlate::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn build_plate(&self, id: i64) -> Result<Option<BuildPlate>> {
        let conn = self.connect()?;
        let plate = conn
            .query_row(
                "SELECT id, name, compatible_filaments FROM build_plates WHERE id = ?1",
                params![id],
                BuildPlate::from_row,
            )
            .optional()?;
        Ok(plate)
    }

    /// Add a plate; names are unique.
    pub fn add_build_plate(&self, name: &str, compatible_filaments: &[String]) -> Result<i64> {
        let conn = self.connect()?;
        let existing: Option<i64> = conn
            .query_row("SELECT id FROM build_plates WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::DuplicateBuildPlate(name.to_string()));
        }

        conn.execute(
            "INSERT INTO build_plates (name, compatible_filaments) VALUES (?1, ?2)",
            params![name, join_filament_list(compatible_filaments)],
        )?;
        let id = conn.last_insert_rowid();
        info!("added build plate {} as id {}", name, id);
        Ok(id)
    }

    pub fn update_build_plate(
        &self,
        id: i64,
        name: &str,
        compatible_filaments: &[String],
    ) -> Result<()> {
        let conn = self.connect()?;
        let clash: Option<i64> = conn
            .query_row(
                "SELECT id FROM build_plates WHERE name = ?1 AND id != ?2",
                params![name, id],
                |row| row.get(0),
            )
            .optional()?;
        if clash.is_some() {
            return Err(StoreError::DuplicateBuildPlate(name.to_string()));
        }

        let updated = conn.execute(
            "UPDATE build_plates SET name = ?1, compatible_filaments = ?2 WHERE id = ?3",
            params![name, join_filament_list(compatible_filaments), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound { what: "build plate", id });
        }
        Ok(())
    }

    pub fn select_build_plate(&self, id: i64) -> Result<()> {
        if self.build_plate(id)?.is_none() {
            return Err(StoreError::NotFound { what: "build plate", id });
        }
        self.set_selection(SELECTION_BUILD_PLATE, Some(id))
    }

    pub fn current_build_plate_id(&self) -> Result<Option<i64>> {
        self.selection(SELECTION_BUILD_PLATE)
    }

    /// The selected plate, or `None` when nothing is selected or the
    /// selection points at a deleted row.
    pub fn current_build_plate(&self) -> Result<Option<BuildPlate>> {
        match self.current_build_plate_id()? {
            Some(id) => self.build_plate(id),
            None => Ok(None),
        }
    }

    /// Remove a plate. If it was the current one the selection moves to the
    /// oldest remaining plate, or is cleared when none are left.
    pub fn remove_build_plate(&self, id: i64) -> Result<()> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM build_plates WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StoreError::NotFound { what: "build plate", id });
        }
        drop(conn);

        if self.current_build_plate_id()? == Some(id) {
            let next = self.list_build_plates()?.first().map(|p| p.id);
            if next.is_none() {
                warn!("removed the last build plate; no plate is selected");
            }
            self.set_selection(SELECTION_BUILD_PLATE, next)?;
        }
        Ok(())
    }
}

//! Reading, history and manual flag queries.
//!
//! Auto flags and manual flags are written by separate statements against
//! separate storage, so replacing one list can never clobber the other.

use super::{json_column_error, MeterStore};
use crate::{
    error::MeterResult,
    flag::{AutoFlag, ManualFlag},
    history::HistoryPoint,
    reading::Reading,
};
use rusqlite::{params, OptionalExtension};

const READING_COLUMNS: &str = "reading_id, cycle_id, meter_id, reading_value, previous_reading,
                               consumption, reading_date, captured_by, notes, flags,
                               review_status, estimated_value, late, reviewed_by,
                               reviewed_at, admin_notes";

impl MeterStore {
    // ── Reading ────────────────────────────────────────────────

    pub fn insert_reading(&self, reading: &Reading) -> MeterResult<()> {
        let flags_json = serde_json::to_string(&reading.flags)?;
        self.conn.execute(
            "INSERT INTO reading (
                reading_id, cycle_id, meter_id, reading_value, previous_reading,
                consumption, reading_date, captured_by, notes, flags,
                review_status, estimated_value, late, reviewed_by,
                reviewed_at, admin_notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                reading.id,
                reading.cycle_id,
                reading.meter_id,
                reading.reading_value,
                reading.previous_reading,
                reading.consumption,
                reading.reading_date,
                reading.captured_by,
                reading.notes,
                flags_json,
                reading.review_status,
                reading.estimated_value,
                reading.late,
                reading.reviewed_by,
                reading.reviewed_at,
                reading.admin_notes,
            ],
        )?;
        for flag in &reading.manual_flags {
            self.insert_manual_flag(&reading.id, flag)?;
        }
        Ok(())
    }

    pub fn get_reading(&self, reading_id: &str) -> MeterResult<Option<Reading>> {
        let reading = self
            .conn
            .query_row(
                &format!("SELECT {READING_COLUMNS} FROM reading WHERE reading_id = ?1"),
                params![reading_id],
                Self::map_reading_row,
            )
            .optional()?;
        match reading {
            Some(mut r) => {
                r.manual_flags = self.manual_flags_for_reading(&r.id)?;
                Ok(Some(r))
            }
            None => Ok(None),
        }
    }

    pub fn readings_for_cycle(&self, cycle_id: &str) -> MeterResult<Vec<Reading>> {
        self.query_readings("cycle_id", cycle_id)
    }

    /// Replace the auto-flag list. Manual flags are not touched.
    pub fn update_reading_flags(&self, reading_id: &str, flags: &[AutoFlag]) -> MeterResult<bool> {
        let flags_json = serde_json::to_string(flags)?;
        let changed = self.conn.execute(
            "UPDATE reading SET flags = ?1 WHERE reading_id = ?2",
            params![flags_json, reading_id],
        )?;
        Ok(changed > 0)
    }

    /// Persist the review fields (and the consumption an estimate overrides).
    pub fn update_reading_review(&self, reading: &Reading) -> MeterResult<()> {
        self.conn.execute(
            "UPDATE reading
             SET review_status = ?1, estimated_value = ?2, consumption = ?3,
                 reviewed_by = ?4, reviewed_at = ?5, admin_notes = ?6
             WHERE reading_id = ?7",
            params![
                reading.review_status,
                reading.estimated_value,
                reading.consumption,
                reading.reviewed_by,
                reading.reviewed_at,
                reading.admin_notes,
                reading.id,
            ],
        )?;
        Ok(())
    }

    /// Past readings of a meter that carry a consumption, most recent first.
    pub fn consumption_history(&self, meter_id: &str) -> MeterResult<Vec<HistoryPoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT reading_id, reading_date, consumption, rowid
             FROM reading
             WHERE meter_id = ?1 AND consumption IS NOT NULL
             ORDER BY reading_date DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map(params![meter_id], |row| {
                Ok(HistoryPoint {
                    reading_id: row.get(0)?,
                    reading_date: row.get(1)?,
                    consumption: row.get(2)?,
                    seq: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Capture order of a stored reading, `None` if it is not stored.
    pub fn reading_seq(&self, reading_id: &str) -> MeterResult<Option<i64>> {
        let seq = self
            .conn
            .query_row(
                "SELECT rowid FROM reading WHERE reading_id = ?1",
                params![reading_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq)
    }

    pub fn reading_exists(&self, reading_id: &str) -> MeterResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM reading WHERE reading_id = ?1)",
            params![reading_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // ── Manual flags ───────────────────────────────────────────

    pub fn insert_manual_flag(&self, reading_id: &str, flag: &ManualFlag) -> MeterResult<()> {
        self.conn.execute(
            "INSERT INTO manual_flag
             (reading_id, flag_type, severity, message, description, added_by, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                reading_id,
                flag.flag_type,
                flag.severity,
                flag.message,
                flag.description,
                flag.added_by,
                flag.added_at,
            ],
        )?;
        Ok(())
    }

    /// Manual flags in the order they were added.
    pub fn manual_flags_for_reading(&self, reading_id: &str) -> MeterResult<Vec<ManualFlag>> {
        let mut stmt = self.conn.prepare(
            "SELECT flag_type, severity, message, description, added_by, added_at
             FROM manual_flag WHERE reading_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![reading_id], |row| {
                Ok(ManualFlag {
                    flag_type: row.get(0)?,
                    severity: row.get(1)?,
                    message: row.get(2)?,
                    description: row.get(3)?,
                    added_by: row.get(4)?,
                    added_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete the manual flag at position `index` (0-based, insertion order).
    /// Returns false when there is no flag at that position.
    pub fn delete_manual_flag_at(&self, reading_id: &str, index: usize) -> MeterResult<bool> {
        let Ok(offset) = i64::try_from(index) else {
            return Ok(false);
        };
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM manual_flag WHERE reading_id = ?1
                 ORDER BY id ASC LIMIT 1 OFFSET ?2",
                params![reading_id, offset],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => {
                self.conn
                    .execute("DELETE FROM manual_flag WHERE id = ?1", params![id])?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ── Helpers ────────────────────────────────────────────────

    fn query_readings(&self, column: &str, value: &str) -> MeterResult<Vec<Reading>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {READING_COLUMNS} FROM reading
             WHERE {column} = ?1
             ORDER BY reading_date ASC, rowid ASC"
        ))?;
        let mut readings = stmt
            .query_map(params![value], Self::map_reading_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for r in &mut readings {
            r.manual_flags = self.manual_flags_for_reading(&r.id)?;
        }
        Ok(readings)
    }

    fn map_reading_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reading> {
        let flags_json: String = row.get(9)?;
        let flags: Vec<AutoFlag> =
            serde_json::from_str(&flags_json).map_err(|e| json_column_error(9, e))?;
        Ok(Reading {
            id: row.get(0)?,
            cycle_id: row.get(1)?,
            meter_id: row.get(2)?,
            reading_value: row.get(3)?,
            previous_reading: row.get(4)?,
            consumption: row.get(5)?,
            reading_date: row.get(6)?,
            captured_by: row.get(7)?,
            notes: row.get(8)?,
            flags,
            manual_flags: Vec::new(),
            review_status: row.get(10)?,
            estimated_value: row.get(11)?,
            late: row.get(12)?,
            reviewed_by: row.get(13)?,
            reviewed_at: row.get(14)?,
            admin_notes: row.get(15)?,
        })
    }
}

//! Unit and meter queries.

use super::MeterStore;
use crate::{
    error::MeterResult,
    meter::{Meter, MeterType, Unit, UnitStatus},
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

const METER_COLUMNS: &str = "meter_id, scheme_id, unit_id, meter_type, meter_number,
                             last_reading, last_reading_date, status";

impl MeterStore {
    // ── Unit ───────────────────────────────────────────────────

    pub fn insert_unit(&self, unit: &Unit) -> MeterResult<()> {
        self.conn.execute(
            "INSERT INTO unit (unit_id, scheme_id, unit_number, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![unit.id, unit.scheme_id, unit.unit_number, unit.status],
        )?;
        Ok(())
    }

    pub fn get_unit(&self, unit_id: &str) -> MeterResult<Option<Unit>> {
        let unit = self
            .conn
            .query_row(
                "SELECT unit_id, scheme_id, unit_number, status FROM unit WHERE unit_id = ?1",
                params![unit_id],
                |row| {
                    Ok(Unit {
                        id: row.get(0)?,
                        scheme_id: row.get(1)?,
                        unit_number: row.get(2)?,
                        status: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(unit)
    }

    pub fn set_unit_status(&self, unit_id: &str, status: UnitStatus) -> MeterResult<bool> {
        let changed = self.conn.execute(
            "UPDATE unit SET status = ?1 WHERE unit_id = ?2",
            params![status, unit_id],
        )?;
        Ok(changed > 0)
    }

    // ── Meter ──────────────────────────────────────────────────

    pub fn insert_meter(&self, meter: &Meter) -> MeterResult<()> {
        self.conn.execute(
            "INSERT INTO meter (meter_id, scheme_id, unit_id, meter_type, meter_number,
                                last_reading, last_reading_date, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                meter.id,
                meter.scheme_id,
                meter.unit_id,
                meter.meter_type,
                meter.meter_number,
                meter.last_reading,
                meter.last_reading_date,
                meter.status,
            ],
        )?;
        Ok(())
    }

    pub fn get_meter(&self, meter_id: &str) -> MeterResult<Option<Meter>> {
        let meter = self
            .conn
            .query_row(
                &format!("SELECT {METER_COLUMNS} FROM meter WHERE meter_id = ?1"),
                params![meter_id],
                Self::map_meter_row,
            )
            .optional()?;
        Ok(meter)
    }

    /// Meters of a scheme, optionally restricted to one type, by meter number.
    pub fn meters_for_scheme(
        &self,
        scheme_id: &str,
        meter_type: Option<MeterType>,
    ) -> MeterResult<Vec<Meter>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {METER_COLUMNS} FROM meter
             WHERE scheme_id = ?1 AND (?2 IS NULL OR meter_type = ?2)
             ORDER BY meter_number ASC, meter_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![scheme_id, meter_type], Self::map_meter_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Advance the meter's authoritative previous value after a capture.
    pub fn update_meter_last_reading(
        &self,
        meter_id: &str,
        value: f64,
        date: NaiveDate,
    ) -> MeterResult<()> {
        self.conn.execute(
            "UPDATE meter SET last_reading = ?1, last_reading_date = ?2 WHERE meter_id = ?3",
            params![value, date, meter_id],
        )?;
        Ok(())
    }

    fn map_meter_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Meter> {
        Ok(Meter {
            id: row.get(0)?,
            scheme_id: row.get(1)?,
            unit_id: row.get(2)?,
            meter_type: row.get(3)?,
            meter_number: row.get(4)?,
            last_reading: row.get(5)?,
            last_reading_date: row.get(6)?,
            status: row.get(7)?,
        })
    }
}

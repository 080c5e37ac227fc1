//! Billing cycle queries.

use super::MeterStore;
use crate::{
    cycle::{Cycle, CycleStatus},
    error::MeterResult,
};
use rusqlite::{params, OptionalExtension};

impl MeterStore {
    pub fn insert_cycle(&self, cycle: &Cycle) -> MeterResult<()> {
        self.conn.execute(
            "INSERT INTO cycle (cycle_id, scheme_id, start_date, end_date, status, closed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                cycle.id,
                cycle.scheme_id,
                cycle.start_date,
                cycle.end_date,
                cycle.status,
                cycle.closed_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_cycle(&self, cycle_id: &str) -> MeterResult<Option<Cycle>> {
        let cycle = self
            .conn
            .query_row(
                "SELECT cycle_id, scheme_id, start_date, end_date, status, closed_at
                 FROM cycle WHERE cycle_id = ?1",
                params![cycle_id],
                Self::map_cycle_row,
            )
            .optional()?;
        Ok(cycle)
    }

    /// Cycles of a scheme, optionally filtered by status, oldest first.
    pub fn cycles_for_scheme(
        &self,
        scheme_id: &str,
        status: Option<CycleStatus>,
    ) -> MeterResult<Vec<Cycle>> {
        let mut stmt = self.conn.prepare(
            "SELECT cycle_id, scheme_id, start_date, end_date, status, closed_at
             FROM cycle
             WHERE scheme_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY start_date ASC, cycle_id ASC",
        )?;
        let rows = stmt
            .query_map(params![scheme_id, status], Self::map_cycle_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Persist the status transition made on a `Cycle`.
    pub fn update_cycle_status(&self, cycle: &Cycle) -> MeterResult<()> {
        self.conn.execute(
            "UPDATE cycle SET status = ?1, closed_at = ?2 WHERE cycle_id = ?3",
            params![cycle.status, cycle.closed_at, cycle.id],
        )?;
        Ok(())
    }

    fn map_cycle_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Cycle> {
        Ok(Cycle {
            id: row.get(0)?,
            scheme_id: row.get(1)?,
            start_date: row.get(2)?,
            end_date: row.get(3)?,
            status: row.get(4)?,
            closed_at: row.get(5)?,
        })
    }
}

//! Billing cycles.
//!
//! RULE: closing a cycle is terminal. There is no reopen.
//! Readings may still be captured against a closed cycle; they are
//! marked late and it is up to the workflow layer to decide what that means.

use crate::{
    error::{MeterError, MeterResult},
    types::{CycleId, SchemeId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    Open,
    Closed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cycle {
    pub id: CycleId,
    pub scheme_id: SchemeId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: CycleStatus,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Cycle {
    pub fn open(id: CycleId, scheme_id: SchemeId, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            id,
            scheme_id,
            start_date,
            end_date,
            status: CycleStatus::Open,
            closed_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == CycleStatus::Closed
    }

    /// OPEN → CLOSED. Fails if the cycle was already closed.
    pub fn close(&mut self, at: DateTime<Utc>) -> MeterResult<()> {
        if self.is_closed() {
            return Err(MeterError::CycleAlreadyClosed {
                cycle_id: self.id.clone(),
            });
        }
        self.status = CycleStatus::Closed;
        self.closed_at = Some(at);
        Ok(())
    }
}

//! Meters and the units they are attached to.
//!
//! A scheme should carry exactly one BULK meter; every other meter is a UNIT
//! meter linked to an occupiable unit. The single-bulk rule is a soft
//! invariant surfaced by `health::scheme_health`, never enforced on insert.

use crate::types::{MeterId, SchemeId, UnitId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeterType {
    Bulk,
    Unit,
}

impl MeterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bulk => "BULK",
            Self::Unit => "UNIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BULK" => Some(Self::Bulk),
            "UNIT" => Some(Self::Unit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeterStatus {
    Active,
    Inactive,
    Replaced,
}

impl MeterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Replaced => "REPLACED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "INACTIVE" => Some(Self::Inactive),
            "REPLACED" => Some(Self::Replaced),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meter {
    pub id: MeterId,
    pub scheme_id: SchemeId,
    pub unit_id: Option<UnitId>,
    pub meter_type: MeterType,
    pub meter_number: String,
    /// Authoritative "previous" value for the next capture.
    /// `None` until the first reading is saved.
    pub last_reading: Option<f64>,
    pub last_reading_date: Option<NaiveDate>,
    pub status: MeterStatus,
}

impl Meter {
    pub fn new(
        id: MeterId,
        scheme_id: SchemeId,
        unit_id: Option<UnitId>,
        meter_type: MeterType,
        meter_number: &str,
    ) -> Self {
        Self {
            id,
            scheme_id,
            unit_id,
            meter_type,
            meter_number: meter_number.to_string(),
            last_reading: None,
            last_reading_date: None,
            status: MeterStatus::Active,
        }
    }

    pub fn with_last_reading(mut self, value: f64, date: Option<NaiveDate>) -> Self {
        self.last_reading = Some(value);
        self.last_reading_date = date;
        self
    }

    /// The meter as it looked when a reading with `previous_reading` was
    /// captured. Used when re-validating a stored reading, since the live
    /// `last_reading` has since moved on to that reading's own value.
    pub fn as_of_capture(&self, previous_reading: Option<f64>) -> Self {
        Self {
            last_reading: previous_reading,
            ..self.clone()
        }
    }

    pub fn is_bulk(&self) -> bool {
        self.meter_type == MeterType::Bulk
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Occupied,
    Vacant,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Occupied => "OCCUPIED",
            Self::Vacant => "VACANT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OCCUPIED" => Some(Self::Occupied),
            "VACANT" => Some(Self::Vacant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    pub id: UnitId,
    pub scheme_id: SchemeId,
    pub unit_number: String,
    pub status: UnitStatus,
}

//! Audit events.
//!
//! RULE: every state change the engine makes is recorded here.
//! Events are append-only; nothing reads them back to drive behaviour.

use crate::{
    flag::Severity,
    types::{CycleId, EntityId, MeterId, ReadingId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Variants are added over time, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeterEvent {
    ReadingCaptured {
        reading_id: ReadingId,
        meter_id: MeterId,
        cycle_id: CycleId,
        consumption: Option<f64>,
        flag_count: usize,
        late: bool,
    },
    ReadingRevalidated {
        reading_id: ReadingId,
        flag_count: usize,
    },
    ManualFlagAdded {
        reading_id: ReadingId,
        flag_type: String,
        added_by: String,
    },
    ManualFlagRemoved {
        reading_id: ReadingId,
        index: usize,
    },
    ReviewRecorded {
        reading_id: ReadingId,
        review_status: String,
        reviewed_by: String,
    },
    CycleClosed {
        cycle_id: CycleId,
    },
    BulkMismatchDetected {
        cycle_id: CycleId,
        mismatch_percent: f64,
        severity: Severity,
    },
}

impl MeterEvent {
    /// Stable name for the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ReadingCaptured { .. } => "reading_captured",
            Self::ReadingRevalidated { .. } => "reading_revalidated",
            Self::ManualFlagAdded { .. } => "manual_flag_added",
            Self::ManualFlagRemoved { .. } => "manual_flag_removed",
            Self::ReviewRecorded { .. } => "review_recorded",
            Self::CycleClosed { .. } => "cycle_closed",
            Self::BulkMismatchDetected { .. } => "bulk_mismatch_detected",
        }
    }

    /// The record the event is about.
    pub fn subject_id(&self) -> &EntityId {
        match self {
            Self::ReadingCaptured { reading_id, .. }
            | Self::ReadingRevalidated { reading_id, .. }
            | Self::ManualFlagAdded { reading_id, .. }
            | Self::ManualFlagRemoved { reading_id, .. }
            | Self::ReviewRecorded { reading_id, .. } => reading_id,
            Self::CycleClosed { cycle_id } | Self::BulkMismatchDetected { cycle_id, .. } => cycle_id,
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub subject_id: EntityId,
    pub event_type: String,
    pub payload: String, // JSON-serialized MeterEvent
    pub recorded_at: DateTime<Utc>,
}

impl EventLogEntry {
    pub fn from_event(event: &MeterEvent, at: DateTime<Utc>) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            subject_id: event.subject_id().clone(),
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(event)?,
            recorded_at: at,
        })
    }
}

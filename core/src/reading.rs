//! Meter readings and their review lifecycle.

use crate::{
    consumption::calculate_consumption,
    error::{MeterError, MeterResult},
    flag::{merge_flags, AutoFlag, ManualFlag, TaggedFlag},
    types::{new_id, CycleId, MeterId, ReadingId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Estimated,
    SiteVisit,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Estimated => "estimated",
            Self::SiteVisit => "site-visit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "estimated" => Some(Self::Estimated),
            "site-visit" => Some(Self::SiteVisit),
            _ => None,
        }
    }
}

/// Outcome an administrator records against a flagged reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ReviewOutcome {
    Pending,
    Approved,
    SiteVisit,
    Estimated { value: f64 },
}

impl ReviewOutcome {
    pub fn status(&self) -> ReviewStatus {
        match self {
            Self::Pending => ReviewStatus::Pending,
            Self::Approved => ReviewStatus::Approved,
            Self::SiteVisit => ReviewStatus::SiteVisit,
            Self::Estimated { .. } => ReviewStatus::Estimated,
        }
    }
}

/// A candidate reading as submitted by the capture surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingInput {
    pub cycle_id: CycleId,
    pub meter_id: MeterId,
    pub reading_value: f64,
    pub reading_date: NaiveDate,
    #[serde(default)]
    pub captured_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub id: ReadingId,
    pub cycle_id: CycleId,
    pub meter_id: MeterId,
    pub reading_value: f64,
    pub previous_reading: Option<f64>,
    pub consumption: Option<f64>,
    pub reading_date: NaiveDate,
    pub captured_by: String,
    pub notes: Option<String>,
    pub flags: Vec<AutoFlag>,
    pub manual_flags: Vec<ManualFlag>,
    pub review_status: ReviewStatus,
    pub estimated_value: Option<f64>,
    /// Captured after its cycle was closed.
    pub late: bool,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
}

impl Reading {
    /// Build a fresh, unflagged reading from a capture against a meter whose
    /// last register value was `previous_reading`.
    pub fn from_input(input: ReadingInput, previous_reading: Option<f64>) -> Self {
        Self {
            id: new_id("rdg"),
            consumption: calculate_consumption(input.reading_value, previous_reading),
            cycle_id: input.cycle_id,
            meter_id: input.meter_id,
            reading_value: input.reading_value,
            previous_reading,
            reading_date: input.reading_date,
            captured_by: input.captured_by,
            notes: input.notes,
            flags: Vec::new(),
            manual_flags: Vec::new(),
            review_status: ReviewStatus::Pending,
            estimated_value: None,
            late: false,
            reviewed_by: None,
            reviewed_at: None,
            admin_notes: None,
        }
    }

    /// Consumption the rules should judge: the administrator's estimate when
    /// one was recorded, otherwise the register difference.
    pub fn effective_consumption(&self) -> Option<f64> {
        match (self.review_status, self.estimated_value) {
            (ReviewStatus::Estimated, Some(estimate)) => Some(estimate),
            _ => calculate_consumption(self.reading_value, self.previous_reading),
        }
    }

    pub fn all_flags(&self) -> Vec<TaggedFlag> {
        merge_flags(&self.flags, &self.manual_flags)
    }

    pub fn apply_review(
        &mut self,
        outcome: ReviewOutcome,
        reviewed_by: &str,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> MeterResult<()> {
        match outcome {
            ReviewOutcome::Estimated { value } => {
                if !value.is_finite() {
                    return Err(MeterError::MissingEstimate);
                }
                self.estimated_value = Some(value);
            }
            _ => self.estimated_value = None,
        }
        self.review_status = outcome.status();
        self.consumption = self.effective_consumption();
        self.reviewed_by = Some(reviewed_by.to_string());
        self.reviewed_at = Some(at);
        self.admin_notes = notes;
        Ok(())
    }
}

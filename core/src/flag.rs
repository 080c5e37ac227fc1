//! Flags attached to readings.
//!
//! Auto flags are produced by the rule set and are regenerated wholesale on
//! every validation pass. Manual flags are entered by an administrator and are
//! never touched by the rule set. The two lists are stored separately and only
//! merged for display through `TaggedFlag`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every kind of flag the engine can raise on its own.
/// Variants are never removed or renamed: the kebab-case names are persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FlagKind {
    Backward,
    Spike,
    PercentageSpike,
    ZeroConsumption,
    Unchanged,
    GradualCreep,
    SeasonalAnomaly,
    VacancyContradiction,
    BulkMismatch,
}

impl FlagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backward => "backward",
            Self::Spike => "spike",
            Self::PercentageSpike => "percentage-spike",
            Self::ZeroConsumption => "zero-consumption",
            Self::Unchanged => "unchanged",
            Self::GradualCreep => "gradual-creep",
            Self::SeasonalAnomaly => "seasonal-anomaly",
            Self::VacancyContradiction => "vacancy-contradiction",
            Self::BulkMismatch => "bulk-mismatch",
        }
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A system-generated flag. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoFlag {
    #[serde(rename = "type")]
    pub kind: FlagKind,
    pub severity: Severity,
    pub message: String,
    pub description: String,
}

impl AutoFlag {
    pub fn new(kind: FlagKind, severity: Severity, message: String, description: String) -> Self {
        Self {
            kind,
            severity,
            message,
            description,
        }
    }
}

/// An administrator-entered flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManualFlag {
    #[serde(rename = "type")]
    pub flag_type: String,
    pub severity: Severity,
    pub message: String,
    pub description: String,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
}

/// What an administrator submits. Missing type defaults to `custom`,
/// missing severity to `medium`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualFlagInput {
    #[serde(rename = "type", default)]
    pub flag_type: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    pub message: String,
    #[serde(default)]
    pub description: Option<String>,
    pub added_by: String,
}

impl ManualFlagInput {
    pub fn into_flag(self, added_at: DateTime<Utc>) -> ManualFlag {
        ManualFlag {
            flag_type: self.flag_type.unwrap_or_else(|| "custom".to_string()),
            severity: self.severity.unwrap_or(Severity::Medium),
            message: self.message,
            description: self.description.unwrap_or_default(),
            added_by: self.added_by,
            added_at,
        }
    }
}

/// Unified view over both flag lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TaggedFlag {
    Auto(AutoFlag),
    Manual(ManualFlag),
}

impl TaggedFlag {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Auto(f) => f.kind.as_str(),
            Self::Manual(f) => &f.flag_type,
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual(_))
    }
}

/// Auto flags first, then manual flags, each in original order.
pub fn merge_flags(auto: &[AutoFlag], manual: &[ManualFlag]) -> Vec<TaggedFlag> {
    auto.iter()
        .cloned()
        .map(TaggedFlag::Auto)
        .chain(manual.iter().cloned().map(TaggedFlag::Manual))
        .collect()
}

//! Validation configuration and its layered resolution.
//!
//! RESOLUTION ORDER (lowest priority first):
//!   1. Built-in defaults
//!   2. Global override      (scope `global`)
//!   3. Per-scheme override  (scope `scheme:<id>`)
//!
//! Each layer is a partial object merged key-by-key over the layer below.
//! A malformed layer is skipped with a warning. Resolution itself never fails.
//!
//! RULE: the engine reads overrides only through an injected `ConfigStore`.

use crate::{
    error::{MeterError, MeterResult},
    types::SchemeId,
};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::HashMap};

// ── Defaults ─────────────────────────────────────────────────────────────────

pub const DEFAULT_SPIKE_MULTIPLIER: f64 = 3.0;
pub const DEFAULT_PERCENTAGE_THRESHOLD: f64 = 50.0;
pub const DEFAULT_ZERO_TOLERANCE: bool = true;
pub const DEFAULT_BACKWARD_ALLOWED: bool = false;
pub const DEFAULT_MIN_HISTORY_CYCLES: usize = 3;
pub const DEFAULT_BULK_MISMATCH_THRESHOLD: f64 = 20.0;
pub const DEFAULT_GRADUAL_CREEP_THRESHOLD: f64 = 7.0;
pub const DEFAULT_SEASONAL_COMPARISON_MONTHS: u32 = 12;

/// Effective thresholds for one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    /// Consumption above `average × this` is a spike.
    pub spike_multiplier: f64,
    /// Percent increase over the previous cycle that counts as a spike.
    pub percentage_threshold: f64,
    /// Flag zero consumption on a previously active meter.
    pub zero_tolerance: bool,
    /// Allow backward readings (meter replacements, rollovers).
    pub backward_allowed: bool,
    /// Window of the moving average.
    pub min_history_cycles: usize,
    /// Percent of bulk supply left unaccounted before reconciliation fires.
    pub bulk_mismatch_threshold: f64,
    /// Mean percent increase per cycle that counts as creep.
    pub gradual_creep_threshold: f64,
    /// How far back the seasonal comparison looks.
    pub seasonal_comparison_months: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            spike_multiplier: DEFAULT_SPIKE_MULTIPLIER,
            percentage_threshold: DEFAULT_PERCENTAGE_THRESHOLD,
            zero_tolerance: DEFAULT_ZERO_TOLERANCE,
            backward_allowed: DEFAULT_BACKWARD_ALLOWED,
            min_history_cycles: DEFAULT_MIN_HISTORY_CYCLES,
            bulk_mismatch_threshold: DEFAULT_BULK_MISMATCH_THRESHOLD,
            gradual_creep_threshold: DEFAULT_GRADUAL_CREEP_THRESHOLD,
            seasonal_comparison_months: DEFAULT_SEASONAL_COMPARISON_MONTHS,
        }
    }
}

impl ValidationConfig {
    /// Overlay every key present in `partial`.
    pub fn merged(mut self, partial: &PartialValidationConfig) -> Self {
        if let Some(v) = partial.spike_multiplier {
            self.spike_multiplier = v;
        }
        if let Some(v) = partial.percentage_threshold {
            self.percentage_threshold = v;
        }
        if let Some(v) = partial.zero_tolerance {
            self.zero_tolerance = v;
        }
        if let Some(v) = partial.backward_allowed {
            self.backward_allowed = v;
        }
        if let Some(v) = partial.min_history_cycles {
            self.min_history_cycles = v;
        }
        if let Some(v) = partial.bulk_mismatch_threshold {
            self.bulk_mismatch_threshold = v;
        }
        if let Some(v) = partial.gradual_creep_threshold {
            self.gradual_creep_threshold = v;
        }
        if let Some(v) = partial.seasonal_comparison_months {
            self.seasonal_comparison_months = v;
        }
        self
    }
}

/// One stored override layer. Absent keys fall through to the layer below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialValidationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spike_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_tolerance: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backward_allowed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_history_cycles: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_mismatch_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradual_creep_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasonal_comparison_months: Option<u32>,
}

impl PartialValidationConfig {
    /// Parse a stored blob and reject values no rule could use.
    pub fn from_json(raw: &str) -> MeterResult<Self> {
        let partial: Self = serde_json::from_str(raw)?;
        partial.validate()?;
        Ok(partial)
    }

    pub fn validate(&self) -> MeterResult<()> {
        fn non_negative(key: &'static str, value: Option<f64>) -> MeterResult<()> {
            match value {
                Some(v) if !v.is_finite() || v < 0.0 => Err(MeterError::InvalidConfig {
                    key,
                    reason: format!("expected a finite, non-negative number, got {v}"),
                }),
                _ => Ok(()),
            }
        }

        non_negative("spikeMultiplier", self.spike_multiplier)?;
        non_negative("percentageThreshold", self.percentage_threshold)?;
        non_negative("bulkMismatchThreshold", self.bulk_mismatch_threshold)?;
        non_negative("gradualCreepThreshold", self.gradual_creep_threshold)?;

        if self.spike_multiplier == Some(0.0) {
            return Err(MeterError::InvalidConfig {
                key: "spikeMultiplier",
                reason: "must be greater than zero".into(),
            });
        }
        if self.min_history_cycles == Some(0) {
            return Err(MeterError::InvalidConfig {
                key: "minHistoryCycles",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ── Scopes and stores ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigScope {
    Global,
    Scheme(SchemeId),
}

impl ConfigScope {
    pub fn for_scheme(scheme_id: Option<&str>) -> Self {
        match scheme_id {
            Some(id) => Self::Scheme(id.to_string()),
            None => Self::Global,
        }
    }

    /// Stable key used by persistent stores.
    pub fn storage_key(&self) -> String {
        match self {
            Self::Global => "global".to_string(),
            Self::Scheme(id) => format!("scheme:{id}"),
        }
    }
}

/// Read/write access to stored override layers.
///
/// `get` returns `Ok(None)` when nothing is stored for the scope and an error
/// when something is stored but cannot be used.
pub trait ConfigStore {
    fn get(&self, scope: &ConfigScope) -> MeterResult<Option<PartialValidationConfig>>;
    fn set(&self, scope: &ConfigScope, partial: &PartialValidationConfig) -> MeterResult<()>;
}

/// In-process store. Keeps raw JSON text per scope so that it behaves like a
/// persistent store, including holding blobs that turn out to be malformed.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    blobs: RefCell<HashMap<ConfigScope, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw text as-is, bypassing validation.
    pub fn set_raw(&self, scope: ConfigScope, raw: &str) {
        self.blobs.borrow_mut().insert(scope, raw.to_string());
    }

    /// Load overrides from a JSON file of the form
    /// `{ "global": {...}, "schemes": { "<scheme_id>": {...} } }`.
    ///
    /// Individual layers are stored verbatim and checked only at resolution
    /// time, so one bad scheme entry does not reject the whole file.
    pub fn load_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: ConfigOverridesFile = serde_json::from_str(&content)?;

        let store = Self::new();
        if let Some(global) = file.global {
            store.set_raw(ConfigScope::Global, &global.to_string());
        }
        for (scheme_id, layer) in file.schemes {
            store.set_raw(ConfigScope::Scheme(scheme_id), &layer.to_string());
        }
        Ok(store)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, scope: &ConfigScope) -> MeterResult<Option<PartialValidationConfig>> {
        match self.blobs.borrow().get(scope) {
            Some(raw) => PartialValidationConfig::from_json(raw).map(Some),
            None => Ok(None),
        }
    }

    fn set(&self, scope: &ConfigScope, partial: &PartialValidationConfig) -> MeterResult<()> {
        partial.validate()?;
        let raw = serde_json::to_string(partial)?;
        self.blobs.borrow_mut().insert(scope.clone(), raw);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ConfigOverridesFile {
    #[serde(default)]
    global: Option<serde_json::Value>,
    #[serde(default)]
    schemes: HashMap<String, serde_json::Value>,
}

// ── Resolution ───────────────────────────────────────────────────────────────

/// Effective config for a scheme (or the global config when `scheme_id` is
/// `None`). Never fails: unusable layers are logged and skipped.
pub fn resolve_config(store: &dyn ConfigStore, scheme_id: Option<&str>) -> ValidationConfig {
    let mut layers = vec![ConfigScope::Global];
    if let Some(id) = scheme_id {
        layers.push(ConfigScope::Scheme(id.to_string()));
    }

    layers
        .iter()
        .fold(ValidationConfig::default(), |config, scope| match store.get(scope) {
            Ok(Some(partial)) => config.merged(&partial),
            Ok(None) => config,
            Err(e) => {
                log::warn!(
                    "Ignoring validation config layer '{}': {e}",
                    scope.storage_key()
                );
                config
            }
        })
}

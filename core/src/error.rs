use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Meter '{meter_id}' not found")]
    MeterNotFound { meter_id: String },

    #[error("Reading '{reading_id}' not found")]
    ReadingNotFound { reading_id: String },

    #[error("Cycle '{cycle_id}' not found")]
    CycleNotFound { cycle_id: String },

    #[error("Cycle '{cycle_id}' is already closed")]
    CycleAlreadyClosed { cycle_id: String },

    #[error("Invalid config value for '{key}': {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    #[error("Estimated review outcome requires a finite estimate")]
    MissingEstimate,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type MeterResult<T> = Result<T, MeterError>;

//! Shared primitive types used across the engine.

/// A stable, unique identifier for any record.
pub type EntityId = String;

pub type SchemeId = EntityId;
pub type UnitId = EntityId;
pub type MeterId = EntityId;
pub type CycleId = EntityId;
pub type ReadingId = EntityId;

/// Mint a fresh identifier, e.g. `rdg-5f0c…`.
pub fn new_id(prefix: &str) -> EntityId {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

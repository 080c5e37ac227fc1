//! Persistent validation config overrides.

use super::MeterStore;
use crate::{
    config::{ConfigScope, ConfigStore, PartialValidationConfig},
    error::MeterResult,
};
use rusqlite::{params, OptionalExtension};

impl MeterStore {
    /// Raw JSON blob stored for a scope key, if any.
    pub fn config_blob(&self, scope_key: &str) -> MeterResult<Option<String>> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM validation_config WHERE scope_key = ?1",
                params![scope_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    /// Upsert a raw JSON blob. Not validated here.
    pub fn put_config_blob(&self, scope_key: &str, payload: &str) -> MeterResult<()> {
        self.conn.execute(
            "INSERT INTO validation_config (scope_key, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (scope_key) DO UPDATE
             SET payload = excluded.payload, updated_at = excluded.updated_at",
            params![scope_key, payload, chrono::Utc::now()],
        )?;
        Ok(())
    }
}

/// `ConfigStore` backed by the `validation_config` table.
///
/// Holds its own connection, so pair it with `MeterStore::reopen` on a file
/// or shared-memory database.
pub struct SqliteConfigStore {
    store: MeterStore,
}

impl SqliteConfigStore {
    pub fn new(store: MeterStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MeterStore {
        &self.store
    }
}

impl ConfigStore for SqliteConfigStore {
    fn get(&self, scope: &ConfigScope) -> MeterResult<Option<PartialValidationConfig>> {
        match self.store.config_blob(&scope.storage_key())? {
            Some(raw) => PartialValidationConfig::from_json(&raw).map(Some),
            None => Ok(None),
        }
    }

    fn set(&self, scope: &ConfigScope, partial: &PartialValidationConfig) -> MeterResult<()> {
        partial.validate()?;
        let raw = serde_json::to_string(partial)?;
        self.store.put_config_blob(&scope.storage_key(), &raw)
    }
}

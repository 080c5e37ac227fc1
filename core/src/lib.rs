pub mod config;
pub mod consumption;
pub mod cycle;
pub mod cycle_summary;
pub mod engine;
pub mod error;
pub mod event;
pub mod flag;
pub mod health;
pub mod history;
pub mod meter;
pub mod reading;
pub mod reconciliation;
pub mod rules;
pub mod store;
pub mod types;

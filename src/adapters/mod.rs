//! Adapters between CloudBackupSchedule resources and the reconciliation engine

mod schedule_config;
mod secrets;

pub use schedule_config::*;
pub use secrets::*;

//! Cloud Backup Schedule Kubernetes Operator
//!
//! Keeps managed database cluster backup schedules in line with
//! CloudBackupSchedule resources. The reconciliation engine lives in
//! [`reconcilers`] and talks to the remote service through [`atlas::ScheduleApi`].

pub mod adapters;
pub mod atlas;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod reconcilers;

pub use error::{Error, Result};

//! Prometheus metrics for the backup schedule operator
//!
//! This module exposes metrics for monitoring operator health and reconciliation outcomes.

mod prometheus;

pub use prometheus::*;

//! Reconciliation engine for cloud backup schedules
//!
//! This module contains the business logic that moves a cluster's remote
//! backup schedule toward its declared state:
//! - Matching policy items by remote ID
//! - Planning each policy
//! - Planning and submitting the whole schedule
//! - Checking existence by persisted identity

pub mod policy;
pub mod policy_items;
pub mod schedule;
pub mod verify;

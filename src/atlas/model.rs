//! Remote backup schedule resource model
//!
//! Only the fields needed for reconciliation are modelled; unknown fields in
//! API responses (links, snapshot metadata, ...) are ignored.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How often a policy item takes a snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyType {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for FrequencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FrequencyType::Hourly => "hourly",
            FrequencyType::Daily => "daily",
            FrequencyType::Weekly => "weekly",
            FrequencyType::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

/// Unit of a policy item's retention period
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RetentionUnit {
    Days,
    Weeks,
    Months,
}

impl fmt::Display for RetentionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetentionUnit::Days => "days",
            RetentionUnit::Weeks => "weeks",
            RetentionUnit::Months => "months",
        };
        f.write_str(s)
    }
}

/// One retention rule within a policy
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyItem {
    /// Remote-assigned ID; absent for items that have not been created yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Interval between snapshots, interpreted per frequency type
    pub frequency_interval: u32,

    /// Snapshot frequency
    pub frequency_type: FrequencyType,

    /// Retention unit
    pub retention_unit: RetentionUnit,

    /// Retention length in `retention_unit`
    pub retention_value: u32,
}

impl PolicyItem {
    /// The item ID, treating an empty string like no ID
    pub fn item_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Whether both items describe the same rule, ignoring IDs
    pub fn same_rule(&self, other: &PolicyItem) -> bool {
        self.frequency_interval == other.frequency_interval
            && self.frequency_type == other.frequency_type
            && self.retention_unit == other.retention_unit
            && self.retention_value == other.retention_value
    }

    /// Copy of this item carrying a different ID
    pub fn with_id(&self, id: Option<String>) -> PolicyItem {
        PolicyItem {
            id,
            ..self.clone()
        }
    }
}

impl fmt::Display for PolicyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} keep {} {}",
            self.frequency_type, self.frequency_interval, self.retention_value, self.retention_unit
        )?;
        if let Some(id) = self.item_id() {
            write!(f, " ({})", id)?;
        }
        Ok(())
    }
}

/// One backup cadence: an ordered set of policy items
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Remote-assigned ID; absent for policies that have not been created yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Retention rules
    #[serde(default)]
    pub policy_items: Vec<PolicyItem>,
}

impl Policy {
    /// The policy ID, treating an empty string like no ID
    pub fn policy_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Backup schedule as reported by the remote system
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,

    #[serde(default)]
    pub cluster_name: String,

    pub reference_hour_of_day: u32,

    pub reference_minute_of_hour: u32,

    pub restore_window_days: u32,

    #[serde(default)]
    pub policies: Vec<Policy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_snapshot: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Total number of policy items across all policies
    pub fn item_count(&self) -> usize {
        self.policies.iter().map(|p| p.policy_items.len()).sum()
    }
}

/// Body of a schedule update request
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdate {
    pub reference_hour_of_day: u32,

    pub reference_minute_of_hour: u32,

    pub restore_window_days: u32,

    /// `None` leaves the remote policies untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policies: Option<Vec<Policy>>,
}

/// Cluster summary, used to tell a missing cluster from a missing schedule
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_name: Option<String>,

    #[serde(default)]
    pub provider_backup_enabled: bool,
}

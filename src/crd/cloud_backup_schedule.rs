//! CloudBackupSchedule Custom Resource Definition

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::atlas::{FrequencyType, Policy, PolicyItem, RetentionUnit};

/// CloudBackupSchedule resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "backup.oso.sh",
    version = "v1alpha1",
    kind = "CloudBackupSchedule",
    plural = "cloudbackupschedules",
    singular = "cloudbackupschedule",
    shortname = "cbs",
    namespaced,
    status = "CloudBackupScheduleStatus",
    printcolumn = r#"{"name": "Project", "type": "string", "jsonPath": ".spec.projectId"}"#,
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.clusterName"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Items", "type": "integer", "jsonPath": ".status.policyItemCount"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CloudBackupScheduleSpec {
    /// Project (group) the cluster belongs to
    pub project_id: String,

    /// Name of the cluster whose schedule is managed
    pub cluster_name: String,

    /// UTC hour of day (0-23) snapshots are anchored to
    pub reference_hour_of_day: u32,

    /// Minute of the reference hour (0-59)
    pub reference_minute_of_hour: u32,

    /// Days of point-in-time restore window
    pub restore_window_days: u32,

    /// Backup policies. Omit to leave the cluster's policies untouched;
    /// an empty list removes them all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies: Option<Vec<PolicySpec>>,

    /// Secret holding the API token
    pub credentials_secret: CredentialsSecretRef,

    /// Override for the control-plane base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    /// Plan only; never submit the update
    #[serde(default)]
    pub dry_run: bool,

    /// Stop reconciling (useful for maintenance)
    #[serde(default)]
    pub suspend: bool,
}

/// Backup policy declaration
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    /// Remote policy ID; omit for the first declaration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Retention rules
    #[serde(default)]
    pub policy_items: Vec<PolicyItemSpec>,
}

/// Retention rule declaration
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyItemSpec {
    /// Remote item ID; omit to create a new item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Interval between snapshots, interpreted per frequency type
    pub frequency_interval: u32,

    /// hourly, daily, weekly or monthly
    pub frequency_type: FrequencyType,

    /// days, weeks or months
    pub retention_unit: RetentionUnit,

    /// Retention length in retention units
    pub retention_value: u32,
}

impl From<&PolicyItemSpec> for PolicyItem {
    fn from(spec: &PolicyItemSpec) -> Self {
        PolicyItem {
            id: spec.id.clone(),
            frequency_interval: spec.frequency_interval,
            frequency_type: spec.frequency_type,
            retention_unit: spec.retention_unit,
            retention_value: spec.retention_value,
        }
    }
}

impl From<&PolicyItem> for PolicyItemSpec {
    fn from(item: &PolicyItem) -> Self {
        PolicyItemSpec {
            id: item.id.clone(),
            frequency_interval: item.frequency_interval,
            frequency_type: item.frequency_type,
            retention_unit: item.retention_unit,
            retention_value: item.retention_value,
        }
    }
}

impl From<&PolicySpec> for Policy {
    fn from(spec: &PolicySpec) -> Self {
        Policy {
            id: spec.id.clone(),
            policy_items: spec.policy_items.iter().map(PolicyItem::from).collect(),
        }
    }
}

impl From<&Policy> for PolicySpec {
    fn from(policy: &Policy) -> Self {
        PolicySpec {
            id: policy.id.clone(),
            policy_items: policy.policy_items.iter().map(PolicyItemSpec::from).collect(),
        }
    }
}

/// Reference to the secret holding the API token
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsSecretRef {
    /// Secret name
    pub name: String,

    /// Token key in secret
    #[serde(default = "default_token_key")]
    pub token_key: String,
}

fn default_token_key() -> String {
    "token".to_string()
}

/// CloudBackupSchedule status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudBackupScheduleStatus {
    /// Current phase (Planned, Reconciled, Failed, Suspended)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Persisted composite identity of the managed schedule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_id: Option<String>,

    /// Remote cluster ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,

    /// Reference hour reported by the remote
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_hour_of_day: Option<u32>,

    /// Reference minute reported by the remote
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_minute_of_hour: Option<u32>,

    /// Restore window reported by the remote
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_window_days: Option<u32>,

    /// Policies as reconciled, with remote IDs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<PolicySpec>,

    /// Total number of policy items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_item_count: Option<u32>,

    /// Next snapshot reported by the remote
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_snapshot: Option<DateTime<Utc>>,

    /// Last successful reconciliation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<DateTime<Utc>>,

    /// Item operations of the last plan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_plan: Option<PlanStatus>,

    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Item operation counts of the last plan
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanStatus {
    pub creates: u32,
    pub updates: u32,
    pub deletes: u32,
    pub removed_policies: u32,
}

/// Status condition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

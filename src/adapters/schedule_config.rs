//! Schedule configuration adapter
//!
//! Validates a CloudBackupSchedule spec and converts it into the desired
//! schedule the reconciliation engine works on. Also converts reconciled
//! remote state back into CRD shapes for status and import.

use std::collections::HashSet;

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::atlas::{FrequencyType, Policy, PolicyItem, Schedule};
use crate::crd::{
    CloudBackupSchedule, CloudBackupScheduleSpec, CloudBackupScheduleStatus, Condition,
    CredentialsSecretRef, PlanStatus, PolicySpec,
};
use crate::error::{Error, Result};
use crate::identity::ScheduleKey;
use crate::reconcilers::schedule::{
    DesiredSchedule, PlanSummary, ReconcilePhase, Reconciled, SchedulePlan,
};

/// Monthly interval meaning "last day of the month"
pub const LAST_DAY_OF_MONTH: u32 = 40;

const HOURLY_INTERVALS: [u32; 6] = [1, 2, 4, 6, 8, 12];

/// Validate the CloudBackupSchedule spec.
///
/// Messages name the schedule the spec refers to.
pub fn validate(spec: &CloudBackupScheduleSpec) -> Result<()> {
    validate_fields(spec).map_err(|msg| {
        Error::validation(format!("backup schedule {}: {}", schedule_key(spec), msg))
    })
}

fn validate_fields(spec: &CloudBackupScheduleSpec) -> std::result::Result<(), String> {
    if spec.project_id.trim().is_empty() {
        return Err("projectId must be specified".to_string());
    }

    if spec.cluster_name.trim().is_empty() {
        return Err("clusterName must be specified".to_string());
    }

    if spec.reference_hour_of_day > 23 {
        return Err(format!(
            "Invalid referenceHourOfDay {}: must be between 0 and 23",
            spec.reference_hour_of_day
        ));
    }

    if spec.reference_minute_of_hour > 59 {
        return Err(format!(
            "Invalid referenceMinuteOfHour {}: must be between 0 and 59",
            spec.reference_minute_of_hour
        ));
    }

    if spec.restore_window_days == 0 {
        return Err("restoreWindowDays must be greater than 0".to_string());
    }

    if spec.credentials_secret.name.is_empty() {
        return Err("credentialsSecret.name must be specified".to_string());
    }

    if let Some(policies) = &spec.policies {
        let mut policy_ids = HashSet::new();
        for (p, policy) in policies.iter().enumerate() {
            if let Some(id) = policy.id.as_deref().filter(|id| !id.is_empty()) {
                if !policy_ids.insert(id) {
                    return Err(format!(
                        "policies[{}]: policy '{}' is declared more than once",
                        p, id
                    ));
                }
            }

            let mut item_ids = HashSet::new();
            for (i, item) in policy.policy_items.iter().enumerate() {
                if let Some(id) = item.id.as_deref().filter(|id| !id.is_empty()) {
                    if !item_ids.insert(id) {
                        return Err(format!(
                            "policies[{}].policyItems[{}]: item '{}' is declared more than once",
                            p, i, id
                        ));
                    }
                }
                validate_item(&PolicyItem::from(item))
                    .map_err(|msg| format!("policies[{}].policyItems[{}]: {}", p, i, msg))?;
            }
        }
    }

    Ok(())
}

/// Validate one retention rule
fn validate_item(item: &PolicyItem) -> std::result::Result<(), String> {
    if item.retention_value == 0 {
        return Err("retentionValue must be greater than 0".to_string());
    }

    let interval = item.frequency_interval;
    let valid = match item.frequency_type {
        FrequencyType::Hourly => HOURLY_INTERVALS.contains(&interval),
        FrequencyType::Daily => interval == 1,
        FrequencyType::Weekly => (1..=7).contains(&interval),
        FrequencyType::Monthly => (1..=28).contains(&interval) || interval == LAST_DAY_OF_MONTH,
    };

    if !valid {
        return Err(format!(
            "Invalid frequencyInterval {} for {} frequency",
            interval, item.frequency_type
        ));
    }

    Ok(())
}

/// Identity of the schedule a resource manages
pub fn schedule_key(spec: &CloudBackupScheduleSpec) -> ScheduleKey {
    ScheduleKey::new(spec.project_id.clone(), spec.cluster_name.clone())
}

/// Build the desired schedule from a validated resource.
///
/// Item IDs recorded in status by the previous reconciliation are adopted
/// for items declared without one.
pub fn build_desired_schedule(schedule: &CloudBackupSchedule) -> Result<DesiredSchedule> {
    let spec = &schedule.spec;
    validate(spec)?;

    let mut desired = DesiredSchedule {
        key: schedule_key(spec),
        reference_hour_of_day: spec.reference_hour_of_day,
        reference_minute_of_hour: spec.reference_minute_of_hour,
        restore_window_days: spec.restore_window_days,
        policies: spec
            .policies
            .as_ref()
            .map(|policies| policies.iter().map(Into::into).collect()),
    };

    if let Some(status) = &schedule.status {
        // Recorded IDs only apply to the identity they were recorded for
        if status.state_id.as_deref() == Some(desired.key.state_id().as_str()) {
            let previous: Vec<Policy> = status.policies.iter().map(Into::into).collect();
            desired.adopt_ids(&previous);
        }
    }

    Ok(desired)
}

fn plan_status(summary: PlanSummary) -> PlanStatus {
    let count = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
    PlanStatus {
        creates: count(summary.creates),
        updates: count(summary.updates),
        deletes: count(summary.deletes),
        removed_policies: count(summary.removed_policies),
    }
}

fn apply_remote(status: &mut CloudBackupScheduleStatus, remote: &Schedule) {
    status.cluster_id = remote.cluster_id.clone();
    status.reference_hour_of_day = Some(remote.reference_hour_of_day);
    status.reference_minute_of_hour = Some(remote.reference_minute_of_hour);
    status.restore_window_days = Some(remote.restore_window_days);
    status.policies = remote.policies.iter().map(PolicySpec::from).collect();
    status.policy_item_count = Some(u32::try_from(remote.item_count()).unwrap_or(u32::MAX));
    status.next_snapshot = remote.next_snapshot;
}

fn condition(status: &str, reason: &str, message: &str) -> Condition {
    Condition {
        type_: "Ready".to_string(),
        status: status.to_string(),
        last_transition_time: Utc::now(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    }
}

/// Status after a successful reconciliation
pub fn reconciled_status(reconciled: &Reconciled, generation: Option<i64>) -> CloudBackupScheduleStatus {
    let message = "Backup schedule reconciled";
    let mut status = CloudBackupScheduleStatus {
        phase: Some(ReconcilePhase::Reconciled.to_string()),
        message: Some(message.to_string()),
        state_id: Some(reconciled.state_id.clone()),
        last_reconcile_time: Some(Utc::now()),
        last_plan: Some(plan_status(reconciled.plan.summary())),
        observed_generation: generation,
        conditions: vec![condition("True", "ScheduleReconciled", message)],
        ..Default::default()
    };
    apply_remote(&mut status, &reconciled.schedule);
    status
}

/// Status after a dry run: the plan is recorded, the remote view is the
/// schedule the plan was computed against
pub fn planned_status(
    plan: &SchedulePlan,
    previous: Option<&CloudBackupScheduleStatus>,
    generation: Option<i64>,
) -> CloudBackupScheduleStatus {
    let message = if plan.is_noop() {
        "Dry run: backup schedule is up to date"
    } else {
        "Dry run: backup schedule update planned but not submitted"
    };
    let mut status = CloudBackupScheduleStatus {
        phase: Some(ReconcilePhase::Planned.to_string()),
        message: Some(message.to_string()),
        // identity is only persisted once an update went through
        state_id: previous.and_then(|s| s.state_id.clone()),
        last_reconcile_time: previous.and_then(|s| s.last_reconcile_time),
        last_plan: Some(plan_status(plan.summary())),
        observed_generation: generation,
        conditions: vec![condition("False", "DryRun", message)],
        ..Default::default()
    };
    apply_remote(&mut status, &plan.current);
    status
}

/// Status after a failed reconciliation; the last known remote view is kept
pub fn failed_status(
    previous: Option<&CloudBackupScheduleStatus>,
    reason: &str,
    error_message: &str,
    generation: Option<i64>,
) -> CloudBackupScheduleStatus {
    let mut status = previous.cloned().unwrap_or_default();
    status.phase = Some(ReconcilePhase::Failed.to_string());
    status.message = Some(error_message.to_string());
    status.observed_generation = generation;
    status.conditions = vec![condition("False", reason, error_message)];
    status
}

/// Build a CloudBackupSchedule manifest that reproduces a remote schedule
pub fn import_manifest(
    name: &str,
    namespace: Option<&str>,
    key: &ScheduleKey,
    remote: &Schedule,
    credentials_secret: &str,
) -> CloudBackupSchedule {
    let spec = CloudBackupScheduleSpec {
        project_id: key.project_id.clone(),
        cluster_name: key.cluster_name.clone(),
        reference_hour_of_day: remote.reference_hour_of_day,
        reference_minute_of_hour: remote.reference_minute_of_hour,
        restore_window_days: remote.restore_window_days,
        policies: Some(remote.policies.iter().map(PolicySpec::from).collect()),
        credentials_secret: CredentialsSecretRef {
            name: credentials_secret.to_string(),
            token_key: "token".to_string(),
        },
        api_base_url: None,
        dry_run: false,
        suspend: false,
    };

    let mut resource = CloudBackupSchedule::new(name, spec);
    resource.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    };
    resource
}

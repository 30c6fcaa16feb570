//! Integration tests for backup schedule reconciliation
//!
//! These tests drive the reconciliation engine end to end against an
//! in-memory remote that assigns IDs the way the real service does.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use cloud_backup_schedule_operator::adapters::{
    build_desired_schedule, import_manifest, reconciled_status,
};
use cloud_backup_schedule_operator::atlas::{
    ApiError, Cluster, FrequencyType, Policy, PolicyItem, RetentionUnit, Schedule, ScheduleApi,
    ScheduleUpdate,
};
use cloud_backup_schedule_operator::crd::{
    CloudBackupSchedule, CloudBackupScheduleSpec, CredentialsSecretRef, PolicyItemSpec, PolicySpec,
};
use cloud_backup_schedule_operator::identity::{parse_import_id, ScheduleKey};
use cloud_backup_schedule_operator::reconcilers::schedule::{self, DesiredSchedule};
use cloud_backup_schedule_operator::reconcilers::verify;
use cloud_backup_schedule_operator::Error;

// ============================================================================
// In-memory remote
// ============================================================================

const PROJECT: &str = "5f1e2d3c4b5a697887766554";
const CLUSTER: &str = "cluster0";

#[derive(Default)]
struct FakeState {
    clusters: HashMap<(String, String), Schedule>,
    next_id: u32,
    updates: Vec<ScheduleUpdate>,
}

#[derive(Default)]
struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    fn with_schedule(schedule: Schedule) -> Self {
        let remote = FakeRemote::default();
        remote
            .state
            .lock()
            .unwrap()
            .clusters
            .insert((PROJECT.to_string(), CLUSTER.to_string()), schedule);
        remote
    }

    fn schedule(&self) -> Schedule {
        self.state.lock().unwrap().clusters[&(PROJECT.to_string(), CLUSTER.to_string())].clone()
    }

    fn updates(&self) -> Vec<ScheduleUpdate> {
        self.state.lock().unwrap().updates.clone()
    }

    fn remove_cluster(&self) {
        self.state.lock().unwrap().clusters.clear();
    }
}

fn not_found(project_id: &str, cluster_name: &str) -> ApiError {
    ApiError::NotFound(format!("{}/{}", project_id, cluster_name))
}

#[async_trait]
impl ScheduleApi for FakeRemote {
    async fn get_schedule(&self, project_id: &str, cluster_name: &str) -> Result<Schedule, ApiError> {
        let state = self.state.lock().unwrap();
        state
            .clusters
            .get(&(project_id.to_string(), cluster_name.to_string()))
            .cloned()
            .ok_or_else(|| not_found(project_id, cluster_name))
    }

    async fn update_schedule(
        &self,
        project_id: &str,
        cluster_name: &str,
        update: &ScheduleUpdate,
    ) -> Result<Schedule, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.updates.push(update.clone());
        let mut next_id = state.next_id;
        let schedule = state
            .clusters
            .get_mut(&(project_id.to_string(), cluster_name.to_string()))
            .ok_or_else(|| not_found(project_id, cluster_name))?;

        schedule.reference_hour_of_day = update.reference_hour_of_day;
        schedule.reference_minute_of_hour = update.reference_minute_of_hour;
        schedule.restore_window_days = update.restore_window_days;

        if let Some(policies) = &update.policies {
            let mut assign = |id: &Option<String>, prefix: &str| {
                id.clone().unwrap_or_else(|| {
                    next_id += 1;
                    format!("{}-{}", prefix, next_id)
                })
            };
            schedule.policies = policies
                .iter()
                .map(|p| Policy {
                    id: Some(assign(&p.id, "policy")),
                    policy_items: p
                        .policy_items
                        .iter()
                        .map(|i| i.with_id(Some(assign(&i.id, "item"))))
                        .collect(),
                })
                .collect();
        }

        let result = schedule.clone();
        state.next_id = next_id;
        Ok(result)
    }

    async fn get_cluster(&self, project_id: &str, cluster_name: &str) -> Result<Cluster, ApiError> {
        let state = self.state.lock().unwrap();
        if state
            .clusters
            .contains_key(&(project_id.to_string(), cluster_name.to_string()))
        {
            Ok(Cluster {
                name: cluster_name.to_string(),
                provider_backup_enabled: true,
                ..Default::default()
            })
        } else {
            Err(not_found(project_id, cluster_name))
        }
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

fn item(
    id: Option<&str>,
    interval: u32,
    frequency: FrequencyType,
    unit: RetentionUnit,
    value: u32,
) -> PolicyItem {
    PolicyItem {
        id: id.map(str::to_string),
        frequency_interval: interval,
        frequency_type: frequency,
        retention_unit: unit,
        retention_value: value,
    }
}

/// The four items a freshly enabled cluster starts with
fn default_items() -> Vec<PolicyItem> {
    vec![
        item(Some("hourly"), 6, FrequencyType::Hourly, RetentionUnit::Days, 2),
        item(Some("daily"), 1, FrequencyType::Daily, RetentionUnit::Days, 7),
        item(Some("weekly"), 6, FrequencyType::Weekly, RetentionUnit::Weeks, 4),
        item(Some("monthly"), 40, FrequencyType::Monthly, RetentionUnit::Months, 12),
    ]
}

fn default_schedule() -> Schedule {
    Schedule {
        cluster_id: Some("5e2211c17a3e5a48f5497de3".to_string()),
        cluster_name: CLUSTER.to_string(),
        reference_hour_of_day: 17,
        reference_minute_of_hour: 24,
        restore_window_days: 2,
        policies: vec![Policy {
            id: Some("policy-default".to_string()),
            policy_items: default_items(),
        }],
        next_snapshot: None,
    }
}

fn key() -> ScheduleKey {
    ScheduleKey::new(PROJECT, CLUSTER)
}

fn desired(policies: Option<Vec<Policy>>) -> DesiredSchedule {
    DesiredSchedule {
        key: key(),
        reference_hour_of_day: 3,
        reference_minute_of_hour: 45,
        restore_window_days: 4,
        policies,
    }
}

fn policy(id: Option<&str>, items: Vec<PolicyItem>) -> Policy {
    Policy {
        id: id.map(str::to_string),
        policy_items: items,
    }
}

fn item_spec(interval: u32, frequency: FrequencyType, unit: RetentionUnit, value: u32) -> PolicyItemSpec {
    PolicyItemSpec {
        id: None,
        frequency_interval: interval,
        frequency_type: frequency,
        retention_unit: unit,
        retention_value: value,
    }
}

fn resource(policies: Option<Vec<PolicySpec>>) -> CloudBackupSchedule {
    CloudBackupSchedule::new(
        "orders-backups",
        CloudBackupScheduleSpec {
            project_id: PROJECT.to_string(),
            cluster_name: CLUSTER.to_string(),
            reference_hour_of_day: 3,
            reference_minute_of_hour: 45,
            restore_window_days: 4,
            policies,
            credentials_secret: CredentialsSecretRef {
                name: "atlas-api".to_string(),
                token_key: "token".to_string(),
            },
            api_base_url: None,
            dry_run: false,
            suspend: false,
        },
    )
}

// ============================================================================
// Schedule Reconciliation Tests
// ============================================================================

#[tokio::test]
async fn shrinking_items_sends_only_the_kept_items() {
    let remote = FakeRemote::with_schedule(default_schedule());
    let kept = vec![
        item(Some("hourly"), 6, FrequencyType::Hourly, RetentionUnit::Days, 2),
        item(Some("weekly"), 6, FrequencyType::Weekly, RetentionUnit::Weeks, 4),
    ];

    let reconciled = schedule::reconcile(
        &remote,
        &desired(Some(vec![policy(Some("policy-default"), kept)])),
    )
    .await
    .unwrap();

    let summary = reconciled.plan.summary();
    assert_eq!(summary.creates, 0);
    assert_eq!(summary.updates, 2);
    assert_eq!(summary.deletes, 2);

    let updates = remote.updates();
    assert_eq!(updates.len(), 1);
    let sent = updates[0].policies.as_ref().unwrap();
    assert_eq!(sent.len(), 1);
    let ids: Vec<_> = sent[0].policy_items.iter().map(|i| i.id.as_deref()).collect();
    assert_eq!(ids, vec![Some("hourly"), Some("weekly")]);

    assert_eq!(remote.schedule().item_count(), 2);
}

#[tokio::test]
async fn changing_every_item_keeps_their_ids() {
    let remote = FakeRemote::with_schedule(default_schedule());
    let changed: Vec<PolicyItem> = default_items()
        .into_iter()
        .map(|mut i| {
            i.retention_value += 1;
            i
        })
        .collect();

    let reconciled = schedule::reconcile(
        &remote,
        &desired(Some(vec![policy(Some("policy-default"), changed)])),
    )
    .await
    .unwrap();

    let summary = reconciled.plan.summary();
    assert_eq!((summary.creates, summary.updates, summary.deletes), (0, 4, 0));

    let after = remote.schedule();
    let items = &after.policies[0].policy_items;
    assert_eq!(items.len(), 4);
    assert_eq!(items[0].id.as_deref(), Some("hourly"));
    assert_eq!(items[0].retention_value, 3);
    assert_eq!(items[3].retention_value, 13);
}

#[tokio::test]
async fn omitting_policies_only_changes_scalars() {
    let remote = FakeRemote::with_schedule(default_schedule());

    let reconciled = schedule::reconcile(&remote, &desired(None)).await.unwrap();

    assert!(remote.updates()[0].policies.is_none());
    let after = reconciled.schedule;
    assert_eq!(after.reference_hour_of_day, 3);
    assert_eq!(after.reference_minute_of_hour, 45);
    assert_eq!(after.restore_window_days, 4);
    assert_eq!(after.policies.len(), 1);
    assert_eq!(after.item_count(), 4);
}

#[tokio::test]
async fn replacing_items_without_ids_creates_and_deletes() {
    let remote = FakeRemote::with_schedule(default_schedule());
    let fresh = vec![item(None, 12, FrequencyType::Hourly, RetentionUnit::Days, 3)];

    let reconciled = schedule::reconcile(&remote, &desired(Some(vec![policy(None, fresh)])))
        .await
        .unwrap();

    let summary = reconciled.plan.summary();
    assert_eq!((summary.creates, summary.updates, summary.deletes), (1, 0, 4));

    let after = remote.schedule();
    assert_eq!(after.policies.len(), 1);
    assert_eq!(after.policies[0].id.as_deref(), Some("policy-default"));
    assert_eq!(after.item_count(), 1);
}

#[tokio::test]
async fn unknown_policy_id_never_submits() {
    let remote = FakeRemote::with_schedule(default_schedule());

    let err = schedule::reconcile(
        &remote,
        &desired(Some(vec![policy(Some("gone"), default_items())])),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::PolicyNotFound { ref policy_id, .. } if policy_id == "gone"));
    assert!(remote.updates().is_empty());
}

#[tokio::test]
async fn missing_cluster_is_reported() {
    let remote = FakeRemote::default();

    let err = schedule::plan(&remote, &desired(None)).await.unwrap_err();
    assert!(matches!(err, Error::ClusterNotFound(ref k) if *k == key()));
}

// ============================================================================
// Resource Round Trip Tests
// ============================================================================

#[tokio::test]
async fn second_reconciliation_of_an_id_less_resource_is_a_noop() {
    let remote = FakeRemote::with_schedule(default_schedule());
    let mut cbs = resource(Some(vec![PolicySpec {
        id: None,
        policy_items: vec![
            item_spec(4, FrequencyType::Hourly, RetentionUnit::Days, 3),
            item_spec(1, FrequencyType::Daily, RetentionUnit::Days, 14),
        ],
    }]));

    let first = schedule::reconcile(&remote, &build_desired_schedule(&cbs).unwrap())
        .await
        .unwrap();
    assert_eq!(first.plan.summary().creates, 2);
    cbs.status = Some(reconciled_status(&first, Some(1)));

    let again = schedule::plan(&remote, &build_desired_schedule(&cbs).unwrap())
        .await
        .unwrap();
    let summary = again.summary();
    assert_eq!((summary.creates, summary.deletes), (0, 0));
    assert!(again.is_noop());
}

#[tokio::test]
async fn adding_an_empty_policy_is_submitted() {
    let remote = FakeRemote::with_schedule(default_schedule());
    let mut cbs = resource(Some(vec![PolicySpec {
        id: None,
        policy_items: vec![item_spec(6, FrequencyType::Hourly, RetentionUnit::Days, 2)],
    }]));

    let first = schedule::reconcile(&remote, &build_desired_schedule(&cbs).unwrap())
        .await
        .unwrap();
    cbs.status = Some(reconciled_status(&first, Some(1)));
    cbs.spec.policies.as_mut().unwrap().push(PolicySpec {
        id: None,
        policy_items: vec![],
    });

    let plan = schedule::plan(&remote, &build_desired_schedule(&cbs).unwrap())
        .await
        .unwrap();
    assert_eq!(plan.summary(), schedule::PlanSummary::default());
    assert!(!plan.is_noop());

    schedule::apply(&remote, plan).await.unwrap();
    assert_eq!(remote.schedule().policies.len(), 2);
}

#[tokio::test]
async fn status_from_another_identity_is_ignored() {
    let remote = FakeRemote::with_schedule(default_schedule());
    let mut cbs = resource(Some(vec![PolicySpec {
        id: None,
        policy_items: vec![item_spec(6, FrequencyType::Hourly, RetentionUnit::Days, 2)],
    }]));

    let first = schedule::reconcile(&remote, &build_desired_schedule(&cbs).unwrap())
        .await
        .unwrap();
    let mut status = reconciled_status(&first, Some(1));
    status.state_id = Some(ScheduleKey::new(PROJECT, "other").state_id());
    cbs.status = Some(status);

    let desired = build_desired_schedule(&cbs).unwrap();
    let items = &desired.policies.as_ref().unwrap()[0].policy_items;
    assert!(items[0].id.is_none());
}

#[tokio::test]
async fn imported_manifest_reproduces_the_remote_schedule() {
    let remote = FakeRemote::with_schedule(default_schedule());
    let key = parse_import_id(&format!("{}-{}", PROJECT, CLUSTER)).unwrap();
    assert_eq!(key, self::key());

    let current = schedule::fetch_for_import(&remote, &key).await.unwrap();
    let manifest = import_manifest("orders-backups", Some("databases"), &key, &current, "atlas-api");
    assert_eq!(manifest.metadata.namespace.as_deref(), Some("databases"));

    let desired = build_desired_schedule(&manifest).unwrap();
    let plan = schedule::plan_against(&desired, current).unwrap();
    let summary = plan.summary();
    assert_eq!((summary.creates, summary.updates, summary.deletes), (0, 4, 0));
    assert_eq!(plan.update.policies.as_ref().unwrap()[0].policy_items.len(), 4);
}

// ============================================================================
// Identity And Destroy Tests
// ============================================================================

#[tokio::test]
async fn persisted_identity_tracks_existence() {
    let remote = FakeRemote::with_schedule(default_schedule());
    let state_id = schedule::reconcile(&remote, &desired(None))
        .await
        .unwrap()
        .state_id;

    assert_eq!(ScheduleKey::from_state_id(&state_id).unwrap(), key());
    assert!(verify::exists(&remote, &state_id).await.unwrap());
    assert!(matches!(
        verify::verify_destroyed(&remote, &state_id).await,
        Err(Error::StillExists(_))
    ));

    remote.remove_cluster();
    assert!(!verify::exists(&remote, &state_id).await.unwrap());
    tokio_test::assert_ok!(verify::verify_destroyed(&remote, &state_id).await);
}

#[tokio::test]
async fn malformed_identity_is_rejected() {
    let remote = FakeRemote::with_schedule(default_schedule());
    let err = verify::exists(&remote, "not-a-token").await.unwrap_err();
    assert!(matches!(err, Error::MalformedIdentity { .. }));
}

// ============================================================================
// Validation Tests
// ============================================================================

#[test]
fn resource_with_out_of_range_hour_is_rejected() {
    let mut cbs = resource(None);
    cbs.spec.reference_hour_of_day = 24;
    assert!(matches!(build_desired_schedule(&cbs), Err(Error::Validation(_))));
}

#[test]
fn resource_with_bad_monthly_interval_is_rejected() {
    let cbs = resource(Some(vec![PolicySpec {
        id: None,
        policy_items: vec![item_spec(29, FrequencyType::Monthly, RetentionUnit::Months, 12)],
    }]));
    let err = tokio_test::assert_err!(build_desired_schedule(&cbs));
    assert!(err.to_string().contains("policies[0].policyItems[0]"));
}

#[test]
fn resource_with_last_day_of_month_is_accepted() {
    let cbs = resource(Some(vec![PolicySpec {
        id: None,
        policy_items: vec![item_spec(40, FrequencyType::Monthly, RetentionUnit::Months, 12)],
    }]));
    let desired = tokio_test::assert_ok!(build_desired_schedule(&cbs));
    assert_eq!(desired.policies.map(|p| p.len()), Some(1));
}

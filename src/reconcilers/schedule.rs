//! Backup schedule reconciliation
//!
//! Orchestrates one reconciliation of a cluster's backup schedule:
//! - Read the current schedule (telling a missing cluster from a missing schedule)
//! - Plan every desired policy against its remote counterpart
//! - Submit the whole schedule in a single update call
//! - Produce the composite identity to persist
//!
//! Every error raised while planning happens before the update call, so a
//! failed plan leaves the remote schedule untouched. The remote system is
//! the transaction boundary for the update itself.

use std::collections::HashSet;
use std::fmt;

use tracing::{error, info, warn};

use crate::atlas::{Policy, Schedule, ScheduleApi, ScheduleUpdate};
use crate::error::{Error, Result};
use crate::identity::ScheduleKey;

use super::policy::{find_current, reconcile_policy, PolicyPlan};

/// Desired configuration of one cluster's backup schedule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredSchedule {
    pub key: ScheduleKey,
    pub reference_hour_of_day: u32,
    pub reference_minute_of_hour: u32,
    pub restore_window_days: u32,
    /// `None` leaves the remote policies alone; `Some(vec![])` removes them all
    pub policies: Option<Vec<Policy>>,
}

impl DesiredSchedule {
    /// Fill in item IDs the remote assigned on a previous reconciliation.
    ///
    /// Only items declared without an ID are touched. Such an item takes the
    /// ID of a previously reconciled item with the same rule in the policy at
    /// the same position, each previous item being used at most once. This is
    /// what keeps a configuration without IDs from re-creating its items on
    /// every run.
    pub fn adopt_ids(&mut self, previous: &[Policy]) {
        let Some(policies) = self.policies.as_mut() else {
            return;
        };

        for (wanted, prior) in policies.iter_mut().zip(previous) {
            if wanted.policy_id().is_some() && wanted.policy_id() != prior.policy_id() {
                continue;
            }

            let mut taken: HashSet<String> = wanted
                .policy_items
                .iter()
                .filter_map(|i| i.item_id())
                .map(str::to_string)
                .collect();

            for item in wanted.policy_items.iter_mut().filter(|i| i.item_id().is_none()) {
                let adopted = prior
                    .policy_items
                    .iter()
                    .find(|p| {
                        p.item_id().is_some_and(|id| !taken.contains(id)) && p.same_rule(item)
                    })
                    .and_then(|p| p.id.clone());
                if let Some(id) = adopted {
                    taken.insert(id.clone());
                    item.id = Some(id);
                }
            }
        }
    }
}

/// Where a reconciliation stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcilePhase {
    Planned,
    Submitted,
    Reconciled,
    Failed,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReconcilePhase::Planned => "Planned",
            ReconcilePhase::Submitted => "Submitted",
            ReconcilePhase::Reconciled => "Reconciled",
            ReconcilePhase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Item operation counts of a plan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub removed_policies: usize,
}

/// Everything needed to submit one schedule update
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulePlan {
    pub key: ScheduleKey,
    /// Remote schedule the plan was computed against
    pub current: Schedule,
    /// Payload for the single update call
    pub update: ScheduleUpdate,
    /// Per-policy plans, in desired order
    pub policies: Vec<PolicyPlan>,
    /// Remote policies no desired policy refers to; they are left out of the payload
    pub removed_policies: Vec<Policy>,
}

impl SchedulePlan {
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            removed_policies: self.removed_policies.len(),
            ..Default::default()
        };
        for plan in &self.policies {
            summary.creates += plan.items.to_create.len();
            summary.updates += plan.items.to_update.len();
            summary.deletes += plan.items.to_delete.len();
        }
        summary.deletes += self
            .removed_policies
            .iter()
            .map(|p| p.policy_items.len())
            .sum::<usize>();
        summary
    }

    /// True when submitting the plan would leave the remote schedule as it is
    pub fn is_noop(&self) -> bool {
        self.update.reference_hour_of_day == self.current.reference_hour_of_day
            && self.update.reference_minute_of_hour == self.current.reference_minute_of_hour
            && self.update.restore_window_days == self.current.restore_window_days
            && self.removed_policies.is_empty()
            && self.same_policy_layout()
            && self.policies.iter().all(|p| p.items.is_noop())
    }

    /// Whether the payload lists exactly the remote policies, in remote order.
    /// A payload policy without an ID is one the remote does not have yet.
    fn same_policy_layout(&self) -> bool {
        let Some(payload) = &self.update.policies else {
            return true;
        };
        payload.len() == self.current.policies.len()
            && payload
                .iter()
                .zip(&self.current.policies)
                .all(|(sent, existing)| {
                    sent.policy_id().is_some() && sent.policy_id() == existing.policy_id()
                })
    }
}

/// Outcome of a successful reconciliation
#[derive(Clone, Debug)]
pub struct Reconciled {
    /// Composite identity to persist for later lookups
    pub state_id: String,
    /// Schedule as returned by the remote after the update
    pub schedule: Schedule,
    pub plan: SchedulePlan,
}

/// Read the current schedule of a cluster.
///
/// A missing schedule is followed up with a cluster read so the caller can
/// tell a deleted cluster from a cluster without backups.
pub async fn fetch_current<A: ScheduleApi + ?Sized>(api: &A, key: &ScheduleKey) -> Result<Schedule> {
    match api.get_schedule(&key.project_id, &key.cluster_name).await {
        Ok(schedule) => Ok(schedule),
        Err(e) if e.is_not_found() => {
            match api.get_cluster(&key.project_id, &key.cluster_name).await {
                Ok(_) => Err(Error::ScheduleNotFound(key.clone())),
                Err(ce) if ce.is_not_found() => Err(Error::ClusterNotFound(key.clone())),
                Err(ce) => Err(Error::api(key, ce)),
            }
        }
        Err(e) => Err(Error::api(key, e)),
    }
}

/// Read the schedule of a cluster that is being brought under management.
///
/// The cluster is read first: a cluster without cloud backups enabled has
/// no schedule to import. The returned schedule carries every policy the
/// remote holds, including the defaults it created with the cluster.
pub async fn fetch_for_import<A: ScheduleApi + ?Sized>(
    api: &A,
    key: &ScheduleKey,
) -> Result<Schedule> {
    let cluster = api
        .get_cluster(&key.project_id, &key.cluster_name)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                Error::ClusterNotFound(key.clone())
            } else {
                Error::api(key, e)
            }
        })?;

    if !cluster.provider_backup_enabled {
        warn!(
            project_id = %key.project_id,
            cluster_name = %key.cluster_name,
            "Cluster does not have cloud backups enabled"
        );
        return Err(Error::ScheduleNotFound(key.clone()));
    }

    let schedule = fetch_current(api, key).await?;
    info!(
        project_id = %key.project_id,
        cluster_name = %key.cluster_name,
        policies = schedule.policies.len(),
        items = schedule.item_count(),
        "Read backup schedule for import"
    );
    Ok(schedule)
}

/// Plan a schedule update against an already fetched remote schedule
pub fn plan_against(desired: &DesiredSchedule, current: Schedule) -> Result<SchedulePlan> {
    let key = &desired.key;

    let Some(wanted_policies) = &desired.policies else {
        return Ok(SchedulePlan {
            key: key.clone(),
            update: ScheduleUpdate {
                reference_hour_of_day: desired.reference_hour_of_day,
                reference_minute_of_hour: desired.reference_minute_of_hour,
                restore_window_days: desired.restore_window_days,
                policies: None,
            },
            current,
            policies: Vec::new(),
            removed_policies: Vec::new(),
        });
    };

    let claimed: HashSet<&str> = wanted_policies.iter().filter_map(Policy::policy_id).collect();
    let mut used: HashSet<String> = HashSet::new();
    let mut policies = Vec::with_capacity(wanted_policies.len());

    for (index, wanted) in wanted_policies.iter().enumerate() {
        let counterpart = match wanted.policy_id() {
            Some(_) => find_current(key, wanted, &current.policies)?,
            // No ID: a first-time declaration. Pair it with the remote policy
            // at the same position unless another desired policy claims it.
            None => current.policies.get(index).filter(|p| {
                p.policy_id()
                    .is_some_and(|id| !claimed.contains(id) && !used.contains(id))
            }),
        };

        if let Some(id) = counterpart.and_then(Policy::policy_id) {
            if !used.insert(id.to_string()) {
                return Err(Error::validation(format!(
                    "policy '{}' of backup schedule {} is declared more than once",
                    id, key
                )));
            }
        }

        policies.push(reconcile_policy(key, wanted, counterpart)?);
    }

    let removed_policies: Vec<Policy> = current
        .policies
        .iter()
        .filter(|p| p.policy_id().map_or(true, |id| !used.contains(id)))
        .cloned()
        .collect();

    Ok(SchedulePlan {
        key: key.clone(),
        update: ScheduleUpdate {
            reference_hour_of_day: desired.reference_hour_of_day,
            reference_minute_of_hour: desired.reference_minute_of_hour,
            restore_window_days: desired.restore_window_days,
            policies: Some(policies.iter().map(|p| p.payload.clone()).collect()),
        },
        current,
        policies,
        removed_policies,
    })
}

/// Read the remote schedule and plan the update, without submitting it
pub async fn plan<A: ScheduleApi + ?Sized>(api: &A, desired: &DesiredSchedule) -> Result<SchedulePlan> {
    let key = &desired.key;
    let current = fetch_current(api, key).await?;
    let plan = plan_against(desired, current)?;

    let summary = plan.summary();
    info!(
        project_id = %key.project_id,
        cluster_name = %key.cluster_name,
        phase = %ReconcilePhase::Planned,
        manage_policies = desired.policies.is_some(),
        creates = summary.creates,
        updates = summary.updates,
        deletes = summary.deletes,
        removed_policies = summary.removed_policies,
        "Planned backup schedule update"
    );

    for removed in &plan.removed_policies {
        warn!(
            project_id = %key.project_id,
            cluster_name = %key.cluster_name,
            policy_id = removed.policy_id().unwrap_or_default(),
            items = removed.policy_items.len(),
            "Policy is not declared and will be removed"
        );
    }

    Ok(plan)
}

/// Submit a plan in one update call
pub async fn apply<A: ScheduleApi + ?Sized>(api: &A, plan: SchedulePlan) -> Result<Reconciled> {
    let key = plan.key.clone();
    info!(
        project_id = %key.project_id,
        cluster_name = %key.cluster_name,
        phase = %ReconcilePhase::Submitted,
        "Submitting backup schedule update"
    );

    let schedule = api
        .update_schedule(&key.project_id, &key.cluster_name, &plan.update)
        .await
        .map_err(|source| {
            error!(
                project_id = %key.project_id,
                cluster_name = %key.cluster_name,
                phase = %ReconcilePhase::Failed,
                error = %source,
                "Backup schedule update rejected"
            );
            Error::RemoteUpdate {
                key: key.clone(),
                source,
            }
        })?;

    info!(
        project_id = %key.project_id,
        cluster_name = %key.cluster_name,
        phase = %ReconcilePhase::Reconciled,
        policies = schedule.policies.len(),
        items = schedule.item_count(),
        "Backup schedule reconciled"
    );

    Ok(Reconciled {
        state_id: key.state_id(),
        schedule,
        plan,
    })
}

/// Plan and submit in one go
pub async fn reconcile<A: ScheduleApi + ?Sized>(
    api: &A,
    desired: &DesiredSchedule,
) -> Result<Reconciled> {
    let plan = plan(api, desired).await?;
    apply(api, plan).await
}

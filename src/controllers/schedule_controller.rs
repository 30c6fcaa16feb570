//! CloudBackupSchedule controller
//!
//! Watches CloudBackupSchedule resources and triggers reconciliation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::{ListParams, Patch, PatchParams},
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::adapters::{self, build_desired_schedule};
use crate::controllers::Context;
use crate::crd::{CloudBackupSchedule, CloudBackupScheduleStatus};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::schedule::{self, Reconciled};
use crate::reconcilers::verify;

/// Finalizer name for CloudBackupSchedule resources
const FINALIZER_NAME: &str = "backup.oso.sh/schedule-finalizer";

/// Field manager used for status patches
const FIELD_MANAGER: &str = "cloud-backup-schedule-operator";

/// Interval for re-reading the remote schedule to catch drift
const RESYNC_INTERVAL: Duration = Duration::from_secs(600);

/// Run the CloudBackupSchedule controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<CloudBackupSchedule> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("CloudBackupSchedule CRD not installed: {}", e);
        return;
    }

    info!("Starting CloudBackupSchedule controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled CloudBackupSchedule"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["CloudBackupSchedule"])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<CloudBackupSchedule>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["CloudBackupSchedule"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["CloudBackupSchedule"])
        .inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<CloudBackupSchedule> = Api::namespaced(ctx.client.clone(), &namespace);

    // Use finalizer so deletion only stops tracking the remote schedule
    finalizer(&api, FINALIZER_NAME, obj, |event| async {
        match event {
            FinalizerEvent::Apply(schedule) => apply(schedule, ctx.clone()).await,
            FinalizerEvent::Cleanup(schedule) => cleanup(schedule, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

/// Patch the status subresource
async fn patch_status(
    api: &Api<CloudBackupSchedule>,
    name: &str,
    status: &CloudBackupScheduleStatus,
) -> Result<()> {
    let patch = json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await?;
    Ok(())
}

/// Condition reason for a failed reconciliation
fn failure_reason(error: &Error) -> &'static str {
    match error {
        Error::Validation(_) => "ValidationFailed",
        Error::MalformedIdentity { .. } => "MalformedIdentity",
        Error::ClusterNotFound(_) => "ClusterNotFound",
        Error::ScheduleNotFound(_) => "ScheduleNotFound",
        Error::PolicyNotFound { .. } => "PolicyDrift",
        Error::RemoteUpdate { .. } => "UpdateRejected",
        Error::SecretNotFound(_) | Error::SecretKeyNotFound { .. } => "CredentialsUnavailable",
        _ => "ReconcileFailed",
    }
}

fn record_plan(plan: &schedule::SchedulePlan) {
    let summary = plan.summary();
    for (operation, count) in [
        ("create", summary.creates),
        ("update", summary.updates),
        ("delete", summary.deletes),
    ] {
        metrics::PLANNED_ITEM_OPERATIONS
            .with_label_values(&[operation])
            .inc_by(count as f64);
    }
}

/// Apply reconciliation (create/update)
async fn apply(resource: Arc<CloudBackupSchedule>, ctx: Arc<Context>) -> Result<Action> {
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_else(|| "default".to_string());
    let generation = resource.metadata.generation;
    let kube_api: Api<CloudBackupSchedule> = Api::namespaced(ctx.client.clone(), &namespace);
    let previous = resource.status.as_ref();

    info!(
        name = %name,
        namespace = %namespace,
        project_id = %resource.spec.project_id,
        cluster_name = %resource.spec.cluster_name,
        "Reconciling CloudBackupSchedule"
    );

    if resource.spec.suspend {
        info!("Schedule management is suspended, skipping");
        let mut status = previous.cloned().unwrap_or_default();
        status.phase = Some("Suspended".to_string());
        status.message = Some("Reconciliation suspended".to_string());
        status.observed_generation = generation;
        patch_status(&kube_api, &name, &status).await?;
        return Ok(Action::requeue(Duration::from_secs(60)));
    }

    // Validate the spec
    let desired = match build_desired_schedule(&resource) {
        Ok(desired) => desired,
        Err(e) => {
            warn!(error = %e, "Validation failed");
            let status = adapters::failed_status(previous, failure_reason(&e), &e.to_string(), generation);
            patch_status(&kube_api, &name, &status).await?;
            return Ok(Action::requeue(Duration::from_secs(300)));
        }
    };

    let outcome = match ctx.schedule_api(&resource.spec, &namespace).await {
        Ok(api) => match schedule::plan(&api, &desired).await {
            Ok(plan) if resource.spec.dry_run => {
                record_plan(&plan);
                let status = adapters::planned_status(&plan, previous, generation);
                patch_status(&kube_api, &name, &status).await?;
                return Ok(Action::requeue(RESYNC_INTERVAL));
            }
            Ok(plan) if plan.is_noop() && previous.and_then(|s| s.state_id.as_deref()).is_some() => {
                info!(name = %name, "Backup schedule is up to date");
                Ok(Reconciled {
                    state_id: plan.key.state_id(),
                    schedule: plan.current.clone(),
                    plan,
                })
            }
            Ok(plan) => {
                record_plan(&plan);
                schedule::apply(&api, plan).await
            }
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    match outcome {
        Ok(reconciled) => {
            metrics::SCHEDULE_UPDATES_TOTAL
                .with_label_values(&["success", &namespace, &name])
                .inc();
            let status = adapters::reconciled_status(&reconciled, generation);
            patch_status(&kube_api, &name, &status).await?;
            Ok(Action::requeue(RESYNC_INTERVAL))
        }
        Err(e) => {
            error!(name = %name, error = %e, "Backup schedule reconciliation failed");
            metrics::SCHEDULE_UPDATES_TOTAL
                .with_label_values(&["failure", &namespace, &name])
                .inc();
            let (status, retry) = failure_outcome(previous, &e, generation);
            patch_status(&kube_api, &name, &status).await?;

            if retry {
                Err(e)
            } else {
                Ok(Action::requeue(Duration::from_secs(300)))
            }
        }
    }
}

/// Status to record for a failed reconciliation, and whether the error
/// should go back to the controller for a retry
fn failure_outcome(
    previous: Option<&CloudBackupScheduleStatus>,
    error: &Error,
    generation: Option<i64>,
) -> (CloudBackupScheduleStatus, bool) {
    let status =
        adapters::failed_status(previous, failure_reason(error), &error.to_string(), generation);
    (status, error.is_retryable())
}

/// Cleanup when resource is being deleted
async fn cleanup(resource: Arc<CloudBackupSchedule>, ctx: Arc<Context>) -> Result<Action> {
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_else(|| "default".to_string());
    info!(name = %name, "Cleaning up CloudBackupSchedule");

    // The remote schedule belongs to the cluster and is never deleted here;
    // the resource only stops tracking it.
    let state_id = resource.status.as_ref().and_then(|s| s.state_id.clone());
    if let Some(state_id) = state_id {
        match ctx.schedule_api(&resource.spec, &namespace).await {
            Ok(api) => match verify::exists(&api, &state_id).await {
                Ok(true) => info!(name = %name, "Remote backup schedule retained, no longer tracked"),
                Ok(false) => info!(name = %name, "Remote backup schedule already gone"),
                Err(e) => warn!(name = %name, error = %e, "Could not check remote backup schedule"),
            },
            Err(e) => warn!(name = %name, error = %e, "Credentials unavailable during cleanup"),
        }
    }

    metrics::CLEANUPS
        .with_label_values(&["CloudBackupSchedule"])
        .inc();

    Ok(Action::await_change())
}

/// Error policy for the controller
fn error_policy(obj: Arc<CloudBackupSchedule>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    error!(
        name = %name,
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    let requeue_duration = match error {
        Error::Kube(_) => Duration::from_secs(30),
        Error::Api { .. } | Error::RemoteUpdate { .. } => Duration::from_secs(60),
        Error::Config(_) | Error::Validation(_) => Duration::from_secs(300),
        _ => Duration::from_secs(30),
    };

    Action::requeue(requeue_duration)
}

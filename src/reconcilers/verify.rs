//! Existence and destroy checks by persisted identity
//!
//! A cluster's backup schedule is never deleted on its own; it goes away
//! with the cluster. Destroying a managed schedule only stops tracking it,
//! so these checks are what tell the two situations apart.

use tracing::debug;

use crate::atlas::{Schedule, ScheduleApi};
use crate::error::{Error, Result};
use crate::identity::ScheduleKey;

/// Look up the schedule behind a persisted identity.
///
/// Returns `None` when the remote reports it as absent.
pub async fn lookup<A: ScheduleApi + ?Sized>(api: &A, state_id: &str) -> Result<Option<Schedule>> {
    let key = ScheduleKey::from_state_id(state_id)?;

    match api.get_schedule(&key.project_id, &key.cluster_name).await {
        Ok(schedule) => Ok(Some(schedule)),
        Err(e) if e.is_not_found() => {
            debug!(project_id = %key.project_id, cluster_name = %key.cluster_name, "Backup schedule is absent");
            Ok(None)
        }
        Err(e) => Err(Error::api(&key, e)),
    }
}

/// Whether the schedule behind a persisted identity currently exists
pub async fn exists<A: ScheduleApi + ?Sized>(api: &A, state_id: &str) -> Result<bool> {
    Ok(lookup(api, state_id).await?.is_some())
}

/// Confirm the schedule behind a persisted identity is gone
pub async fn verify_destroyed<A: ScheduleApi + ?Sized>(api: &A, state_id: &str) -> Result<()> {
    if exists(api, state_id).await? {
        return Err(Error::StillExists(ScheduleKey::from_state_id(state_id)?));
    }
    Ok(())
}

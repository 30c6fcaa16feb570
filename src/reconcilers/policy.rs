//! Policy reconciliation
//!
//! Plans the payload for one policy from its desired form and the remote
//! policy it corresponds to. Pure: no remote calls are made here.

use crate::atlas::Policy;
use crate::error::{Error, Result};
use crate::identity::ScheduleKey;

use super::policy_items::{match_items, ItemMatch};

/// Planned outcome for one policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyPlan {
    /// Policy to submit: matched items keep their IDs, new items have none,
    /// deleted items are left out
    pub payload: Policy,
    /// How the desired items were matched against the remote ones
    pub items: ItemMatch,
}

/// Find the remote policy a desired policy refers to by ID
pub fn find_current<'a>(
    key: &ScheduleKey,
    desired: &Policy,
    current: &'a [Policy],
) -> Result<Option<&'a Policy>> {
    let Some(policy_id) = desired.policy_id() else {
        return Ok(None);
    };

    current
        .iter()
        .find(|p| p.policy_id() == Some(policy_id))
        .map(Some)
        .ok_or_else(|| Error::PolicyNotFound {
            key: key.clone(),
            policy_id: policy_id.to_string(),
        })
}

/// Reconcile one desired policy against its remote counterpart.
///
/// `current` is `None` for a policy the remote does not have yet, in which
/// case every item is a create. A desired policy ID that does not match
/// `current` is drift and is reported, not repaired.
pub fn reconcile_policy(
    key: &ScheduleKey,
    desired: &Policy,
    current: Option<&Policy>,
) -> Result<PolicyPlan> {
    if let Some(policy_id) = desired.policy_id() {
        if current.and_then(Policy::policy_id) != Some(policy_id) {
            return Err(Error::PolicyNotFound {
                key: key.clone(),
                policy_id: policy_id.to_string(),
            });
        }
    }

    let current_items = current.map(|p| p.policy_items.as_slice()).unwrap_or(&[]);
    let items = match_items(&desired.policy_items, current_items);

    Ok(PolicyPlan {
        payload: Policy {
            id: current.and_then(|p| p.id.clone()),
            policy_items: items.reconciled.clone(),
        },
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{FrequencyType, PolicyItem, RetentionUnit};

    fn key() -> ScheduleKey {
        ScheduleKey::new("p", "c")
    }

    fn item(id: Option<&str>, frequency: FrequencyType, value: u32) -> PolicyItem {
        PolicyItem {
            id: id.map(str::to_string),
            frequency_interval: 1,
            frequency_type: frequency,
            retention_unit: RetentionUnit::Days,
            retention_value: value,
        }
    }

    fn current_policy() -> Policy {
        Policy {
            id: Some("pol-1".to_string()),
            policy_items: vec![
                item(Some("a"), FrequencyType::Hourly, 2),
                item(Some("b"), FrequencyType::Daily, 7),
                item(Some("c"), FrequencyType::Weekly, 4),
            ],
        }
    }

    #[test]
    fn test_new_policy_creates_every_item() {
        let desired = Policy {
            id: None,
            policy_items: vec![item(None, FrequencyType::Daily, 3)],
        };
        let plan = reconcile_policy(&key(), &desired, None).unwrap();

        assert_eq!(plan.payload.id, None);
        assert_eq!(plan.payload.policy_items, desired.policy_items);
        assert_eq!(plan.items.to_create.len(), 1);
        assert!(plan.items.to_delete.is_empty());
    }

    #[test]
    fn test_payload_keeps_desired_order_and_omits_deleted() {
        let current = current_policy();
        let desired = Policy {
            id: Some("pol-1".to_string()),
            policy_items: vec![
                item(None, FrequencyType::Monthly, 12),
                item(Some("b"), FrequencyType::Daily, 14),
                item(None, FrequencyType::Hourly, 1),
                item(Some("a"), FrequencyType::Hourly, 3),
            ],
        };

        let plan = reconcile_policy(&key(), &desired, Some(&current)).unwrap();

        let payload_ids: Vec<_> = plan
            .payload
            .policy_items
            .iter()
            .map(|i| i.id.as_deref())
            .collect();
        assert_eq!(payload_ids, vec![None, Some("b"), None, Some("a")]);
        assert_eq!(plan.payload.policy_items[1].retention_value, 14);
        assert_eq!(plan.payload.id.as_deref(), Some("pol-1"));
        assert_eq!(plan.items.to_delete.len(), 1);
        assert_eq!(plan.items.to_delete[0].id.as_deref(), Some("c"));
    }

    #[test]
    fn test_positional_current_is_used_for_id_less_policy() {
        let current = current_policy();
        let desired = Policy {
            id: None,
            policy_items: vec![item(Some("b"), FrequencyType::Daily, 7)],
        };

        let plan = reconcile_policy(&key(), &desired, Some(&current)).unwrap();

        // the payload adopts the remote policy ID
        assert_eq!(plan.payload.id.as_deref(), Some("pol-1"));
        assert_eq!(plan.items.to_update.len(), 1);
        assert_eq!(plan.items.to_delete.len(), 2);
    }

    #[test]
    fn test_mismatched_policy_id_is_drift() {
        let current = current_policy();
        let desired = Policy {
            id: Some("other".to_string()),
            policy_items: vec![],
        };

        let err = reconcile_policy(&key(), &desired, Some(&current)).unwrap_err();
        assert!(matches!(err, Error::PolicyNotFound { ref policy_id, .. } if policy_id == "other"));
        assert!(err.to_string().contains("p/c"));
    }

    #[test]
    fn test_find_current_reports_unknown_policy() {
        let current = vec![current_policy()];
        let desired = Policy {
            id: Some("missing".to_string()),
            policy_items: vec![],
        };
        assert!(matches!(
            find_current(&key(), &desired, &current),
            Err(Error::PolicyNotFound { .. })
        ));

        let desired = Policy {
            id: Some("pol-1".to_string()),
            policy_items: vec![],
        };
        assert_eq!(
            find_current(&key(), &desired, &current).unwrap(),
            Some(&current[0])
        );
    }
}

//! Policy item matching
//!
//! Pairs desired policy items with the remote items of the same policy by
//! ID. Items are never paired by position: reordering declared items must
//! not look like replacing them.

use std::collections::HashMap;

use crate::atlas::PolicyItem;

/// A desired item that replaces an existing remote item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemUpdate {
    /// The remote item being replaced
    pub current: PolicyItem,
    /// Replacement fields, carrying the remote item's ID
    pub desired: PolicyItem,
}

impl ItemUpdate {
    /// Whether the update leaves the remote item as it is
    pub fn is_noop(&self) -> bool {
        self.current.same_rule(&self.desired)
    }
}

/// Outcome of matching one policy's items
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemMatch {
    /// Desired items without a matching remote item, in desired order
    pub to_create: Vec<PolicyItem>,
    /// Desired items matching a remote item by ID, in desired order
    pub to_update: Vec<ItemUpdate>,
    /// Remote items no desired item refers to, in remote order
    pub to_delete: Vec<PolicyItem>,
    /// Every desired item in desired order, carrying the remote ID when it
    /// matched and no ID when it is new
    pub reconciled: Vec<PolicyItem>,
}

impl ItemMatch {
    /// True when applying the match would not change the remote policy
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty()
            && self.to_delete.is_empty()
            && self.to_update.iter().all(ItemUpdate::is_noop)
    }
}

/// Match desired items against the remote items of one policy
pub fn match_items(desired: &[PolicyItem], current: &[PolicyItem]) -> ItemMatch {
    let mut lookup: HashMap<&str, &PolicyItem> = current
        .iter()
        .filter_map(|item| item.item_id().map(|id| (id, item)))
        .collect();

    let mut result = ItemMatch::default();

    for item in desired {
        let reconciled = match item.item_id().and_then(|id| lookup.remove(id)) {
            Some(existing) => {
                let desired = item.with_id(existing.id.clone());
                result.to_update.push(ItemUpdate {
                    current: existing.clone(),
                    desired: desired.clone(),
                });
                desired
            }
            None => {
                let created = item.with_id(None);
                result.to_create.push(created.clone());
                created
            }
        };
        result.reconciled.push(reconciled);
    }

    result.to_delete = current
        .iter()
        .filter(|item| item.item_id().is_some_and(|id| lookup.contains_key(id)))
        .cloned()
        .collect();

    result
}

//! Compute selection
//!
//! Chooses the computes a workflow runs on, preferring computes attached to
//! storage nodes that already hold the workflow's allocations. Used on its
//! own for `assign-computes` and as the backfill step of
//! `assign-resources`.

use crate::inventory::Inventory;
use crate::policy::Policy;
use nnfplace_common::{BreakdownAllocation, Error, Result, XFS_LABEL};
use std::collections::HashMap;
use tracing::debug;

/// Computes taken per storage node when no per-compute count is recorded
pub const DEFAULT_COMPUTE_LIMIT: u32 = 16;

/// Per storage node cap on the number of selected computes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComputeLimits {
    xfs: bool,
    counts: HashMap<String, u32>,
}

impl ComputeLimits {
    /// Derive limits from recorded allocations
    ///
    /// When the workflow has a per-compute (`xfs`) allocation, a storage
    /// node contributes at most as many computes as it holds `xfs`
    /// allocation units, since each compute needs its own replica. Other
    /// labels do not affect the limit.
    pub fn from_allocations<'a>(
        allocations: impl IntoIterator<Item = &'a BreakdownAllocation>,
    ) -> Self {
        let mut limits = Self::default();
        for allocation in allocations {
            for assignment in allocation.assignments_for(XFS_LABEL) {
                limits.xfs = true;
                for storage in &assignment.storage {
                    *limits.counts.entry(storage.name.clone()).or_default() +=
                        storage.allocation_count;
                }
            }
        }
        limits
    }

    #[must_use]
    pub fn limit_for(&self, storage: &str) -> u32 {
        if self.xfs {
            self.counts
                .get(storage)
                .copied()
                .unwrap_or(DEFAULT_COMPUTE_LIMIT)
        } else {
            DEFAULT_COMPUTE_LIMIT
        }
    }
}

/// Selects computes from an inventory under a policy
#[derive(Clone, Copy, Debug)]
pub struct ComputeSelector<'a> {
    inventory: &'a Inventory,
    policy: &'a Policy,
}

impl<'a> ComputeSelector<'a> {
    pub const fn new(inventory: &'a Inventory, policy: &'a Policy) -> Self {
        Self { inventory, policy }
    }

    /// Storage nodes in preference order
    ///
    /// Nodes in `touched` come first, in that order, followed by every other
    /// node in inventory order. Excluded nodes and nodes missing from the
    /// inventory are left out.
    #[must_use]
    pub fn preference_order(&self, touched: &[String]) -> Vec<&'a str> {
        let mut order: Vec<&'a str> = Vec::with_capacity(self.inventory.len());
        let known = touched
            .iter()
            .filter_map(|name| self.inventory.get(name))
            .chain(self.inventory.iter());
        for node in known {
            if self.policy.is_storage_excluded(&node.name) {
                debug!(storage = %node.name, "excluding storage node");
                continue;
            }
            if !order.contains(&node.name.as_str()) {
                order.push(node.name.as_str());
            }
        }
        order
    }

    /// Add computes to `selected` until the policy's count is reached
    ///
    /// Computes already in `selected` count toward their storage node's
    /// limit. Fails with `Incomplete` if the inventory runs out first.
    pub fn extend(
        &self,
        selected: &mut Vec<String>,
        touched: &[String],
        limits: &ComputeLimits,
    ) -> Result<()> {
        let required = self.policy.required_compute_count;
        if selected.len() < required {
            for storage in self.preference_order(touched) {
                let Some(node) = self.inventory.get(storage) else {
                    continue;
                };
                let limit = limits.limit_for(storage) as usize;
                let mut taken = node
                    .computes
                    .iter()
                    .filter(|c| selected.contains(&c.name))
                    .count();
                debug!(storage, limit, taken, "looking at storage node");

                for compute in &node.computes {
                    if selected.len() >= required || taken >= limit {
                        break;
                    }
                    if selected.contains(&compute.name) {
                        continue;
                    }
                    if !self.policy.accepts_compute(compute) {
                        debug!(compute = %compute.name, status = %compute.status, "skipping compute");
                        continue;
                    }
                    debug!(compute = %compute.name, storage, "selecting compute");
                    selected.push(compute.name.clone());
                    taken += 1;
                }
                if selected.len() >= required {
                    break;
                }
            }
        }

        if selected.len() < required {
            return Err(Error::incomplete(format!(
                "insufficient compute resources to meet node requirement of {required} nodes"
            )));
        }
        Ok(())
    }
}

/// Select computes for a workflow from its recorded allocations
pub fn select_computes(
    inventory: &Inventory,
    policy: &Policy,
    allocations: &[BreakdownAllocation],
) -> Result<Vec<String>> {
    let mut touched: Vec<String> = Vec::new();
    for name in allocations
        .iter()
        .flat_map(|a| a.allocation_set.iter())
        .flat_map(|a| a.storage_names())
    {
        if !touched.iter().any(|t| t == name) {
            touched.push(name.to_string());
        }
    }

    let limits = ComputeLimits::from_allocations(allocations);
    let mut selected = Vec::with_capacity(policy.required_compute_count);
    ComputeSelector::new(inventory, policy).extend(&mut selected, &touched, &limits)?;
    Ok(selected)
}

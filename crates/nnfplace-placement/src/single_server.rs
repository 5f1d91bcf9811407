//! Single-server placement (e.g. Lustre MGT/MDT)

use crate::allocator::Allocator;
use crate::run::{BreakdownState, Run};
use nnfplace_common::{AllocationRequest, Assignment, Error, Result, StorageCount};
use tracing::{debug, info};

/// Automatic allocator for `AllocateSingleServer` requests
///
/// Takes the first eligible storage node in inventory order. A node is
/// eligible when it is not excluded, does not already hold this label in a
/// colocation-constrained breakdown, has room for the request, and, when
/// reuse is disabled, has not already hosted a single-server allocation in
/// this breakdown. The last non-excluded node in inventory order is exempt
/// from the reuse rule so that a breakdown is not starved when every other
/// node has been used.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleServerAllocator;

impl Allocator for SingleServerAllocator {
    fn allocate(
        &self,
        run: &mut Run<'_>,
        breakdown: &mut BreakdownState<'_>,
        request: &AllocationRequest,
    ) -> Result<Vec<Assignment>> {
        let policy = run.policy();
        let inventory = run.inventory();
        let last = inventory
            .names()
            .filter(|name| !policy.is_storage_excluded(name))
            .last();

        let mut selected = None;
        for node in inventory.iter() {
            debug!(storage = %node.name, label = %request.label, "looking at storage node");
            if policy.is_storage_excluded(&node.name) {
                debug!(storage = %node.name, "excluding storage node");
                continue;
            }
            if request.colocation_constrained && breakdown.label_uses(&request.label, &node.name) {
                debug!(storage = %node.name, label = %request.label, "storage node already hosts this label");
                continue;
            }
            if !policy.reuse_single_server_storage
                && breakdown.is_single_server_node(&node.name)
                && Some(node.name.as_str()) != last
            {
                debug!(storage = %node.name, "storage node already used and reuse is disabled");
                continue;
            }
            if !node.has_sufficient_capacity(request.minimum_capacity) {
                debug!(storage = %node.name, remaining = node.remaining_capacity, "insufficient capacity");
                continue;
            }
            selected = Some(node.name.clone());
            break;
        }

        let Some(name) = selected else {
            return Err(Error::insufficient(
                &request.label,
                "unable to locate a storage node to serve the allocation",
            ));
        };

        if let Some(node) = run.inventory_mut().get_mut(&name) {
            node.deduct(request.minimum_capacity);
            node.allocation_count += 1;
            debug!(storage = %node.name, remaining = node.remaining_capacity, "deducted single-server allocation");
        }
        breakdown.record_single_server(&name, &request.label);
        run.touch(&name);

        info!(
            breakdown = %breakdown.name(),
            label = %request.label,
            storage = %name,
            "single-server allocation placed"
        );
        Ok(vec![Assignment {
            label: request.label.clone(),
            allocation_size: request.minimum_capacity,
            storage: vec![StorageCount::new(name, 1)],
        }])
    }
}

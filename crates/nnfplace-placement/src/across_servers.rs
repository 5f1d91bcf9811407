//! Across-servers placement (e.g. Lustre OSTs)
//!
//! An across-servers request is striped over `across_server_count` distinct
//! storage nodes, each holding `allocations_per_server` units. Nodes that
//! host single-server allocations of the same breakdown are only used once
//! every other node has been considered.

use crate::allocator::Allocator;
use crate::run::{BreakdownState, Run, round_div};
use nnfplace_common::{AllocationRequest, Assignment, Error, Result, StorageCount};
use tracing::{debug, info};

/// Automatic allocator for `AllocateAcrossServers` requests
#[derive(Clone, Copy, Debug, Default)]
pub struct AcrossServersAllocator;

impl Allocator for AcrossServersAllocator {
    fn allocate(
        &self,
        run: &mut Run<'_>,
        breakdown: &mut BreakdownState<'_>,
        request: &AllocationRequest,
    ) -> Result<Vec<Assignment>> {
        let policy = run.policy();
        let target = policy.across_server_count as usize;
        let per_server = policy.allocations_per_server;
        if target == 0 || per_server == 0 {
            return Err(Error::configuration(
                "across-servers placement needs at least one server and one allocation per server",
            ));
        }

        let size = round_div(request.minimum_capacity, target as u64);
        let needed = size.saturating_mul(u64::from(per_server));
        debug!(
            label = %request.label,
            minimum_capacity = request.minimum_capacity,
            servers = target,
            per_server,
            size,
            "placing across servers"
        );

        let inventory = run.inventory();
        let usable = |name: &str| {
            !policy.is_storage_excluded(name)
                && inventory
                    .get(name)
                    .is_some_and(|n| n.has_sufficient_capacity(needed))
        };

        // Pass 1: nodes not hosting single-server allocations, inventory order
        let mut selected: Vec<String> = Vec::with_capacity(target);
        for node in inventory.iter() {
            if selected.len() >= target {
                break;
            }
            if breakdown.is_single_server_node(&node.name) {
                debug!(storage = %node.name, "storage node hosts a single-server allocation, skipping for now");
                continue;
            }
            if usable(&node.name) {
                selected.push(node.name.clone());
            } else {
                debug!(storage = %node.name, "storage node excluded or short on capacity");
            }
        }

        // Pass 2: fall back to single-server hosts in the order they were used
        for name in breakdown.single_server_nodes() {
            if selected.len() >= target {
                break;
            }
            if usable(name) {
                debug!(storage = %name, "reusing single-server host");
                selected.push(name.clone());
            }
        }

        if selected.len() < target {
            return Err(Error::insufficient(
                &request.label,
                format!(
                    "require {target} storage nodes but only found {}",
                    selected.len()
                ),
            ));
        }

        let mut storage = Vec::with_capacity(selected.len());
        for name in selected {
            if let Some(node) = run.inventory_mut().get_mut(&name) {
                node.deduct(needed);
                node.allocation_count += per_server;
                debug!(storage = %node.name, remaining = node.remaining_capacity, "deducted across-servers allocation");
            }
            run.touch(&name);
            storage.push(StorageCount::new(name, per_server));
        }

        info!(
            breakdown = %breakdown.name(),
            label = %request.label,
            storage_nodes = storage.len(),
            allocation_size = size,
            "across-servers allocation placed"
        );
        Ok(vec![Assignment {
            label: request.label.clone(),
            allocation_size: size,
            storage,
        }])
    }
}

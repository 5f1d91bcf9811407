//! Per-compute placement
//!
//! A per-compute allocation is replicated once for every selected compute,
//! on the storage node that compute is attached to. The allocator therefore
//! selects computes and storage together.

use crate::allocator::Allocator;
use crate::run::{BreakdownState, Run};
use nnfplace_common::{AllocationRequest, Assignment, Error, Result, StorageCount};
use std::collections::HashSet;
use tracing::{debug, info};

/// Automatic allocator for `AllocatePerCompute` requests
#[derive(Clone, Copy, Debug, Default)]
pub struct PerComputeAllocator;

impl Allocator for PerComputeAllocator {
    fn allocate(
        &self,
        run: &mut Run<'_>,
        breakdown: &mut BreakdownState<'_>,
        request: &AllocationRequest,
    ) -> Result<Vec<Assignment>> {
        let policy = run.policy();
        let required = policy.required_compute_count;
        // Once the job's computes are known, every later per-compute
        // allocation must land on the same set
        let restricted = run.has_full_compute_selection();

        let mut plan: Vec<(String, String)> = Vec::with_capacity(required);
        let mut planned: HashSet<&str> = HashSet::new();

        'storage: for node in run.inventory().iter() {
            if plan.len() >= required {
                break;
            }
            debug!(storage = %node.name, label = %request.label, "looking at storage node");
            if policy.is_storage_excluded(&node.name) {
                debug!(storage = %node.name, "excluding storage node");
                continue;
            }

            let mut available = node.remaining_capacity;
            for compute in &node.computes {
                if plan.len() >= required {
                    break 'storage;
                }
                if !policy.accepts_compute(compute) {
                    debug!(compute = %compute.name, status = %compute.status, "skipping compute");
                    continue;
                }
                if restricted && !run.is_compute_selected(&compute.name) {
                    continue;
                }
                if planned.contains(compute.name.as_str()) {
                    continue;
                }
                if request.minimum_capacity >= available {
                    debug!(storage = %node.name, remaining = available, "insufficient capacity for further computes");
                    break;
                }
                available -= request.minimum_capacity;
                planned.insert(compute.name.as_str());
                plan.push((node.name.clone(), compute.name.clone()));
            }
        }

        if plan.len() < required {
            return Err(Error::insufficient(
                &request.label,
                format!(
                    "there are not enough compute nodes to meet the required node count of {required}"
                ),
            ));
        }

        let mut storage: Vec<StorageCount> = Vec::new();
        for (storage_name, compute_name) in plan {
            if let Some(node) = run.inventory_mut().get_mut(&storage_name) {
                node.deduct(request.minimum_capacity);
                node.allocation_count += 1;
                debug!(storage = %node.name, remaining = node.remaining_capacity, "deducted per-compute allocation");
            }
            run.touch(&storage_name);
            run.select_compute(&compute_name);

            match storage.iter_mut().find(|s| s.name == storage_name) {
                Some(entry) => entry.allocation_count += 1,
                None => storage.push(StorageCount::new(storage_name, 1)),
            }
        }

        info!(
            breakdown = %breakdown.name(),
            label = %request.label,
            storage_nodes = storage.len(),
            computes = required,
            "per-compute allocation placed"
        );
        Ok(vec![Assignment {
            label: request.label.clone(),
            allocation_size: request.minimum_capacity,
            storage,
        }])
    }
}

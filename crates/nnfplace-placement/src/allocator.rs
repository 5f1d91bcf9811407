//! Allocator interface and prescriptive recipes
//!
//! Every placement strategy implements [`Allocator`]. The automatic
//! allocators live in their own modules; [`RecipeAllocator`] wraps one of
//! them and, when the breakdown carries an operator recipe, places the
//! request exactly as the recipe says instead.

use crate::across_servers::AcrossServersAllocator;
use crate::per_compute::PerComputeAllocator;
use crate::run::{BreakdownState, Run, round_div};
use crate::single_server::SingleServerAllocator;
use nnfplace_common::{
    AllocationRecipe, AllocationRequest, Assignment, Error, RecipeServer, Result, StorageCount,
    Strategy,
};
use tracing::debug;

/// Places one allocation request
pub trait Allocator {
    /// Place `request`, updating run and breakdown state on success
    ///
    /// On failure the run is left untouched.
    fn allocate(
        &self,
        run: &mut Run<'_>,
        breakdown: &mut BreakdownState<'_>,
        request: &AllocationRequest,
    ) -> Result<Vec<Assignment>>;
}

/// Allocator for a strategy, honoring recipes
#[must_use]
pub fn allocator_for(strategy: Strategy) -> Box<dyn Allocator> {
    match strategy {
        Strategy::PerCompute => Box::new(RecipeAllocator::new(PerComputeAllocator)),
        Strategy::SingleServer => Box::new(RecipeAllocator::new(SingleServerAllocator)),
        Strategy::AcrossServers => Box::new(RecipeAllocator::new(AcrossServersAllocator)),
    }
}

/// Uses the breakdown's recipe when it has one, else the wrapped allocator
#[derive(Clone, Debug, Default)]
pub struct RecipeAllocator<A> {
    automatic: A,
}

impl<A: Allocator> RecipeAllocator<A> {
    pub const fn new(automatic: A) -> Self {
        Self { automatic }
    }
}

impl<A: Allocator> Allocator for RecipeAllocator<A> {
    fn allocate(
        &self,
        run: &mut Run<'_>,
        breakdown: &mut BreakdownState<'_>,
        request: &AllocationRequest,
    ) -> Result<Vec<Assignment>> {
        match breakdown.recipe() {
            Some(recipe) => apply_recipe(run, breakdown, recipe, request),
            None => self.automatic.allocate(run, breakdown, request),
        }
    }
}

/// Place a request verbatim from a recipe
///
/// Recipes are authoritative: exclusions and capacity are not consulted and
/// no capacity is deducted.
pub fn apply_recipe(
    run: &mut Run<'_>,
    breakdown: &mut BreakdownState<'_>,
    recipe: &AllocationRecipe,
    request: &AllocationRequest,
) -> Result<Vec<Assignment>> {
    let servers = recipe.servers_for(&request.label).ok_or_else(|| {
        Error::general(format!(
            "recipe for breakdown '{}' did not contain an entry for {}",
            breakdown.name(),
            request.label
        ))
    })?;
    debug!(
        breakdown = %breakdown.name(),
        label = %request.label,
        servers = servers.len(),
        "placing from recipe"
    );

    let assignments = match request.strategy {
        Strategy::PerCompute => vec![Assignment {
            label: request.label.clone(),
            allocation_size: request.minimum_capacity,
            storage: storage_counts(servers),
        }],
        Strategy::SingleServer => {
            let mut assignments = Vec::with_capacity(servers.len());
            for server in servers {
                if server.allocations == 0 {
                    return Err(Error::general(format!(
                        "recipe server '{}' for {} has no allocations",
                        server.name, request.label
                    )));
                }
                assignments.push(Assignment {
                    label: request.label.clone(),
                    allocation_size: round_div(
                        request.minimum_capacity,
                        u64::from(server.allocations),
                    ),
                    storage: vec![StorageCount::new(&server.name, server.allocations)],
                });
            }
            for server in servers {
                breakdown.record_single_server(&server.name, &request.label);
            }
            assignments
        }
        Strategy::AcrossServers => {
            let total: u64 = servers.iter().map(|s| u64::from(s.allocations)).sum();
            if total == 0 {
                return Err(Error::general(format!(
                    "recipe for {} has no allocations",
                    request.label
                )));
            }
            vec![Assignment {
                label: request.label.clone(),
                allocation_size: round_div(request.minimum_capacity, total),
                storage: storage_counts(servers),
            }]
        }
    };

    for server in servers {
        run.touch(&server.name);
    }
    Ok(assignments)
}

fn storage_counts(servers: &[RecipeServer]) -> Vec<StorageCount> {
    servers
        .iter()
        .map(|s| StorageCount::new(&s.name, s.allocations))
        .collect()
}

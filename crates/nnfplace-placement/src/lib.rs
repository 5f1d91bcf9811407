//! nnfplace Placement - burst-buffer storage and compute allocation
//!
//! This crate decides which storage nodes ("rabbits") host the allocations
//! of a job's directive breakdowns and which compute nodes the job runs on.
//!
//! # Strategies
//!
//! ## Per-compute
//! One allocation per selected compute, on the compute's own storage node.
//!
//! ## Single-server
//! The whole allocation on the first eligible storage node, honoring
//! colocation constraints and the reuse policy.
//!
//! ## Across-servers
//! A fixed number of storage nodes, preferring nodes that host no
//! single-server allocation of the same breakdown.
//!
//! Operators may replace automatic placement with a recipe keyed by the
//! breakdown's directive name.
//!
//! # Example
//! ```ignore
//! use nnfplace_placement::{Inventory, InventoryFile, Policy, Recipes, assign_resources};
//!
//! let inventory = Inventory::load(&InventoryFile::new("inventory.yaml"), true, true)?;
//! let policy = Policy::new(4).with_across_servers(3, 1);
//! let outcome = assign_resources(inventory, &policy, &Recipes::new(), "wf", &breakdowns)?;
//! ```

pub mod across_servers;
pub mod allocator;
pub mod classify;
pub mod compute;
pub mod engine;
pub mod inventory;
pub mod per_compute;
pub mod policy;
pub mod run;
pub mod single_server;
pub mod source;

pub use across_servers::AcrossServersAllocator;
pub use allocator::{Allocator, RecipeAllocator, allocator_for};
pub use classify::{ClassifiedRequests, classify};
pub use compute::{ComputeLimits, ComputeSelector, DEFAULT_COMPUTE_LIMIT, select_computes};
pub use engine::{
    Action, AllocationOutcome, CommitReport, CommitResult, CommitSummary, Recipes, assign_computes,
    assign_resources, assign_servers, commit_outcome,
};
pub use inventory::{ComputeRef, Inventory, InventorySummary, NodeSummary, StorageNode};
pub use per_compute::PerComputeAllocator;
pub use policy::Policy;
pub use run::{BreakdownState, Run, round_div};
pub use single_server::SingleServerAllocator;

// Collaborator boundaries
pub use source::{
    Breakdown, BreakdownFile, BreakdownSource, CommitSink, InventoryFile, InventorySource,
    RecordingSink, StaticBreakdowns, StaticInventory, compute_patch, server_patch,
};

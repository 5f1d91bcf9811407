//! State of one allocation run
//!
//! A [`Run`] owns the inventory snapshot for the duration of a run and is
//! passed by `&mut` through each allocator stage. Per-breakdown tracking
//! lives in [`BreakdownState`], which is created fresh for every breakdown.

use crate::inventory::Inventory;
use crate::policy::Policy;
use nnfplace_common::AllocationRecipe;
use std::collections::{HashMap, HashSet};

/// Integer division rounded half to even
///
/// `denominator` must be non-zero.
#[must_use]
pub const fn round_div(numerator: u64, denominator: u64) -> u64 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    let rest = denominator - remainder;
    if remainder > rest || (remainder == rest && quotient % 2 == 1) {
        quotient + 1
    } else {
        quotient
    }
}

/// Mutable state shared by all allocators in one run
#[derive(Debug)]
pub struct Run<'p> {
    inventory: Inventory,
    policy: &'p Policy,
    computes: Vec<String>,
    compute_set: HashSet<String>,
    touched: Vec<String>,
}

impl<'p> Run<'p> {
    /// Start a run over an inventory snapshot
    #[must_use]
    pub fn new(inventory: Inventory, policy: &'p Policy) -> Self {
        Self {
            inventory,
            policy,
            computes: Vec::new(),
            compute_set: HashSet::new(),
            touched: Vec::new(),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &'p Policy {
        self.policy
    }

    #[must_use]
    pub const fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    /// Computes selected so far, in selection order
    #[must_use]
    pub fn computes(&self) -> &[String] {
        &self.computes
    }

    #[must_use]
    pub fn is_compute_selected(&self, name: &str) -> bool {
        self.compute_set.contains(name)
    }

    /// Check whether the job's compute count has been reached
    #[must_use]
    pub fn has_full_compute_selection(&self) -> bool {
        self.computes.len() >= self.policy.required_compute_count
    }

    /// Add a compute to the selection; duplicates are ignored
    pub fn select_compute(&mut self, name: &str) -> bool {
        if self.compute_set.insert(name.to_string()) {
            self.computes.push(name.to_string());
            true
        } else {
            false
        }
    }

    /// Record that a storage node received an allocation
    pub fn touch(&mut self, storage: &str) {
        if !self.touched.iter().any(|t| t == storage) {
            self.touched.push(storage.to_string());
        }
    }

    /// Storage nodes in the order they first received an allocation
    #[must_use]
    pub fn touched(&self) -> &[String] {
        &self.touched
    }

    /// Finish the run, returning the inventory and the compute selection
    #[must_use]
    pub fn into_parts(self) -> (Inventory, Vec<String>, Vec<String>) {
        (self.inventory, self.computes, self.touched)
    }
}

/// Tracking for the breakdown currently being allocated
#[derive(Debug, Default)]
pub struct BreakdownState<'r> {
    name: String,
    recipe: Option<&'r AllocationRecipe>,
    single_server: Vec<String>,
    by_label: HashMap<String, Vec<String>>,
}

impl<'r> BreakdownState<'r> {
    pub fn new(name: impl Into<String>, recipe: Option<&'r AllocationRecipe>) -> Self {
        Self {
            name: name.into(),
            recipe,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prescriptive recipe for this breakdown, if any
    #[must_use]
    pub const fn recipe(&self) -> Option<&'r AllocationRecipe> {
        self.recipe
    }

    /// Record a single-server placement
    pub fn record_single_server(&mut self, storage: &str, label: &str) {
        if !self.single_server.iter().any(|s| s == storage) {
            self.single_server.push(storage.to_string());
        }
        let nodes = self.by_label.entry(label.to_string()).or_default();
        if !nodes.iter().any(|s| s == storage) {
            nodes.push(storage.to_string());
        }
    }

    /// Storage nodes used by single-server placements, in first-use order
    #[must_use]
    pub fn single_server_nodes(&self) -> &[String] {
        &self.single_server
    }

    #[must_use]
    pub fn is_single_server_node(&self, storage: &str) -> bool {
        self.single_server.iter().any(|s| s == storage)
    }

    /// Check whether a label already has an allocation on a storage node
    #[must_use]
    pub fn label_uses(&self, label: &str, storage: &str) -> bool {
        self.by_label
            .get(label)
            .is_some_and(|nodes| nodes.iter().any(|s| s == storage))
    }
}

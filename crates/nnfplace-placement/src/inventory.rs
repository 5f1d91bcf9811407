//! Storage inventory representation
//!
//! An [`Inventory`] is built fresh for every allocation run. It keeps the
//! storage nodes in load order, which is the order every allocator scans
//! them in, and carries the remaining-capacity bookkeeping for that run.

use crate::source::{InventorySource, StorageRecord};
use nnfplace_common::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

/// Compute names reported generically by some systems ("Compute 0", ...)
static GENERIC_COMPUTE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^Compute [0-9]").expect("generic compute pattern is valid"));

/// Status string of a ready storage node
const READY: &str = "Ready";

/// A compute node attached to a storage node
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComputeRef {
    /// Compute name, unique within the inventory
    pub name: String,
    /// Reported status
    pub status: String,
    /// Name of the owning storage node
    pub storage: String,
}

impl ComputeRef {
    /// Check whether the compute reports ready
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case(READY)
    }
}

/// A storage node ("rabbit") and its attached computes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageNode {
    /// Unique name
    pub name: String,
    /// Reported status
    pub status: String,
    /// Total capacity in bytes
    pub capacity: u64,
    /// Capacity not yet allocated in this run
    pub remaining_capacity: u64,
    /// Allocations placed on this node in this run
    pub allocation_count: u32,
    /// Attached computes in reported order
    pub computes: Vec<ComputeRef>,
}

impl StorageNode {
    /// Create a storage node with no computes
    pub fn new(name: impl Into<String>, capacity: u64, ready: bool) -> Self {
        let status = if ready { READY } else { "NotReady" };
        Self {
            name: name.into(),
            status: status.to_string(),
            capacity,
            remaining_capacity: capacity,
            allocation_count: 0,
            computes: Vec::new(),
        }
    }

    /// Attach a compute
    #[must_use]
    pub fn with_compute(mut self, name: impl Into<String>, status: impl Into<String>) -> Self {
        self.computes.push(ComputeRef {
            name: name.into(),
            status: status.into(),
            storage: self.name.clone(),
        });
        self
    }

    /// Build a node from a storage record, normalizing compute names
    #[must_use]
    pub fn from_record(record: &StorageRecord) -> Self {
        let name = record.metadata.name.clone();
        let computes = record
            .data
            .access
            .computes
            .iter()
            // Some systems list the storage node in its own access list
            .filter(|c| c.name != name)
            .map(|c| ComputeRef {
                name: normalize_compute_name(&name, &c.name),
                status: c.status.clone(),
                storage: name.clone(),
            })
            .collect();

        Self {
            status: record.data.status.clone(),
            capacity: record.data.capacity,
            remaining_capacity: record.data.capacity,
            allocation_count: 0,
            computes,
            name,
        }
    }

    /// Check whether the node reports ready
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == READY
    }

    /// Check if the node can take an allocation of `requested` bytes
    #[must_use]
    pub const fn has_sufficient_capacity(&self, requested: u64) -> bool {
        requested < self.remaining_capacity
    }

    /// Deduct allocated capacity
    pub const fn deduct(&mut self, amount: u64) {
        self.remaining_capacity = self.remaining_capacity.saturating_sub(amount);
    }

    /// Capacity allocated so far in this run
    #[must_use]
    pub const fn used_capacity(&self) -> u64 {
        self.capacity - self.remaining_capacity
    }
}

/// Rewrite a generically numbered compute name so it is unique to its node
#[must_use]
pub fn normalize_compute_name(storage: &str, compute: &str) -> String {
    if GENERIC_COMPUTE_NAME.is_match(compute) {
        format!("{storage}-{}", compute.replace(' ', "-"))
    } else {
        compute.to_string()
    }
}

/// Storage nodes for one allocation run, in load order
#[derive(Clone, Debug, Default)]
pub struct Inventory {
    source: String,
    nodes: Vec<StorageNode>,
    index: HashMap<String, usize>,
}

impl Inventory {
    /// Create an empty inventory
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Build an inventory from nodes
    pub fn from_nodes(
        source: impl Into<String>,
        nodes: impl IntoIterator<Item = StorageNode>,
    ) -> Result<Self> {
        let mut inventory = Self::new(source);
        for node in nodes {
            inventory.insert(node)?;
        }
        Ok(inventory)
    }

    /// Load an inventory from a source
    ///
    /// Nodes that are not ready are dropped when `only_ready` is set. Fails
    /// with `NoInventory` when nothing remains and `require_non_empty` is set.
    pub fn load(
        source: &dyn InventorySource,
        only_ready: bool,
        require_non_empty: bool,
    ) -> Result<Self> {
        let mut inventory = Self::new(source.describe());
        for record in source.storage_records()? {
            let node = StorageNode::from_record(&record);
            debug!(storage = %node.name, computes = node.computes.len(), "processing storage node");
            if only_ready && !node.is_ready() {
                debug!(storage = %node.name, status = %node.status, "storage node is not ready, skipping");
                continue;
            }
            inventory.insert(node)?;
        }

        if require_non_empty && inventory.is_empty() {
            return Err(Error::NoInventory {
                source_name: inventory.source,
            });
        }
        Ok(inventory)
    }

    /// Add a node; names must be unique
    pub fn insert(&mut self, node: StorageNode) -> Result<()> {
        if self.index.contains_key(&node.name) {
            return Err(Error::invalid_argument(format!(
                "duplicate storage node name '{}' in {}",
                node.name, self.source
            )));
        }
        self.index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Description of where the inventory came from
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a node by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StorageNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Get a mutable node by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut StorageNode> {
        self.index.get(name).map(|&i| &mut self.nodes[i])
    }

    /// Nodes in load order
    pub fn iter(&self) -> impl Iterator<Item = &StorageNode> {
        self.nodes.iter()
    }

    /// Node names in load order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    /// All computes in load order
    pub fn computes(&self) -> impl Iterator<Item = &ComputeRef> {
        self.nodes.iter().flat_map(|n| n.computes.iter())
    }

    /// Check whether the inventory belongs to a KIND test cluster
    #[must_use]
    pub fn is_kind_environment(&self) -> bool {
        self.nodes
            .iter()
            .any(|n| n.name.trim().to_lowercase().starts_with("kind"))
    }

    /// Serializable view of the inventory
    #[must_use]
    pub fn summary(&self) -> InventorySummary {
        InventorySummary {
            source: self.source.clone(),
            nodes: self
                .nodes
                .iter()
                .map(|n| NodeSummary {
                    name: n.name.clone(),
                    status: n.status.clone(),
                    capacity: n.capacity,
                    remaining: n.remaining_capacity,
                    allocation_count: n.allocation_count,
                    computes: n.computes.clone(),
                })
                .collect(),
        }
    }
}

/// Inventory as rendered by `show-inventory`
#[derive(Clone, Debug, Serialize)]
pub struct InventorySummary {
    pub source: String,
    #[serde(rename = "nnfnodes")]
    pub nodes: Vec<NodeSummary>,
}

/// One storage node in an [`InventorySummary`]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub name: String,
    pub status: String,
    pub capacity: u64,
    pub remaining: u64,
    pub allocation_count: u32,
    pub computes: Vec<ComputeRef>,
}

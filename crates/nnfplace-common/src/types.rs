//! Core type definitions for nnfplace
//!
//! This module defines the records exchanged between the allocation engine
//! and its collaborators: allocation requests read from directive
//! breakdowns, the assignments written back to server records, and the
//! prescriptive recipes operators may supply instead of automatic placement.

use crate::error::Error;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Label whose per-compute allocation counts bound compute selection
pub const XFS_LABEL: &str = "xfs";

/// Normalize a storage or compute name for exclusion matching
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Placement strategy of an allocation request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Strategy {
    /// Replicate once per selected compute node
    #[display("AllocatePerCompute")]
    PerCompute,
    /// Place entirely on one storage node
    #[display("AllocateSingleServer")]
    SingleServer,
    /// Stripe across a fixed number of storage nodes
    #[display("AllocateAcrossServers")]
    AcrossServers,
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allocatepercompute" => Ok(Self::PerCompute),
            "allocatesingleserver" => Ok(Self::SingleServer),
            "allocateacrossservers" => Ok(Self::AcrossServers),
            _ => Err(Error::Deserialization(format!(
                "unknown allocation strategy: {s}"
            ))),
        }
    }
}

impl TryFrom<String> for Strategy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Strategy> for String {
    fn from(strategy: Strategy) -> Self {
        strategy.to_string()
    }
}

/// A single capacity/placement requirement from a directive breakdown
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRequest {
    /// Logical role (e.g. "mgt", "ost", "xfs")
    pub label: String,
    /// How the request is placed
    #[serde(rename = "allocationStrategy")]
    pub strategy: Strategy,
    /// Requested capacity in bytes
    pub minimum_capacity: u64,
    /// Must not share a storage node with another instance of the same label
    #[serde(default)]
    pub colocation_constrained: bool,
}

impl AllocationRequest {
    /// Create a new unconstrained request
    pub fn new(label: impl Into<String>, strategy: Strategy, minimum_capacity: u64) -> Self {
        Self {
            label: label.into(),
            strategy,
            minimum_capacity,
            colocation_constrained: false,
        }
    }

    /// Mark the request as colocation constrained
    #[must_use]
    pub fn with_colocation(mut self) -> Self {
        self.colocation_constrained = true;
        self
    }
}

/// Storage node and the number of allocation units placed on it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageCount {
    /// Storage node name
    pub name: String,
    /// Allocation units on this node
    pub allocation_count: u32,
}

impl StorageCount {
    pub fn new(name: impl Into<String>, allocation_count: u32) -> Self {
        Self {
            name: name.into(),
            allocation_count,
        }
    }
}

/// Placement decided for one allocation request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Logical role of the allocation
    pub label: String,
    /// Bytes per allocation unit
    pub allocation_size: u64,
    /// Storage nodes in placement order
    pub storage: Vec<StorageCount>,
}

impl Assignment {
    /// Total allocation units across all storage nodes
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.storage
            .iter()
            .map(|s| u64::from(s.allocation_count))
            .sum()
    }

    /// Storage node names in placement order
    pub fn storage_names(&self) -> impl Iterator<Item = &str> {
        self.storage.iter().map(|s| s.name.as_str())
    }
}

/// Handle to the external server record a breakdown's allocations patch
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{namespace}/{name}")]
pub struct ServerReference {
    pub name: String,
    pub namespace: String,
}

impl ServerReference {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// All assignments for one directive breakdown
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownAllocation {
    /// Breakdown name
    pub name: String,
    /// Server record to patch
    #[serde(rename = "serverObj")]
    pub server: Option<ServerReference>,
    /// Assignments in allocator order
    pub allocation_set: Vec<Assignment>,
}

impl BreakdownAllocation {
    pub fn new(name: impl Into<String>, server: Option<ServerReference>) -> Self {
        Self {
            name: name.into(),
            server,
            allocation_set: Vec::new(),
        }
    }

    /// Assignments for a given label
    pub fn assignments_for<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Assignment> {
        self.allocation_set.iter().filter(move |a| a.label == label)
    }
}

/// A server named by a recipe
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeServer {
    /// Storage node name
    pub name: String,
    /// Allocation units to place on it
    pub allocations: u32,
}

/// Recipe entry for one label
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeEntry {
    #[serde(default)]
    pub servers: Vec<RecipeServer>,
}

/// Operator-supplied placement that overrides automatic allocation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecipe {
    /// Entries keyed by allocation label
    #[serde(default)]
    pub allocs: BTreeMap<String, RecipeEntry>,
}

impl AllocationRecipe {
    /// Add servers for a label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>, servers: &[(&str, u32)]) -> Self {
        let entry = RecipeEntry {
            servers: servers
                .iter()
                .map(|(name, allocations)| RecipeServer {
                    name: (*name).to_string(),
                    allocations: *allocations,
                })
                .collect(),
        };
        self.allocs.insert(label.into(), entry);
        self
    }

    /// Servers prescribed for a label
    #[must_use]
    pub fn servers_for(&self, label: &str) -> Option<&[RecipeServer]> {
        self.allocs.get(label).map(|e| e.servers.as_slice())
    }
}

//! Collaborator boundaries of the allocation engine
//!
//! The engine never talks to the cluster itself. Inventory and breakdowns
//! are read through [`InventorySource`] and [`BreakdownSource`], and results
//! leave through a [`CommitSink`]. The record types here mirror the shapes
//! of the control-plane records so file-based sources and live clients can
//! share them.

use nnfplace_common::{
    AllocationRequest, Assignment, BreakdownAllocation, Error, Result, ServerReference, Strategy,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Record metadata
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(
        default,
        rename = "ownerReferences",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub owner_references: Vec<OwnerReference>,
}

/// Record that owns another record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
}

/// Owner kind of workflow-scoped records
pub const WORKFLOW_KIND: &str = "Workflow";

/// Storage record as published for each storage node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub metadata: RecordMetadata,
    pub data: StorageData,
}

impl StorageRecord {
    pub fn new(name: impl Into<String>, data: StorageData) -> Self {
        Self {
            metadata: RecordMetadata {
                name: name.into(),
                ..RecordMetadata::default()
            },
            data,
        }
    }
}

/// Status, capacity and access list of a storage record
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageData {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub capacity: u64,
    #[serde(default)]
    pub access: StorageAccess,
}

/// Computes with access to a storage node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAccess {
    #[serde(default)]
    pub computes: Vec<ComputeRecord>,
}

/// One compute in a storage record's access list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeRecord {
    pub name: String,
    #[serde(default)]
    pub status: String,
}

/// Supplies storage records for an inventory snapshot
pub trait InventorySource {
    /// Human-readable description of the source (e.g. "File-inventory.yaml")
    fn describe(&self) -> String;

    /// Fetch every storage record
    fn storage_records(&self) -> Result<Vec<StorageRecord>>;
}

/// In-memory inventory source
#[derive(Clone, Debug)]
pub struct StaticInventory {
    name: String,
    records: Vec<StorageRecord>,
}

impl StaticInventory {
    pub fn new(name: impl Into<String>, records: Vec<StorageRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

impl InventorySource for StaticInventory {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn storage_records(&self) -> Result<Vec<StorageRecord>> {
        Ok(self.records.clone())
    }
}

/// Layout of a static inventory file
#[derive(Debug, Deserialize)]
struct InventoryDocument {
    system: SystemSection,
}

#[derive(Debug, Deserialize)]
struct SystemSection {
    #[serde(default, rename = "nnf-nodes")]
    nnf_nodes: Option<Vec<StorageRecord>>,
}

/// YAML inventory file
///
/// ```yaml
/// system:
///   nnf-nodes:
///     - metadata: { name: rabbit-1 }
///       data:
///         status: Ready
///         capacity: 1000000
///         access:
///           computes:
///             - { name: nid0001, status: Ready }
/// ```
#[derive(Clone, Debug)]
pub struct InventoryFile {
    path: PathBuf,
}

impl InventoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse inventory file contents
    pub fn parse(text: &str) -> Result<Vec<StorageRecord>> {
        let document: InventoryDocument = serde_yaml::from_str(text)
            .map_err(|e| Error::Deserialization(format!("inventory file: {e}")))?;
        if document.system.nnf_nodes.is_none() {
            debug!("'nnf-nodes' array missing from inventory file");
        }
        Ok(document.system.nnf_nodes.unwrap_or_default())
    }
}

impl InventorySource for InventoryFile {
    fn describe(&self) -> String {
        format!("File-{}", self.path.display())
    }

    fn storage_records(&self) -> Result<Vec<StorageRecord>> {
        let text = std::fs::read_to_string(&self.path)?;
        Self::parse(&text)
    }
}

/// A job storage requirement and its allocation requests
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Breakdown {
    /// Breakdown name
    pub name: String,
    /// The `#dw` directive the breakdown was derived from
    pub directive: String,
    /// Server record that receives the allocations
    pub server: Option<ServerReference>,
    /// Requests in breakdown order
    pub requests: Vec<AllocationRequest>,
    /// Allocations already committed to the server record
    pub allocated: Vec<Assignment>,
}

impl Breakdown {
    pub fn new(name: impl Into<String>, directive: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directive: directive.into(),
            server: None,
            requests: Vec::new(),
            allocated: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_server(mut self, server: ServerReference) -> Self {
        self.server = Some(server);
        self
    }

    #[must_use]
    pub fn with_request(mut self, request: AllocationRequest) -> Self {
        self.requests.push(request);
        self
    }

    /// The `name=` argument of the directive, which recipes are keyed by
    #[must_use]
    pub fn directive_name(&self) -> Option<&str> {
        self.directive
            .split_whitespace()
            .find(|arg| arg.starts_with("name"))
            .and_then(|arg| arg.split('=').nth(1))
    }

    /// Already committed allocations as an allocation record
    #[must_use]
    pub fn committed(&self) -> BreakdownAllocation {
        BreakdownAllocation {
            name: self.name.clone(),
            server: self.server.clone(),
            allocation_set: self.allocated.clone(),
        }
    }
}

/// Directive breakdown record
#[derive(Clone, Debug, Deserialize)]
pub struct BreakdownRecord {
    pub metadata: RecordMetadata,
    pub spec: BreakdownSpec,
    #[serde(default)]
    pub status: BreakdownStatus,
}

impl BreakdownRecord {
    /// Whether the record belongs to `workflow`
    ///
    /// A record with no workflow owner is treated as belonging to any
    /// workflow.
    #[must_use]
    pub fn belongs_to(&self, workflow: &str) -> bool {
        let mut owners = self
            .metadata
            .owner_references
            .iter()
            .filter(|owner| owner.kind == WORKFLOW_KIND)
            .peekable();
        owners.peek().is_none() || owners.any(|owner| owner.name == workflow)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct BreakdownSpec {
    pub directive: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct BreakdownStatus {
    #[serde(default)]
    pub storage: Option<BreakdownStorage>,
    #[serde(default)]
    pub servers: Option<CommittedServers>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BreakdownStorage {
    #[serde(default)]
    pub reference: Option<ServerReference>,
    #[serde(default, rename = "allocationSets")]
    pub allocation_sets: Vec<AllocationSetRecord>,
}

/// One allocation set of a breakdown record
#[derive(Clone, Debug, Deserialize)]
pub struct AllocationSetRecord {
    pub label: String,
    #[serde(rename = "allocationStrategy")]
    pub strategy: Strategy,
    #[serde(rename = "minimumCapacity")]
    pub minimum_capacity: u64,
    #[serde(default)]
    pub constraints: Option<AllocationConstraints>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AllocationConstraints {
    #[serde(default)]
    pub colocation: Vec<serde_json::Value>,
}

/// Allocation sets already written to the server record
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CommittedServers {
    #[serde(default, rename = "allocationSets")]
    pub allocation_sets: Vec<Assignment>,
}

impl From<AllocationSetRecord> for AllocationRequest {
    fn from(record: AllocationSetRecord) -> Self {
        let colocation_constrained = record
            .constraints
            .is_some_and(|c| !c.colocation.is_empty());
        Self {
            label: record.label,
            strategy: record.strategy,
            minimum_capacity: record.minimum_capacity,
            colocation_constrained,
        }
    }
}

impl From<BreakdownRecord> for Breakdown {
    fn from(record: BreakdownRecord) -> Self {
        let (server, requests) = match record.status.storage {
            Some(storage) => (
                storage.reference,
                storage.allocation_sets.into_iter().map(Into::into).collect(),
            ),
            None => (None, Vec::new()),
        };
        Self {
            name: record.metadata.name,
            directive: record.spec.directive,
            server,
            requests,
            allocated: record
                .status
                .servers
                .map(|s| s.allocation_sets)
                .unwrap_or_default(),
        }
    }
}

/// Supplies the directive breakdowns of a workflow
pub trait BreakdownSource {
    fn breakdowns(&self, workflow: &str) -> Result<Vec<Breakdown>>;
}

/// In-memory breakdowns keyed by workflow
#[derive(Clone, Debug, Default)]
pub struct StaticBreakdowns {
    workflows: HashMap<String, Vec<Breakdown>>,
}

impl StaticBreakdowns {
    #[must_use]
    pub fn with_workflow(
        mut self,
        workflow: impl Into<String>,
        breakdowns: Vec<Breakdown>,
    ) -> Self {
        self.workflows.insert(workflow.into(), breakdowns);
        self
    }
}

impl BreakdownSource for StaticBreakdowns {
    fn breakdowns(&self, workflow: &str) -> Result<Vec<Breakdown>> {
        self.workflows
            .get(workflow)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("workflow '{workflow}'")))
    }
}

/// YAML file holding breakdown records
///
/// Records carrying a `Workflow` owner reference are only returned for that
/// workflow. Records without one are returned for every workflow, so a file
/// that holds a single workflow's breakdowns needs no owner references.
#[derive(Clone, Debug)]
pub struct BreakdownFile {
    path: PathBuf,
}

impl BreakdownFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn records(text: &str) -> Result<Vec<BreakdownRecord>> {
        serde_yaml::from_str(text)
            .map_err(|e| Error::Deserialization(format!("breakdown file: {e}")))
    }

    /// Parse breakdown file contents
    pub fn parse(text: &str) -> Result<Vec<Breakdown>> {
        Ok(Self::records(text)?.into_iter().map(Into::into).collect())
    }

    /// Parse breakdown file contents, keeping the records of `workflow`
    pub fn parse_workflow(text: &str, workflow: &str) -> Result<Vec<Breakdown>> {
        let mut breakdowns = Vec::new();
        for record in Self::records(text)? {
            if record.belongs_to(workflow) {
                breakdowns.push(record.into());
            } else {
                debug!(breakdown = %record.metadata.name, workflow, "breakdown belongs to another workflow");
            }
        }
        Ok(breakdowns)
    }
}

impl BreakdownSource for BreakdownFile {
    fn breakdowns(&self, workflow: &str) -> Result<Vec<Breakdown>> {
        debug!(workflow, path = %self.path.display(), "reading breakdowns");
        let text = std::fs::read_to_string(&self.path)?;
        Self::parse_workflow(&text, workflow)
    }
}

/// Receives the engine's results
pub trait CommitSink {
    /// Write a breakdown's allocation set to its server record
    fn commit_server_allocations(&mut self, allocation: &BreakdownAllocation) -> Result<()>;

    /// Write the selected computes to the workflow's compute record
    fn commit_compute_list(&mut self, workflow: &str, computes: &[String]) -> Result<()>;
}

/// Sink that keeps everything it is given
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    pub servers: Vec<BreakdownAllocation>,
    pub computes: Vec<(String, Vec<String>)>,
}

impl RecordingSink {
    /// Number of commit calls received
    #[must_use]
    pub fn calls(&self) -> usize {
        self.servers.len() + self.computes.len()
    }
}

impl CommitSink for RecordingSink {
    fn commit_server_allocations(&mut self, allocation: &BreakdownAllocation) -> Result<()> {
        self.servers.push(allocation.clone());
        Ok(())
    }

    fn commit_compute_list(&mut self, workflow: &str, computes: &[String]) -> Result<()> {
        self.computes.push((workflow.to_string(), computes.to_vec()));
        Ok(())
    }
}

/// Patch body for a server record
#[must_use]
pub fn server_patch(allocation: &BreakdownAllocation) -> serde_json::Value {
    serde_json::json!({ "spec": { "allocationSets": allocation.allocation_set } })
}

/// Patch body for a compute record
#[must_use]
pub fn compute_patch(computes: &[String]) -> serde_json::Value {
    let data: Vec<_> = computes
        .iter()
        .map(|c| serde_json::json!({ "name": c }))
        .collect();
    serde_json::json!({ "data": data })
}

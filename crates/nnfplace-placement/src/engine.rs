//! Allocation engine operations
//!
//! Each operation runs against its own inventory snapshot and returns an
//! [`AllocationOutcome`]. Nothing leaves the engine until the outcome is
//! handed to [`commit_outcome`].

use crate::allocator::allocator_for;
use crate::classify::classify;
use crate::compute::{ComputeLimits, ComputeSelector, select_computes};
use crate::inventory::Inventory;
use crate::policy::Policy;
use crate::run::{BreakdownState, Run};
use crate::source::{Breakdown, CommitSink};
use derive_more::Display;
use nnfplace_common::{AllocationRecipe, BreakdownAllocation, Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Recipes keyed by directive name
pub type Recipes = BTreeMap<String, AllocationRecipe>;

/// Engine operation that produced an outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, Serialize)]
pub enum Action {
    #[display("assignservers")]
    #[serde(rename = "assignservers")]
    AssignServers,
    #[display("assigncomputes")]
    #[serde(rename = "assigncomputes")]
    AssignComputes,
    #[display("assignresources")]
    #[serde(rename = "assignresources")]
    AssignResources,
}

impl Action {
    /// Whether the operation's compute list is written to the workflow
    #[must_use]
    pub const fn commits_computes(self) -> bool {
        !matches!(self, Self::AssignServers)
    }
}

/// Result of one allocation run
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationOutcome {
    #[serde(skip)]
    pub action: Action,
    /// Workflow name
    #[serde(rename = "name")]
    pub workflow: String,
    /// One allocation per breakdown, in breakdown order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub breakdowns: Vec<BreakdownAllocation>,
    /// Selected computes
    pub computes: Vec<String>,
    /// The inventory belongs to a KIND test cluster
    pub kind_environment: bool,
    /// Inventory with this run's deductions applied
    #[serde(skip)]
    pub inventory: Inventory,
}

/// Place every breakdown's requests, without compute backfill
///
/// The compute list holds only the computes chosen by per-compute
/// placement.
pub fn assign_servers(
    inventory: Inventory,
    policy: &Policy,
    recipes: &Recipes,
    workflow: &str,
    breakdowns: &[Breakdown],
) -> Result<AllocationOutcome> {
    policy.validate()?;
    require_inventory(&inventory)?;
    require_breakdowns(workflow, breakdowns)?;
    let kind_environment = detect_kind(&inventory);

    let mut run = Run::new(inventory, policy);
    let allocations = place_breakdowns(&mut run, recipes, breakdowns)?;
    let (inventory, computes, _) = run.into_parts();

    Ok(AllocationOutcome {
        action: Action::AssignServers,
        workflow: workflow.to_string(),
        breakdowns: allocations,
        computes,
        kind_environment,
        inventory,
    })
}

/// Select computes for breakdowns whose allocations are already recorded
pub fn assign_computes(
    inventory: Inventory,
    policy: &Policy,
    workflow: &str,
    breakdowns: &[Breakdown],
) -> Result<AllocationOutcome> {
    policy.validate()?;
    require_inventory(&inventory)?;
    let kind_environment = detect_kind(&inventory);

    let committed: Vec<BreakdownAllocation> = breakdowns.iter().map(Breakdown::committed).collect();
    let computes = select_computes(&inventory, policy, &committed)?;
    info!(workflow, computes = computes.len(), "computes selected");

    Ok(AllocationOutcome {
        action: Action::AssignComputes,
        workflow: workflow.to_string(),
        breakdowns: Vec::new(),
        computes,
        kind_environment,
        inventory,
    })
}

/// Place every breakdown's requests and complete the compute selection
pub fn assign_resources(
    inventory: Inventory,
    policy: &Policy,
    recipes: &Recipes,
    workflow: &str,
    breakdowns: &[Breakdown],
) -> Result<AllocationOutcome> {
    policy.validate()?;
    require_inventory(&inventory)?;

    let available = eligible_computes(&inventory, policy);
    if available < policy.required_compute_count {
        return Err(Error::incomplete(format!(
            "there are only {available} compute nodes available, however {} computes have been specified",
            policy.required_compute_count
        )));
    }
    require_breakdowns(workflow, breakdowns)?;
    let kind_environment = detect_kind(&inventory);

    let mut run = Run::new(inventory, policy);
    let allocations = place_breakdowns(&mut run, recipes, breakdowns)?;
    let (inventory, mut computes, touched) = run.into_parts();

    let limits = ComputeLimits::from_allocations(&allocations);
    ComputeSelector::new(&inventory, policy).extend(&mut computes, &touched, &limits)?;
    info!(workflow, computes = computes.len(), breakdowns = allocations.len(), "resources assigned");

    Ok(AllocationOutcome {
        action: Action::AssignResources,
        workflow: workflow.to_string(),
        breakdowns: allocations,
        computes,
        kind_environment,
        inventory,
    })
}

fn require_inventory(inventory: &Inventory) -> Result<()> {
    if inventory.is_empty() {
        return Err(Error::NoInventory {
            source_name: inventory.source().to_string(),
        });
    }
    Ok(())
}

fn require_breakdowns(workflow: &str, breakdowns: &[Breakdown]) -> Result<()> {
    if breakdowns.is_empty() {
        return Err(Error::incomplete(format!(
            "workflow '{workflow}' has no directive breakdowns"
        )));
    }
    Ok(())
}

fn detect_kind(inventory: &Inventory) -> bool {
    let kind = inventory.is_kind_environment();
    if kind {
        info!(source = %inventory.source(), "KIND environment detected, compute nodes will not be assigned");
    }
    kind
}

/// Computes that could be selected at all under the policy
fn eligible_computes(inventory: &Inventory, policy: &Policy) -> usize {
    inventory
        .iter()
        .filter(|node| !policy.is_storage_excluded(&node.name))
        .flat_map(|node| node.computes.iter())
        .filter(|compute| policy.accepts_compute(compute))
        .count()
}

fn place_breakdowns(
    run: &mut Run<'_>,
    recipes: &Recipes,
    breakdowns: &[Breakdown],
) -> Result<Vec<BreakdownAllocation>> {
    let mut allocations = Vec::with_capacity(breakdowns.len());
    for breakdown in breakdowns {
        let recipe = breakdown
            .directive_name()
            .and_then(|name| recipes.get(name));
        if recipe.is_some() {
            info!(breakdown = %breakdown.name, "breakdown has a prescriptive allocation");
        }

        let mut state = BreakdownState::new(&breakdown.name, recipe);
        let mut allocation = BreakdownAllocation::new(&breakdown.name, breakdown.server.clone());
        let classified = classify(&breakdown.requests);
        debug!(breakdown = %breakdown.name, requests = classified.len(), "processing breakdown");

        for (strategy, requests) in classified.in_allocation_order() {
            if requests.is_empty() {
                debug!(%strategy, "no requests to process");
                continue;
            }
            let allocator = allocator_for(strategy);
            for request in requests {
                let assignments = allocator.allocate(run, &mut state, request)?;
                allocation.allocation_set.extend(assignments);
            }
        }

        debug!(breakdown = %breakdown.name, assignments = allocation.allocation_set.len(), "all requests placed");
        allocations.push(allocation);
    }
    Ok(allocations)
}

/// Outcome of one commit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitResult {
    #[display("succeeded")]
    Succeeded,
    #[display("failed")]
    Failed,
    #[display("skipped")]
    Skipped,
}

/// Commit result for one target (a breakdown or the workflow's computes)
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub name: String,
    pub result: CommitResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommitReport {
    fn succeeded(name: &str) -> Self {
        Self {
            name: name.to_string(),
            result: CommitResult::Succeeded,
            message: None,
        }
    }

    fn failed(name: &str, err: &Error) -> Self {
        Self {
            name: name.to_string(),
            result: CommitResult::Failed,
            message: Some(err.to_string()),
        }
    }

    fn skipped(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            result: CommitResult::Skipped,
            message: Some(reason.to_string()),
        }
    }
}

/// Commit results for one outcome
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub reports: Vec<CommitReport>,
}

impl CommitSummary {
    /// Number of failed commits
    #[must_use]
    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.result == CommitResult::Failed)
            .count()
    }

    /// Fail with `SomeOperationFailed` if any commit failed
    pub fn into_result(self) -> Result<Self> {
        let failed = self.failed();
        if failed > 0 {
            return Err(Error::SomeOperationFailed {
                failed,
                total: self.reports.len(),
            });
        }
        Ok(self)
    }
}

/// Write an outcome through a sink
///
/// In preview mode the sink is never called. Otherwise every breakdown is
/// committed in order, continuing past failures, and the compute list is
/// written last unless the inventory is a KIND cluster.
pub fn commit_outcome(
    outcome: &AllocationOutcome,
    sink: &mut dyn CommitSink,
    preview: bool,
) -> CommitSummary {
    let mut summary = CommitSummary::default();

    for allocation in &outcome.breakdowns {
        let report = if preview {
            info!(breakdown = %allocation.name, "preview mode: server allocations not committed");
            CommitReport::skipped(&allocation.name, "preview")
        } else if let Some(server) = &allocation.server {
            match sink.commit_server_allocations(allocation) {
                Ok(()) => {
                    info!(breakdown = %allocation.name, %server, "server allocations committed");
                    CommitReport::succeeded(&allocation.name)
                }
                Err(err) => {
                    warn!(breakdown = %allocation.name, %server, error = %err, "failed to commit server allocations");
                    CommitReport::failed(&allocation.name, &err)
                }
            }
        } else {
            let err = Error::incomplete(format!(
                "breakdown '{}' has no server reference",
                allocation.name
            ));
            warn!(breakdown = %allocation.name, "{err}");
            CommitReport::failed(&allocation.name, &err)
        };
        summary.reports.push(report);
    }

    if outcome.action.commits_computes() {
        let name = outcome.workflow.as_str();
        let report = if preview {
            info!(workflow = name, "preview mode: computes not committed");
            CommitReport::skipped(name, "preview")
        } else if outcome.kind_environment {
            info!(workflow = name, "KIND environment: computes not committed");
            CommitReport::skipped(name, "KIND environment")
        } else {
            match sink.commit_compute_list(name, &outcome.computes) {
                Ok(()) => {
                    info!(workflow = name, computes = outcome.computes.len(), "compute list committed");
                    CommitReport::succeeded(name)
                }
                Err(err) => {
                    warn!(workflow = name, error = %err, "failed to commit compute list");
                    CommitReport::failed(name, &err)
                }
            }
        };
        summary.reports.push(report);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::StorageNode;
    use crate::source::RecordingSink;
    use nnfplace_common::{
        AllocationRequest, Assignment, ServerReference, StorageCount, Strategy,
    };
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;

    fn inventory() -> Inventory {
        Inventory::from_nodes(
            "test",
            (1..=3).map(|i| {
                StorageNode::new(format!("r{i}"), 1_000_000, true)
                    .with_compute(format!("c{i}a"), "Ready")
                    .with_compute(format!("c{i}b"), "Ready")
            }),
        )
        .unwrap()
    }

    fn lustre(name: &str) -> Breakdown {
        Breakdown::new(name, format!("#dw jobdw type=lustre capacity=1GiB name={name}"))
            .with_server(ServerReference::new(format!("{name}-srv"), "default"))
            .with_request(
                AllocationRequest::new("mgt", Strategy::SingleServer, 4_096).with_colocation(),
            )
            .with_request(
                AllocationRequest::new("mdt", Strategy::SingleServer, 4_096).with_colocation(),
            )
            .with_request(AllocationRequest::new("ost", Strategy::AcrossServers, 900_000))
    }

    fn xfs(name: &str) -> Breakdown {
        Breakdown::new(name, format!("#dw jobdw type=xfs capacity=10KiB name={name}"))
            .with_server(ServerReference::new(format!("{name}-srv"), "default"))
            .with_request(AllocationRequest::new("xfs", Strategy::PerCompute, 10_000))
    }

    /// Sink that rejects one breakdown
    struct FailingSink {
        fail_on: &'static str,
        inner: RecordingSink,
    }

    impl CommitSink for FailingSink {
        fn commit_server_allocations(&mut self, allocation: &BreakdownAllocation) -> Result<()> {
            if allocation.name == self.fail_on {
                return Err(Error::NotFound(format!("server for {}", allocation.name)));
            }
            self.inner.commit_server_allocations(allocation)
        }

        fn commit_compute_list(&mut self, workflow: &str, computes: &[String]) -> Result<()> {
            self.inner.commit_compute_list(workflow, computes)
        }
    }

    #[test]
    fn test_assign_resources_lustre() {
        let policy = Policy::new(2).with_reuse(false).with_across_servers(3, 1);
        let outcome =
            assign_resources(inventory(), &policy, &Recipes::new(), "wf", &[lustre("fs")]).unwrap();

        let set = &outcome.breakdowns[0].allocation_set;
        let labels: Vec<_> = set.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["mgt", "mdt", "ost"]);
        assert_eq!(set[0].storage, vec![StorageCount::new("r1", 1)]);
        assert_eq!(set[1].storage, vec![StorageCount::new("r2", 1)]);
        assert_eq!(set[2].storage_names().collect::<Vec<_>>(), vec!["r3", "r1", "r2"]);
        assert_eq!(set[2].allocation_size, 300_000);

        assert_eq!(outcome.computes, vec!["c1a", "c1b"]);
        assert_eq!(outcome.inventory.get("r1").unwrap().remaining_capacity, 695_904);
        assert!(!outcome.kind_environment);
    }

    #[test]
    fn test_assign_servers_per_compute() {
        let policy = Policy::new(4);
        let outcome =
            assign_servers(inventory(), &policy, &Recipes::new(), "wf", &[xfs("scratch")]).unwrap();
        assert_eq!(outcome.action, Action::AssignServers);
        assert_eq!(outcome.computes.len(), 4);
        let storage = &outcome.breakdowns[0].allocation_set[0].storage;
        assert!(storage.len() >= 2);
        for entry in storage {
            let node = outcome.inventory.get(&entry.name).unwrap();
            assert_eq!(node.used_capacity(), 10_000 * u64::from(entry.allocation_count));
        }
    }

    #[test]
    fn test_assign_servers_without_backfill() {
        let policy = Policy::new(2);
        let outcome =
            assign_servers(inventory(), &policy, &Recipes::new(), "wf", &[lustre("fs")]).unwrap();
        assert!(outcome.computes.is_empty());
    }

    #[test]
    fn test_too_many_computes() {
        let policy = Policy::new(7);
        let err = assign_servers(inventory(), &policy, &Recipes::new(), "wf", &[xfs("scratch")])
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientResources { .. }));

        // assign-resources counts computes before placing anything
        let err = assign_resources(inventory(), &policy, &Recipes::new(), "wf", &[xfs("scratch")])
            .unwrap_err();
        assert!(matches!(err, Error::Incomplete(_)));
    }

    #[test]
    fn test_no_breakdowns() {
        let err = assign_resources(inventory(), &Policy::default(), &Recipes::new(), "wf", &[])
            .unwrap_err();
        assert!(matches!(err, Error::Incomplete(ref msg) if msg.contains("wf")));
    }

    #[test]
    fn test_empty_inventory() {
        let empty = || Inventory::new("File-empty.yaml");
        let policy = Policy::default();
        let breakdowns = [lustre("fs")];

        let recipes = Recipes::new();

        let errors = [
            assign_resources(empty(), &policy, &recipes, "wf", &breakdowns).unwrap_err(),
            assign_servers(empty(), &policy, &recipes, "wf", &breakdowns).unwrap_err(),
            assign_computes(empty(), &policy, "wf", &breakdowns).unwrap_err(),
        ];
        for err in errors {
            assert!(matches!(err, Error::NoInventory { .. }), "unexpected error: {err}");
            assert!(err.to_string().contains("File-empty.yaml"));
            assert_eq!(err.code(), 106);
        }
    }

    #[test]
    fn test_recipe_selected_by_directive_name() {
        let mut recipes = Recipes::new();
        recipes.insert(
            "fs".to_string(),
            AllocationRecipe::default()
                .with_label("mgt", &[("r3", 1)])
                .with_label("mdt", &[("r3", 1)])
                .with_label("ost", &[("r1", 2), ("r2", 1)]),
        );
        let policy = Policy::new(1);
        let outcome = assign_resources(
            inventory(),
            &policy,
            &recipes,
            "wf",
            &[lustre("fs"), lustre("other")],
        )
        .unwrap();

        let prescribed = &outcome.breakdowns[0].allocation_set;
        assert_eq!(
            prescribed[2].storage,
            vec![StorageCount::new("r1", 2), StorageCount::new("r2", 1)]
        );
        assert_eq!(prescribed[2].allocation_size, 300_000);

        // The second breakdown is placed automatically
        let automatic = &outcome.breakdowns[1].allocation_set;
        assert_eq!(automatic[0].storage, vec![StorageCount::new("r1", 1)]);

        // Recipe nodes were touched first
        assert_eq!(outcome.computes, vec!["c3a"]);
    }

    #[test]
    fn test_recipe_missing_label() {
        let mut recipes = Recipes::new();
        recipes.insert(
            "fs".to_string(),
            AllocationRecipe::default().with_label("ost", &[("r1", 1)]),
        );
        let err = assign_servers(inventory(), &Policy::default(), &recipes, "wf", &[lustre("fs")])
            .unwrap_err();
        assert!(matches!(err, Error::General(_)));
    }

    #[test]
    fn test_preview_matches_commit() {
        let policy = Policy::new(2).with_across_servers(2, 1);
        let breakdowns = [lustre("fs"), xfs("scratch")];

        let previewed =
            assign_resources(inventory(), &policy, &Recipes::new(), "wf", &breakdowns).unwrap();
        let mut preview_sink = RecordingSink::default();
        let summary = commit_outcome(&previewed, &mut preview_sink, true);
        assert_eq!(preview_sink.calls(), 0);
        assert!(summary.reports.iter().all(|r| r.result == CommitResult::Skipped));

        let committed =
            assign_resources(inventory(), &policy, &Recipes::new(), "wf", &breakdowns).unwrap();
        let mut sink = RecordingSink::default();
        commit_outcome(&committed, &mut sink, false).into_result().unwrap();
        assert_eq!(sink.servers.len(), 2);
        assert_eq!(sink.computes, vec![("wf".to_string(), committed.computes.clone())]);

        assert_eq!(
            serde_json::to_string(&previewed).unwrap(),
            serde_json::to_string(&committed).unwrap()
        );
    }

    #[test]
    fn test_kind_environment_skips_computes() {
        let inventory = Inventory::from_nodes(
            "test",
            vec![
                StorageNode::new("kind-worker", 1_000_000, true)
                    .with_compute("kind-worker2", "Ready"),
            ],
        )
        .unwrap();
        let outcome = assign_resources(
            inventory,
            &Policy::default(),
            &Recipes::new(),
            "wf",
            &[xfs("scratch")],
        )
        .unwrap();
        assert!(outcome.kind_environment);

        let mut sink = RecordingSink::default();
        let summary = commit_outcome(&outcome, &mut sink, false);
        assert_eq!(sink.servers.len(), 1);
        assert!(sink.computes.is_empty());
        assert_eq!(summary.reports[1].result, CommitResult::Skipped);
    }

    #[test]
    fn test_commit_continues_past_failures() {
        let breakdowns = [lustre("a"), lustre("b"), lustre("c")];
        let mut outcome =
            assign_resources(inventory(), &Policy::new(1), &Recipes::new(), "wf", &breakdowns)
                .unwrap();
        outcome.breakdowns[2].server = None;

        let mut sink = FailingSink {
            fail_on: "a",
            inner: RecordingSink::default(),
        };
        let summary = commit_outcome(&outcome, &mut sink, false);
        let results: Vec<_> = summary.reports.iter().map(|r| r.result).collect();
        assert_eq!(
            results,
            vec![
                CommitResult::Failed,
                CommitResult::Succeeded,
                CommitResult::Failed,
                CommitResult::Succeeded,
            ]
        );
        assert_eq!(sink.inner.servers.len(), 1);
        assert_eq!(sink.inner.computes.len(), 1);

        let err = summary.into_result().unwrap_err();
        assert!(matches!(err, Error::SomeOperationFailed { failed: 2, total: 4 }));
        assert_eq!(err.code(), 107);
    }

    #[test]
    fn test_assign_servers_commits_no_computes() {
        let policy = Policy::new(2);
        let outcome =
            assign_servers(inventory(), &policy, &Recipes::new(), "wf", &[xfs("scratch")]).unwrap();
        let mut sink = RecordingSink::default();
        let summary = commit_outcome(&outcome, &mut sink, false);
        assert_eq!(summary.reports.len(), 1);
        assert!(sink.computes.is_empty());
    }

    #[test]
    fn test_assign_computes_from_committed() {
        let mut breakdown = xfs("scratch");
        breakdown.allocated.push(Assignment {
            label: "xfs".to_string(),
            allocation_size: 10_000,
            storage: vec![StorageCount::new("r2", 1)],
        });
        let outcome = assign_computes(inventory(), &Policy::new(3), "wf", &[breakdown]).unwrap();
        assert_eq!(outcome.action, Action::AssignComputes);
        assert_eq!(outcome.computes, vec!["c2a", "c1a", "c1b"]);
        assert!(outcome.breakdowns.is_empty());

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["name"], "wf");
        assert!(value.get("breakdowns").is_none());
    }

    #[test]
    fn test_randomized_invariants() {
        let mut rng = StdRng::seed_from_u64(0x6e6e_6670);

        for _ in 0..250 {
            let node_count: usize = rng.gen_range(1..=6);
            let mut nodes = Vec::with_capacity(node_count);
            for i in 0..node_count {
                let capacity = rng.gen_range(1_000..=1_000_000);
                let mut node = StorageNode::new(format!("rabbit-{i}"), capacity, true);
                let compute_count: usize = rng.gen_range(0..=4);
                for j in 0..compute_count {
                    let status = if rng.gen_bool(0.8) { "Ready" } else { "Offline" };
                    node = node.with_compute(format!("nid{i}{j}"), status);
                }
                nodes.push(node);
            }
            let excluded_storage = format!("RABBIT-{}", rng.gen_range(0..node_count));
            let excluded_compute = format!(" NID{}0", rng.gen_range(0..node_count));
            let policy = Policy::new(rng.gen_range(1..=6))
                .with_reuse(rng.gen_bool(0.5))
                .with_across_servers(rng.gen_range(1..=3), rng.gen_range(1..=2))
                .with_excluded_storage(&[excluded_storage])
                .with_excluded_computes(&[excluded_compute]);

            let mut breakdown = Breakdown::new("bd", "#dw jobdw type=lustre name=fs")
                .with_server(ServerReference::new("srv", "default"));
            if rng.gen_bool(0.5) {
                breakdown = breakdown.with_request(AllocationRequest::new(
                    "xfs",
                    Strategy::PerCompute,
                    rng.gen_range(1..=50_000),
                ));
            }
            for label in ["mgt", "mdt", "mdt"] {
                breakdown = breakdown.with_request(
                    AllocationRequest::new(label, Strategy::SingleServer, rng.gen_range(1..=50_000))
                        .with_colocation(),
                );
            }
            breakdown = breakdown.with_request(AllocationRequest::new(
                "ost",
                Strategy::AcrossServers,
                rng.gen_range(1..=2_000_000),
            ));

            let inventory = Inventory::from_nodes("random", nodes).unwrap();
            let capacities: HashMap<String, u64> =
                inventory.iter().map(|n| (n.name.clone(), n.capacity)).collect();

            let outcome = match assign_resources(
                inventory,
                &policy,
                &Recipes::new(),
                "wf",
                std::slice::from_ref(&breakdown),
            ) {
                Ok(outcome) => outcome,
                Err(err) => {
                    assert!(err.is_placement_failure(), "unexpected error: {err}");
                    continue;
                }
            };

            // Exact, distinct, non-excluded compute selection
            let mut distinct = outcome.computes.clone();
            distinct.sort();
            distinct.dedup();
            assert_eq!(distinct.len(), policy.required_compute_count);
            assert_eq!(outcome.computes.len(), policy.required_compute_count);
            assert!(outcome.computes.iter().all(|c| !policy.is_compute_excluded(c)));

            // Capacity conservation and storage exclusions
            let mut used: HashMap<&str, u64> = HashMap::new();
            let set = &outcome.breakdowns[0].allocation_set;
            for assignment in set {
                for storage in &assignment.storage {
                    assert!(!policy.is_storage_excluded(&storage.name));
                    *used.entry(storage.name.as_str()).or_default() +=
                        assignment.allocation_size * u64::from(storage.allocation_count);
                }
            }
            for node in outcome.inventory.iter() {
                let deducted = used.get(node.name.as_str()).copied().unwrap_or(0);
                assert_eq!(node.remaining_capacity + deducted, capacities[&node.name]);
            }

            // Colocation
            let mut mdt_nodes: Vec<&str> = set
                .iter()
                .filter(|a| a.label == "mdt")
                .flat_map(|a| a.storage_names())
                .collect();
            assert_eq!(mdt_nodes.len(), 2);
            mdt_nodes.dedup();
            assert_eq!(mdt_nodes.len(), 2);
        }
    }
}

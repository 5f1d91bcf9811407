//! Placement policy
//!
//! Operator input that shapes every allocator. A [`Policy`] is immutable for
//! the duration of a run.

use crate::inventory::ComputeRef;
use nnfplace_common::{Error, PlacementConfig, Result, normalize_name};
use std::collections::HashSet;

/// Operator policy for one allocation run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    /// Distinct computes the job needs
    pub required_compute_count: usize,
    /// Allow one storage node to host several single-server allocations
    pub reuse_single_server_storage: bool,
    /// Storage nodes an across-servers allocation is striped over
    pub across_server_count: u32,
    /// Allocation units per storage node for across-servers allocations
    pub allocations_per_server: u32,
    /// Consider computes regardless of their readiness
    pub ignore_readiness: bool,
    excluded_storage: HashSet<String>,
    excluded_computes: HashSet<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Policy {
    /// Create a policy with default settings
    #[must_use]
    pub fn new(required_compute_count: usize) -> Self {
        Self {
            required_compute_count,
            reuse_single_server_storage: true,
            across_server_count: 1,
            allocations_per_server: 1,
            ignore_readiness: false,
            excluded_storage: HashSet::new(),
            excluded_computes: HashSet::new(),
        }
    }

    /// Build and validate a policy from configuration
    pub fn from_config(config: &PlacementConfig) -> Result<Self> {
        let policy = Self::new(config.nodes)
            .with_reuse(config.reuse_rabbit)
            .with_across_servers(config.ost_count, config.ost_per_rabbit)
            .with_ignore_readiness(config.ignore_ready)
            .with_excluded_storage(config.exclude_rabbits.as_slice())
            .with_excluded_computes(config.exclude_computes.as_slice());
        policy.validate()?;
        Ok(policy)
    }

    /// Check that the policy can be satisfied at all
    pub fn validate(&self) -> Result<()> {
        if self.required_compute_count == 0 {
            return Err(Error::configuration("node count must be at least 1"));
        }
        if self.across_server_count == 0 {
            return Err(Error::configuration("ost count must be at least 1"));
        }
        if self.allocations_per_server == 0 {
            return Err(Error::configuration(
                "allocations per rabbit must be at least 1",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_reuse(mut self, reuse: bool) -> Self {
        self.reuse_single_server_storage = reuse;
        self
    }

    #[must_use]
    pub fn with_across_servers(mut self, count: u32, allocations_per_server: u32) -> Self {
        self.across_server_count = count;
        self.allocations_per_server = allocations_per_server;
        self
    }

    #[must_use]
    pub fn with_ignore_readiness(mut self, ignore: bool) -> Self {
        self.ignore_readiness = ignore;
        self
    }

    /// Add storage node exclusions (trimmed, case-insensitive)
    #[must_use]
    pub fn with_excluded_storage<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.excluded_storage
            .extend(names.iter().map(|n| normalize_name(n.as_ref())));
        self
    }

    /// Add compute exclusions (trimmed, case-insensitive)
    #[must_use]
    pub fn with_excluded_computes<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.excluded_computes
            .extend(names.iter().map(|n| normalize_name(n.as_ref())));
        self
    }

    #[must_use]
    pub fn is_storage_excluded(&self, name: &str) -> bool {
        self.excluded_storage.contains(&normalize_name(name))
    }

    #[must_use]
    pub fn is_compute_excluded(&self, name: &str) -> bool {
        self.excluded_computes.contains(&normalize_name(name))
    }

    /// Check whether a compute may be selected: not excluded, and ready
    /// unless readiness is ignored
    #[must_use]
    pub fn accepts_compute(&self, compute: &ComputeRef) -> bool {
        !self.is_compute_excluded(&compute.name) && (self.ignore_readiness || compute.is_ready())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compute(name: &str, status: &str) -> ComputeRef {
        ComputeRef {
            name: name.to_string(),
            status: status.to_string(),
            storage: "rabbit-1".to_string(),
        }
    }

    #[test]
    fn test_exclusions_are_case_insensitive() {
        let policy = Policy::new(1)
            .with_excluded_storage(&[" Rabbit-2 "])
            .with_excluded_computes(&["NID0001"]);
        assert!(policy.is_storage_excluded("rabbit-2"));
        assert!(policy.is_storage_excluded("RABBIT-2 "));
        assert!(!policy.is_storage_excluded("rabbit-1"));
        assert!(policy.is_compute_excluded(" nid0001"));
    }

    #[test]
    fn test_accepts_compute() {
        let policy = Policy::new(1).with_excluded_computes(&["nid0002"]);
        assert!(policy.accepts_compute(&compute("nid0001", "Ready")));
        assert!(!policy.accepts_compute(&compute("nid0002", "Ready")));
        assert!(!policy.accepts_compute(&compute("nid0003", "Offline")));

        let policy = policy.with_ignore_readiness(true);
        assert!(policy.accepts_compute(&compute("nid0003", "Offline")));
        assert!(!policy.accepts_compute(&compute("nid0002", "Ready")));
    }

    #[test]
    fn test_from_config() {
        let config = PlacementConfig {
            nodes: 4,
            exclude_rabbits: vec!["rabbit-9".to_string()],
            reuse_rabbit: false,
            ost_count: 3,
            ost_per_rabbit: 2,
            ..PlacementConfig::default()
        };
        let policy = Policy::from_config(&config).unwrap();
        assert_eq!(policy.required_compute_count, 4);
        assert!(!policy.reuse_single_server_storage);
        assert_eq!(policy.across_server_count, 3);
        assert_eq!(policy.allocations_per_server, 2);
        assert!(policy.is_storage_excluded("Rabbit-9"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PlacementConfig {
            ost_count: 0,
            ..PlacementConfig::default()
        };
        assert!(matches!(
            Policy::from_config(&config),
            Err(Error::Configuration(_))
        ));

        let config = PlacementConfig {
            nodes: 0,
            ..PlacementConfig::default()
        };
        assert!(Policy::from_config(&config).is_err());
    }
}

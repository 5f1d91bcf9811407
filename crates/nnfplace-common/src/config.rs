//! Configuration types for nnfplace
//!
//! Operator configuration is read from a TOML file. Every field has a
//! default, so an empty or partial file is valid; CLI flags are merged on
//! top by the binary.

use crate::error::Result;
use crate::types::AllocationRecipe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Root configuration for nnfplace
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Placement policy
    #[serde(default)]
    pub placement: PlacementConfig,
    /// Inventory source
    #[serde(default)]
    pub inventory: InventoryConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Prescriptive recipes keyed by directive name
    #[serde(default)]
    pub recipes: BTreeMap<String, AllocationRecipe>,
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Placement policy configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Number of compute nodes the job requires
    #[serde(default = "default_nodes")]
    pub nodes: usize,
    /// Storage nodes that must not be used
    #[serde(default)]
    pub exclude_rabbits: Vec<String>,
    /// Compute nodes that must not be used
    #[serde(default)]
    pub exclude_computes: Vec<String>,
    /// Allow one storage node to host several single-server allocations
    #[serde(default = "default_true")]
    pub reuse_rabbit: bool,
    /// Storage nodes an across-servers allocation is striped over
    #[serde(default = "default_one")]
    pub ost_count: u32,
    /// Allocation units per storage node for across-servers allocations
    #[serde(default = "default_one")]
    pub ost_per_rabbit: u32,
    /// Consider computes regardless of their readiness
    #[serde(default)]
    pub ignore_ready: bool,
    /// Compute allocations without committing them
    #[serde(default)]
    pub preview: bool,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            exclude_rabbits: Vec::new(),
            exclude_computes: Vec::new(),
            reuse_rabbit: true,
            ost_count: 1,
            ost_per_rabbit: 1,
            ignore_ready: false,
            preview: false,
        }
    }
}

/// Inventory source configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Static inventory file; when unset the inventory must come from the cluster
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const fn default_nodes() -> usize {
    1
}

const fn default_one() -> u32 {
    1
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

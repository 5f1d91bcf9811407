//! nnfplace CLI - file-driven burst-buffer placement
//!
//! Reads a storage inventory and a workflow's directive breakdowns from YAML
//! files, runs the placement engine, and prints the results as JSON. Commits
//! are written as JSON patch files into the `--out` directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nnfplace_common::{BreakdownAllocation, Config, Error, PlacementConfig};
use nnfplace_placement::{
    Action, AllocationOutcome, BreakdownFile, BreakdownSource, CommitSink, Inventory,
    InventoryFile, Policy, RecordingSink, assign_computes, assign_resources, assign_servers,
    commit_outcome, compute_patch, server_patch,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "nnfplace-cli")]
#[command(about = "Burst-buffer storage and compute placement")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "NNFPLACE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides config; RUST_LOG overrides both)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the storage inventory
    ShowInventory {
        /// Inventory file (YAML)
        #[arg(short, long)]
        inventory: Option<PathBuf>,
    },
    /// Place a workflow's allocations on storage nodes
    AssignServers(AssignArgs),
    /// Select compute nodes for a workflow's recorded allocations
    AssignComputes(AssignArgs),
    /// Place a workflow's allocations and select its compute nodes
    AssignResources(AssignArgs),
}

#[derive(clap::Args, Debug, Default)]
struct AssignArgs {
    /// Inventory file (YAML)
    #[arg(short, long)]
    inventory: Option<PathBuf>,

    /// Directive breakdown file (YAML)
    #[arg(short, long)]
    breakdowns: PathBuf,

    /// Workflow name
    #[arg(short, long)]
    workflow: String,

    /// Number of compute nodes the job requires
    #[arg(short, long)]
    nodes: Option<usize>,

    /// Storage nodes to exclude (comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude_rabbits: Vec<String>,

    /// Compute nodes to exclude (comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude_computes: Vec<String>,

    /// Do not place two single-server allocations on one storage node
    #[arg(long)]
    no_reuse: bool,

    /// Storage nodes per across-servers allocation
    #[arg(long)]
    ost_count: Option<u32>,

    /// Allocation units per storage node for across-servers allocations
    #[arg(long)]
    ost_per_rabbit: Option<u32>,

    /// Consider computes regardless of readiness
    #[arg(long)]
    ignore_ready: bool,

    /// Compute allocations without committing them
    #[arg(long)]
    preview: bool,

    /// Directory that receives commit patches
    #[arg(short, long)]
    out: Option<PathBuf>,
}

impl AssignArgs {
    /// Merge CLI flags over file configuration (CLI takes precedence)
    fn merge(&self, config: &PlacementConfig) -> PlacementConfig {
        let mut placement = config.clone();
        if let Some(nodes) = self.nodes {
            placement.nodes = nodes;
        }
        if !self.exclude_rabbits.is_empty() {
            placement.exclude_rabbits.clone_from(&self.exclude_rabbits);
        }
        if !self.exclude_computes.is_empty() {
            placement.exclude_computes.clone_from(&self.exclude_computes);
        }
        if self.no_reuse {
            placement.reuse_rabbit = false;
        }
        if let Some(count) = self.ost_count {
            placement.ost_count = count;
        }
        if let Some(per_rabbit) = self.ost_per_rabbit {
            placement.ost_per_rabbit = per_rabbit;
        }
        placement.ignore_ready |= self.ignore_ready;
        placement.preview |= self.preview;
        placement
    }
}

/// Writes commit patches as JSON files into a directory
#[derive(Debug)]
struct PatchDirSink {
    dir: PathBuf,
}

impl PatchDirSink {
    fn new(dir: impl Into<PathBuf>) -> nnfplace_common::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn write(&self, file_name: &str, value: &serde_json::Value) -> nnfplace_common::Result<()> {
        let path = self.dir.join(file_name);
        std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
        debug!(path = %path.display(), "patch written");
        Ok(())
    }
}

impl CommitSink for PatchDirSink {
    fn commit_server_allocations(
        &mut self,
        allocation: &BreakdownAllocation,
    ) -> nnfplace_common::Result<()> {
        let server = allocation.server.as_ref().ok_or_else(|| {
            Error::incomplete(format!("breakdown '{}' has no server reference", allocation.name))
        })?;
        self.write(
            &format!("servers-{}-{}.json", server.namespace, server.name),
            &server_patch(allocation),
        )
    }

    fn commit_compute_list(
        &mut self,
        workflow: &str,
        computes: &[String],
    ) -> nnfplace_common::Result<()> {
        self.write(&format!("computes-{workflow}.json"), &compute_patch(computes))
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config file {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn inventory_path(flag: Option<&PathBuf>, config: &Config) -> Result<PathBuf> {
    flag.or(config.inventory.file.as_ref())
        .cloned()
        .context("no inventory file given; use --inventory or set inventory.file")
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn show_inventory(path: &Path) -> Result<()> {
    let inventory = Inventory::load(&InventoryFile::new(path), false, false)?;
    print_json(&serde_json::to_value(inventory.summary())?)
}

fn assign(action: Action, args: &AssignArgs, config: &Config) -> Result<()> {
    let placement = args.merge(&config.placement);
    let policy = Policy::from_config(&placement)?;
    let inventory_file = inventory_path(args.inventory.as_ref(), config)?;
    let inventory = Inventory::load(&InventoryFile::new(&inventory_file), true, true)?;
    let breakdowns = BreakdownFile::new(&args.breakdowns).breakdowns(&args.workflow)?;
    info!(
        workflow = %args.workflow,
        breakdowns = breakdowns.len(),
        storage_nodes = inventory.len(),
        "starting allocation run"
    );

    let outcome: AllocationOutcome = match action {
        Action::AssignServers => assign_servers(
            inventory,
            &policy,
            &config.recipes,
            &args.workflow,
            &breakdowns,
        )?,
        Action::AssignComputes => {
            assign_computes(inventory, &policy, &args.workflow, &breakdowns)?
        }
        Action::AssignResources => assign_resources(
            inventory,
            &policy,
            &config.recipes,
            &args.workflow,
            &breakdowns,
        )?,
    };

    let summary = if placement.preview {
        commit_outcome(&outcome, &mut RecordingSink::default(), true)
    } else {
        let out = args
            .out
            .as_ref()
            .context("no commit target; use --out <dir> or --preview")?;
        commit_outcome(&outcome, &mut PatchDirSink::new(out)?, false)
    };

    let result = if summary.failed() == 0 { "succeeded" } else { "failed" };
    print_json(&serde_json::json!({
        "action": outcome.action.to_string(),
        "preview": placement.preview,
        "result": result,
        "results": outcome,
        "commits": summary.reports,
    }))?;

    summary.into_result()?;
    Ok(())
}

fn run(args: &Args, config: &Config) -> Result<()> {
    match &args.command {
        Commands::ShowInventory { inventory } => {
            show_inventory(&inventory_path(inventory.as_ref(), config)?)
        }
        Commands::AssignServers(assign_args) => assign(Action::AssignServers, assign_args, config),
        Commands::AssignComputes(assign_args) => {
            assign(Action::AssignComputes, assign_args, config)
        }
        Commands::AssignResources(assign_args) => {
            assign(Action::AssignResources, assign_args, config)
        }
    }
}

/// Exit status for a failed run
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<Error>().map_or(1, Error::code)
}

fn main() -> ExitCode {
    // Parse command line arguments
    let args = Args::parse();

    let config = load_config(args.config.as_deref());
    let log_level = args.log_level.clone().unwrap_or_else(|| {
        config
            .as_ref()
            .map_or_else(|_| "warn".to_string(), |c| c.logging.level.clone())
    });

    // Initialize logging; stdout is reserved for results
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = config.and_then(|config| run(&args, &config));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = exit_code(&err);
            error!(code, "{err:#}");
            // Per-target commit results have already been printed
            if !matches!(err.downcast_ref::<Error>(), Some(Error::SomeOperationFailed { .. })) {
                let failure = serde_json::json!({
                    "result": "failed",
                    "message": format!("{err:#}"),
                    "code": code,
                });
                println!("{failure:#}");
            }
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nnfplace_common::{Assignment, ServerReference, StorageCount};

    #[test]
    fn test_parse_assign_args() {
        let args = Args::try_parse_from([
            "nnfplace-cli",
            "assign-resources",
            "--inventory",
            "inv.yaml",
            "--breakdowns",
            "bd.yaml",
            "--workflow",
            "wf",
            "--nodes",
            "4",
            "--exclude-rabbits",
            "rabbit-1,rabbit-2",
            "--no-reuse",
            "--preview",
        ])
        .unwrap();

        let Commands::AssignResources(assign) = args.command else {
            panic!("expected assign-resources");
        };
        assert_eq!(assign.nodes, Some(4));
        assert_eq!(assign.exclude_rabbits, vec!["rabbit-1", "rabbit-2"]);
        assert!(assign.no_reuse);
        assert!(assign.preview);
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = PlacementConfig {
            nodes: 2,
            exclude_rabbits: vec!["rabbit-9".to_string()],
            exclude_computes: vec!["nid0009".to_string()],
            ost_count: 4,
            ..PlacementConfig::default()
        };
        let args = AssignArgs {
            nodes: Some(8),
            exclude_rabbits: vec!["rabbit-1".to_string()],
            no_reuse: true,
            ost_per_rabbit: Some(2),
            ..AssignArgs::default()
        };

        let merged = args.merge(&config);
        assert_eq!(merged.nodes, 8);
        assert_eq!(merged.exclude_rabbits, vec!["rabbit-1"]);
        assert_eq!(merged.exclude_computes, vec!["nid0009"]);
        assert!(!merged.reuse_rabbit);
        assert_eq!(merged.ost_count, 4);
        assert_eq!(merged.ost_per_rabbit, 2);
        assert!(!merged.preview);
    }

    #[test]
    fn test_inventory_path_resolution() {
        let mut config = Config::default();
        assert!(inventory_path(None, &config).is_err());

        config.inventory.file = Some(PathBuf::from("from-config.yaml"));
        assert_eq!(
            inventory_path(None, &config).unwrap(),
            PathBuf::from("from-config.yaml")
        );
        let flag = PathBuf::from("from-flag.yaml");
        assert_eq!(inventory_path(Some(&flag), &config).unwrap(), flag);
    }

    #[test]
    fn test_patch_dir_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PatchDirSink::new(dir.path().join("patches")).unwrap();

        let mut allocation =
            BreakdownAllocation::new("bd", Some(ServerReference::new("srv", "default")));
        allocation.allocation_set.push(Assignment {
            label: "mgt".to_string(),
            allocation_size: 4096,
            storage: vec![StorageCount::new("rabbit-1", 1)],
        });
        sink.commit_server_allocations(&allocation).unwrap();
        sink.commit_compute_list("wf", &["nid0001".to_string()])
            .unwrap();

        let text =
            std::fs::read_to_string(dir.path().join("patches/servers-default-srv.json")).unwrap();
        let patch: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(patch["spec"]["allocationSets"][0]["label"], "mgt");
        assert!(dir.path().join("patches/computes-wf.json").exists());

        allocation.server = None;
        assert!(matches!(
            sink.commit_server_allocations(&allocation),
            Err(Error::Incomplete(_))
        ));
    }

    #[test]
    fn test_exit_code_from_engine_error() {
        let err = anyhow::Error::from(Error::insufficient("ost", "none"));
        assert_eq!(exit_code(&err), 108);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }
}

//! nhgorchd - next hop group orchestration daemon.
//!
//! Replays a recorded APPL_DB change feed against the simulated SAI and
//! neighbor backends, driving [`NhgOrch`] the way the orchestration loop
//! would, and prints the resulting group tables as JSON.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use serde::Serialize;
use sonic_nhgorch::audit::{init_logging, init_logging_pretty};
use sonic_nhgorch::sim::{NeighborRecord, ReplayOp, SimCapabilities, SimNeighbors, SimSai};
use sonic_nhgorch::{
    GroupView, NextHopKey, NhgBudget, NhgContext, NhgOrch, NhgOrchConfig, NhgOrchStats,
};
use sonic_nhgorch::crm::CrmUsage;
use sonic_orch_common::Orch;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
    Pretty,
}

/// SONiC next hop group orchestration daemon
#[derive(Parser, Debug)]
#[command(name = "nhgorchd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Platform string, overrides the config file and `platform` env var
    #[arg(short = 'p', long)]
    platform: Option<String>,

    /// Seed for temporary group member selection
    #[arg(long)]
    seed: Option<u64>,

    /// SAI_SWITCH_ATTR_NUMBER_OF_ECMP_GROUPS reported by the simulated switch
    #[arg(long)]
    max_ecmp_groups: Option<u32>,

    /// JSON list of resolved neighbors
    #[arg(short = 'n', long)]
    neighbors: Option<PathBuf>,

    /// JSON list of change-feed entries to replay
    #[arg(short = 'o', long)]
    ops: PathBuf,

    /// Maximum number of task drives
    #[arg(long, default_value = "16")]
    max_rounds: usize,
}

#[derive(Serialize)]
struct Report {
    max_nhg_count: u32,
    synced_nhg_count: u32,
    groups: Vec<GroupView>,
    pending: Vec<String>,
    stats: NhgOrchStats,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match args.log_format {
        LogFormat::Text => {
            env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or(&args.log_level),
            )
            .init();
        }
        LogFormat::Json => init_logging(&args.log_level),
        LogFormat::Pretty => init_logging_pretty(&args.log_level),
    }

    match run(args).await {
        Ok(report) => {
            println!("{}", report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("nhgorchd failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<String> {
    let mut config = match &args.config {
        Some(path) => NhgOrchConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => NhgOrchConfig::default(),
    };
    if let Some(platform) = &args.platform {
        config = config.with_platform(platform.clone());
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let mut sai = SimSai::new();
    if let Some(max) = args.max_ecmp_groups {
        sai = sai.with_max_ecmp_groups(max);
    }
    let sai = Arc::new(sai);
    let capabilities = SimCapabilities::new();
    let budget = Arc::new(NhgBudget::from_switch(sai.as_ref(), &config, &capabilities));

    let neigh = Arc::new(SimNeighbors::new());
    if let Some(path) = &args.neighbors {
        load_neighbors(path, &neigh)?;
    }

    let ctx = NhgContext::new(sai, neigh, Arc::new(CrmUsage::new()), budget);
    let mut orch = NhgOrch::new(ctx, config);

    let ops: Vec<ReplayOp> = read_json(&args.ops)?;
    info!("Replaying {} change-feed entries", ops.len());
    for op in ops {
        if let Err(e) = orch.add_to_sync(&op.table, vec![op.entry]) {
            warn!("Skipping entry: {}", e);
        }
    }

    let mut rounds = 0;
    while orch.has_pending_tasks() && rounds < args.max_rounds {
        let before = orch.pending_count();
        orch.do_task().await;
        rounds += 1;
        if orch.pending_count() >= before {
            info!("No progress after round {}, stopping", rounds);
            break;
        }
    }

    let pending = orch.dump_pending_tasks();
    if !pending.is_empty() {
        warn!("{} entries still pending after {} rounds", pending.len(), rounds);
    }

    let report = Report {
        max_nhg_count: orch.max_nhg_count(),
        synced_nhg_count: orch.synced_nhg_count(),
        groups: orch.dump(),
        pending,
        stats: orch.stats().clone(),
    };
    serde_json::to_string_pretty(&report).context("failed to serialize report")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_neighbors(path: &Path, neigh: &SimNeighbors) -> Result<()> {
    let records: Vec<NeighborRecord> = read_json(path)?;
    for record in records {
        let key: NextHopKey = record
            .next_hop
            .parse()
            .with_context(|| format!("invalid next hop '{}'", record.next_hop))?;
        neigh.add_resolved(&key);
        if record.if_down {
            neigh.set_if_down(&key, true);
        }
    }
    info!("Loaded {} resolved next hops", neigh.len());
    Ok(())
}

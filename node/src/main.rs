// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Micro-Lending Simulator
//!
//! Entry point for the `microlend-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and replays a scenario against a
//! sled-backed lending engine.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — replay a JSON scenario and print the final snapshot
//! - `params`  — print the effective protocol parameters
//! - `version` — print build version information

mod cli;
mod logging;
mod metrics;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use microlend_protocol::config::ProtocolParams;
use microlend_protocol::storage::SledStore;

use cli::{Commands, MicrolendCli};
use logging::LogFormat;
use metrics::SimulatorMetrics;
use scenario::{Runner, Scenario};

fn main() -> Result<()> {
    let cli = MicrolendCli::parse();

    match cli.command {
        Commands::Run(args) => run_scenario(args),
        Commands::Params(args) => print_params(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Replays the scenario file and prints the resulting ledger snapshot to
/// stdout as JSON.
fn run_scenario(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, LogFormat::from_str_lossy(&args.log_format));

    let params = load_params(args.params.as_deref())?;
    let scenario = Scenario::from_path(&args.script)?;

    tracing::info!(
        script = %args.script.display(),
        steps = scenario.steps.len(),
        data_dir = ?args.data_dir,
        "starting scenario"
    );

    // --- Persistent storage ---
    let store = match &args.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create data directory: {}", dir.display()))?;
            SledStore::open(dir)
                .with_context(|| format!("failed to open record store at {}", dir.display()))?
        }
        None => SledStore::open_temporary().context("failed to open temporary record store")?,
    };
    tracing::info!(schema_version = store.schema_version()?, records = store.record_count(), "record store opened");

    // --- Metrics ---
    let metrics = if args.metrics {
        Some(SimulatorMetrics::new().context("failed to register metrics")?)
    } else {
        None
    };

    let mut runner = Runner::new(Arc::new(store), params, scenario.start, metrics);
    let snapshot = runner.run(&scenario)?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Some(metrics) = runner.metrics() {
        eprintln!("{}", metrics.encode().context("failed to encode metrics")?);
    }

    tracing::info!(
        steps = snapshot.steps,
        expected_failures = snapshot.expected_failures,
        "scenario finished"
    );
    Ok(())
}

/// Prints the protocol parameters after applying any overrides.
fn print_params(args: cli::ParamsArgs) -> Result<()> {
    let params = load_params(args.params.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

/// Defaults, overridden by the JSON document at `path` when given.
fn load_params(path: Option<&Path>) -> Result<ProtocolParams> {
    let Some(path) = path else {
        return Ok(ProtocolParams::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read parameters from {}", path.display()))?;
    ProtocolParams::from_json(&text).with_context(|| format!("invalid parameters in {}", path.display()))
}

/// Prints version information to stdout.
fn print_version() {
    println!("microlend-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc          {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

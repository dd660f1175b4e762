//! # CLI Interface
//!
//! Defines the command-line argument structure for `microlend-node` using
//! `clap` derive. Supports three subcommands: `run`, `params`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Micro-lending ledger simulator.
///
/// Replays a JSON scenario of ledger operations against a sled-backed
/// engine with an in-memory value ledger and a manual clock, then prints
/// the resulting state.
#[derive(Parser, Debug)]
#[command(
    name = "microlend-node",
    about = "Micro-lending ledger simulator",
    version,
    propagate_version = true
)]
pub struct MicrolendCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a scenario and print the final ledger snapshot.
    Run(RunArgs),
    /// Print the effective protocol parameters as JSON.
    Params(ParamsArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scenario file (JSON).
    #[arg(long, short = 's')]
    pub script: PathBuf,

    /// Directory for the sled record store.
    ///
    /// When omitted, records live in a temporary store discarded on exit.
    #[arg(long, short = 'd', env = "MICROLEND_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Protocol parameter overrides (JSON). Missing fields keep their defaults.
    #[arg(long, short = 'p', env = "MICROLEND_PARAMS")]
    pub params: Option<PathBuf>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "MICROLEND_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Dump Prometheus operation counters to stderr after the run.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for the `params` subcommand.
#[derive(Parser, Debug)]
pub struct ParamsArgs {
    /// Protocol parameter overrides (JSON) to merge over the defaults.
    #[arg(long, short = 'p', env = "MICROLEND_PARAMS")]
    pub params: Option<PathBuf>,
}

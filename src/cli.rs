use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pipeguard",
    version,
    about = "Pipeline audit, data contract and baseline parity checks"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(
        long,
        global = true,
        help = "Pipeline work directory (defaults to the current directory)"
    )]
    pub work_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Config file (defaults to <work-dir>/pipeguard.toml when present)"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Snapshot current artifacts, signatures and metrics as a baseline.
    CaptureBaseline {
        #[arg(long)]
        baseline_id: Option<String>,
        #[arg(long)]
        label: Option<String>,
    },
    /// Compare current artifacts against a captured baseline.
    CompareBaseline {
        #[arg(long, default_value = "latest", help = "latest, a baseline id, or a snapshot path")]
        baseline: String,
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Evaluate per-stage data contracts against current outputs.
    ContractCheck {
        #[arg(long, value_enum, default_value_t = ContractMode::Fail)]
        mode: ContractMode,
        #[arg(long, default_value = "all", help = "all, or comma-separated stage names")]
        stage: String,
    },
    /// Run the pipeline stages and audit everything they produced.
    Audit {
        #[arg(long, default_value = "latest")]
        baseline: String,
        #[arg(long, value_enum, default_value_t = StrictnessPolicy::FailOnKeyAnomalies)]
        strictness: StrictnessPolicy,
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long, default_value_t = false)]
        consistency_check: bool,
    },
    /// Check the environment without running anything.
    Preflight,
    /// List captured baselines, oldest first.
    Baselines,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContractMode {
    Fail,
    Warn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StrictnessPolicy {
    FailOnKeyAnomalies,
    FailOnFatal,
}

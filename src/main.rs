use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod domain;
mod services;

pub use cli::*;
pub use commands::*;
pub use domain::config::*;
pub use domain::constants::*;
pub use domain::models::*;
pub use services::output::*;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: &Cli) -> anyhow::Result<bool> {
    let work_dir = services::storage::resolve_work_dir(cli.work_dir.as_deref())?;
    let cfg = services::storage::load_config(&work_dir, cli.config.as_deref())?;
    tracing::debug!(work_dir = %work_dir.display(), "configuration loaded");

    if let Some(passed) = handle_baseline_commands(cli, &work_dir, &cfg)? {
        return Ok(passed);
    }
    if let Some(passed) = handle_check_commands(cli, &work_dir, &cfg)? {
        return Ok(passed);
    }
    if let Some(passed) = handle_audit_commands(cli, &work_dir, &cfg)? {
        return Ok(passed);
    }
    anyhow::bail!("unhandled command: {:?}", cli.command)
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            print_error(cli.json, &err);
            ExitCode::from(1)
        }
    }
}

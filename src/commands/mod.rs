//! Command handler layer.
//!
//! This module owns CLI-oriented orchestration and output wiring.
//!
//! ## Files
//! - `baseline.rs`: capture-baseline/compare-baseline/baselines.
//! - `checks.rs`: contract-check/preflight.
//! - `audit.rs`: the full staged audit run.
//!
//! ## Principles
//! - Parse/match CLI inputs here.
//! - Delegate business logic to `services/*`.
//! - Handlers return `None` for commands they do not own, otherwise
//!   whether the run passed; `main` maps that to the exit code.

pub mod audit;
pub mod baseline;
pub mod checks;

pub use audit::handle_audit_commands;
pub use baseline::handle_baseline_commands;
pub use checks::handle_check_commands;

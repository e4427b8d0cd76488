//! Service layer containing business logic and side-effect helpers.
//!
//! ## Service map
//! - `runner.rs`: stage execution with per-stage log tee.
//! - `preflight.rs`: environment checks and run manifest collection.
//! - `table.rs`: typed column tables loaded from CSV / JSON workbooks.
//! - `artifacts.rs`: presence, freshness, schema and quality-summary checks.
//! - `rules.rs` / `contracts.rs`: per-stage data contracts.
//! - `signature.rs`: order-independent artifact fingerprints.
//! - `snapshot.rs`: baseline capture, resolution and parity compare.
//! - `drift.rs`: metric drift classification.
//! - `log_scan.rs`: stage log pattern scanning.
//! - `report.rs`: report assembly plus markdown/CSV renderings.
//! - `storage.rs`: config loading, file helpers and the event log.
//! - `clock.rs`: timestamps and run ids.
//! - `output.rs`: JSON/text output helpers.
//!
//! ## Conventions
//! - Prefer pure helpers where possible.
//! - Side effects should be explicit and localized.
//! - Recoverable problems become findings; only setup errors propagate.

pub mod artifacts;
pub mod clock;
pub mod contracts;
pub mod drift;
pub mod log_scan;
pub mod output;
pub mod preflight;
pub mod report;
pub mod rules;
pub mod runner;
pub mod signature;
pub mod snapshot;
pub mod storage;
pub mod table;

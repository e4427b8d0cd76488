//! Shared data model layer (structs/constants only).
//!
//! ## Purpose
//! - Keep finding/report/signature structs in one place.
//! - Avoid cyclic imports and duplicated type definitions.
//! - Make JSON output schema changes explicit and reviewable.
//!
//! ## Files
//! - `models.rs`: findings, severities, report and manifest structs.
//! - `config.rs`: injectable rule tables and their built-in defaults.
//! - `constants.rs`: stable file names and output roots.
//! - `errors.rs`: setup errors that abort a command.
//!
//! ## Rule of thumb
//! Domain types should be data-only: no filesystem/process side effects.
//!
//! ## Compatibility note
//! Changes in these structs affect the written reports and `--json` output.
//! Keep schema-impacting changes synchronized with `docs/contracts/*`.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;

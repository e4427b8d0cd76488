use std::path::PathBuf;

/// Setup failures that abort a command before any report can be built.
///
/// Everything recoverable (unreadable artifacts, malformed JSON, missing
/// columns) is turned into a finding instead.
#[derive(thiserror::Error, Debug)]
pub enum GuardError {
    #[error("unsupported contract stages: {0:?}")]
    UnsupportedStage(Vec<String>),
    #[error("no baseline snapshots found under {0}")]
    NoBaselines(PathBuf),
    #[error("baseline snapshot not found: {0}")]
    BaselineNotFound(PathBuf),
    #[error("baseline manifest missing: {0}")]
    ManifestMissing(PathBuf),
    #[error("baseline snapshot already exists: {0}")]
    SnapshotExists(PathBuf),
    #[error("invalid log pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("unable to load table {path}: {reason}")]
    TableLoad { path: PathBuf, reason: String },
}

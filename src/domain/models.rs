use crate::cli::StrictnessPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize)]
pub struct JsonOut<T: Serialize> {
    pub ok: bool,
    pub data: T,
}

/// Ordered severity shared by every finding source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Preflight,
    Artifact,
    Schema,
    Numeric,
    Quality,
    Contract,
    Pipeline,
    Drift,
    Log,
    Parity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: Category,
    pub code: String,
    pub message: String,
}

impl Finding {
    pub fn new(
        severity: Severity,
        category: Category,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Warning,
    Fail,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Warning => "warning",
            Status::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub fatal: usize,
    pub error: usize,
    pub warning: usize,
    pub info: usize,
    pub total: usize,
}

impl SeverityCounts {
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::Fatal => counts.fatal += 1,
                Severity::Error => counts.error += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Info => counts.info += 1,
            }
            counts.total += 1;
        }
        counts
    }
}

/// `fail` on any error-or-worse, `warning` on any warning, else `pass`.
pub fn contract_status(counts: &SeverityCounts) -> Status {
    if counts.fatal > 0 || counts.error > 0 {
        Status::Fail
    } else if counts.warning > 0 {
        Status::Warning
    } else {
        Status::Pass
    }
}

pub fn audit_status(counts: &SeverityCounts, policy: StrictnessPolicy) -> Status {
    match policy {
        StrictnessPolicy::FailOnKeyAnomalies => contract_status(counts),
        StrictnessPolicy::FailOnFatal => {
            if counts.fatal > 0 {
                Status::Fail
            } else if counts.error > 0 || counts.warning > 0 {
                Status::Warning
            } else {
                Status::Pass
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactCheck {
    pub path: String,
    pub exists: bool,
    pub fresh: bool,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime_unix_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Ok,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_id: String,
    pub command: String,
    pub status: StageStatus,
    pub returncode: Option<i32>,
    pub started_unix_ms: Option<u64>,
    pub ended_unix_ms: Option<u64>,
    pub duration_s: Option<f64>,
    pub line_count: usize,
    pub log_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub started_unix_ms: u64,
    pub ended_unix_ms: u64,
    pub duration_s: f64,
    pub success: bool,
    pub stages: Vec<StageResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitInfo {
    pub branch: String,
    pub commit: String,
    pub dirty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub generated_unix_ms: u64,
    pub generated_utc: String,
    pub work_dir: String,
    pub tool_version: String,
    pub git: GitInfo,
    pub tool_versions: BTreeMap<String, String>,
    pub env_knobs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    Absolute,
    Relative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftRule {
    pub compare: CompareMode,
    pub warn: f64,
    pub fail: f64,
    /// A decrease is an improvement and never counts as drift.
    #[serde(default)]
    pub lower_is_better: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftLevel {
    Ok,
    OkImproved,
    Warning,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDrift {
    pub metric: String,
    pub current_value: f64,
    pub baseline_value: f64,
    pub delta: f64,
    pub abs_delta: f64,
    pub relative_delta: Option<f64>,
    pub compare_mode: CompareMode,
    pub warn_threshold: f64,
    pub fail_threshold: f64,
    pub severity: DriftLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityDigest {
    pub unique_count: usize,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSignature {
    pub row_count: usize,
    pub columns: Vec<String>,
    pub identity: BTreeMap<String, IdentityDigest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSignature {
    pub rows: usize,
    pub cols: usize,
    pub numeric_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactSignature {
    Table(TableSignature),
    Sheets {
        sheets: BTreeMap<String, SheetSignature>,
    },
    Binary {
        size_bytes: u64,
        sha256: String,
    },
}

impl ArtifactSignature {
    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactSignature::Table(_) => "table",
            ArtifactSignature::Sheets { .. } => "sheets",
            ArtifactSignature::Binary { .. } => "binary",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineManifest {
    pub baseline_id: String,
    pub label: Option<String>,
    pub captured_unix_ms: u64,
    pub captured_utc: String,
    pub artifacts: Vec<String>,
    pub copied_files: Vec<String>,
    pub missing_files: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub signatures: BTreeMap<String, ArtifactSignature>,
    #[serde(default)]
    pub signature_errors: BTreeMap<String, String>,
    #[serde(default)]
    pub join_audit: Option<serde_json::Value>,
    #[serde(default)]
    pub quality_excerpt: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureResult {
    pub baseline_id: String,
    pub baseline_dir: String,
    pub copied_files: Vec<String>,
    pub missing_files: Vec<String>,
    pub manifest_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotListing {
    pub baseline_id: String,
    pub label: Option<String>,
    pub captured_utc: String,
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParityReport {
    pub run_id: String,
    pub generated_unix_ms: u64,
    pub generated_utc: String,
    pub status: Status,
    pub summary: SeverityCounts,
    pub baseline_dir: String,
    pub baseline_manifest_path: String,
    pub findings: Vec<Finding>,
    pub metric_drift: Vec<MetricDrift>,
    pub current_metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageContractStatus {
    Pass,
    Warning,
    Fail,
    Missing,
    Skipped,
}

impl From<Status> for StageContractStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Pass => StageContractStatus::Pass,
            Status::Warning => StageContractStatus::Warning,
            Status::Fail => StageContractStatus::Fail,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageContractReport {
    pub stage: String,
    pub status: StageContractStatus,
    pub artifact_path: String,
    pub row_count: Option<usize>,
    pub column_count: Option<usize>,
    pub findings: Vec<Finding>,
    pub diagnostics: BTreeMap<String, f64>,
}

impl StageContractReport {
    pub fn empty(stage: &str, status: StageContractStatus, artifact_path: String) -> Self {
        Self {
            stage: stage.to_string(),
            status,
            artifact_path,
            row_count: None,
            column_count: None,
            findings: Vec::new(),
            diagnostics: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractReport {
    pub generated_unix_ms: u64,
    pub generated_utc: String,
    pub status: Status,
    pub summary: SeverityCounts,
    pub stages: Vec<String>,
    pub contracts: BTreeMap<String, StageContractReport>,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogHit {
    pub stage_id: String,
    pub log_path: String,
    pub line_number: usize,
    #[serde(flatten)]
    pub finding: Finding,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineInfo {
    pub mode: String,
    pub baseline_id: Option<String>,
    pub baseline_dir: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub sources: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub run_id: String,
    pub generated_unix_ms: u64,
    pub generated_utc: String,
    pub strictness: StrictnessPolicy,
    pub status: Status,
    pub summary: SeverityCounts,
    pub manifest: RunManifest,
    pub baseline: BaselineInfo,
    pub pipeline_run: PipelineRun,
    pub artifact_checks: BTreeMap<String, ArtifactCheck>,
    pub contracts: BTreeMap<String, StageContractReport>,
    pub current_metrics: BTreeMap<String, f64>,
    pub metric_drift: Vec<MetricDrift>,
    pub log_hits: Vec<LogHit>,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Serialize)]
pub struct PreflightReport {
    pub overall: Status,
    pub findings: Vec<Finding>,
}

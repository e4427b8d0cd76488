//! Baseline snapshots: capture, resolution and parity comparison.

use crate::domain::config::{GuardConfig, TableSpec};
use crate::domain::constants::{
    AUDIT_REPORT_FILENAME, BASELINE_MANIFEST_FILENAME, LATEST_AUDIT_COPY_RELPATH,
};
use crate::domain::errors::GuardError;
use crate::domain::models::{
    contract_status, ArtifactSignature, BaselineInfo, BaselineManifest, CaptureResult, Category,
    Finding, ParityReport, Severity, SeverityCounts, SnapshotListing,
};
use crate::services::table::Table;
use crate::services::{artifacts, clock, drift, report, signature, storage};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SUM_TOLERANCE: f64 = 1e-6;

/// What the work dir looks like right now, in manifest terms.
#[derive(Debug, Default)]
pub struct SnapshotState {
    pub missing: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub signatures: BTreeMap<String, ArtifactSignature>,
    pub signature_errors: BTreeMap<String, String>,
    pub join_audit: Option<Value>,
    pub quality_excerpt: BTreeMap<String, Value>,
}

fn table_state(work_dir: &Path, spec: &TableSpec, state: &mut SnapshotState) {
    let result = Table::load(&work_dir.join(&spec.path))
        .map_err(anyhow::Error::from)
        .and_then(|t| signature::table_signature(&t, &spec.identity_keys));
    match result {
        Ok(sig) => {
            if let Some(metric) = &spec.row_metric {
                state.metrics.insert(metric.clone(), sig.row_count as f64);
            }
            state
                .signatures
                .insert(spec.path.clone(), ArtifactSignature::Table(sig));
        }
        Err(e) => {
            state.signature_errors.insert(spec.path.clone(), e.to_string());
        }
    }
}

pub fn snapshot_state(work_dir: &Path, cfg: &GuardConfig) -> SnapshotState {
    let artifacts = &cfg.artifacts;
    let mut state = SnapshotState {
        missing: artifacts
            .required()
            .into_iter()
            .filter(|rel| !work_dir.join(rel).exists())
            .collect(),
        ..SnapshotState::default()
    };

    for spec in &artifacts.tables {
        if work_dir.join(&spec.path).exists() {
            table_state(work_dir, spec, &mut state);
        }
    }

    let qa_path = work_dir.join(&artifacts.quality_summary);
    if qa_path.exists() {
        match storage::read_json(&qa_path) {
            Ok(qa) => {
                state
                    .metrics
                    .extend(artifacts::extract_quality_metrics(&qa, &cfg.quality));
                state.quality_excerpt = artifacts::quality_excerpt(&qa, &cfg.quality);
            }
            Err(e) => {
                state
                    .signature_errors
                    .insert(artifacts.quality_summary.clone(), e.to_string());
            }
        }
    }

    let join_path = work_dir.join(&artifacts.join_audit.path);
    if join_path.exists() {
        match storage::read_json(&join_path) {
            Ok(join) => state.join_audit = Some(join),
            Err(e) => {
                state
                    .signature_errors
                    .insert(artifacts.join_audit.path.clone(), e.to_string());
            }
        }
    }

    for rel in artifacts.other.iter().chain(&artifacts.analysis_exports) {
        let path = work_dir.join(rel);
        if !path.exists() {
            continue;
        }
        match signature::export_signature(&path) {
            Ok(sig) => {
                state.signatures.insert(rel.clone(), sig);
            }
            Err(e) => {
                state.signature_errors.insert(rel.clone(), e.to_string());
            }
        }
    }
    state
}

fn sanitize_label(label: &str) -> String {
    let mut out = String::new();
    for c in label.trim().chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn latest_audit_report(audit_root: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(audit_root).ok()?;
    entries
        .filter_map(Result::ok)
        .map(|e| e.path().join(AUDIT_REPORT_FILENAME))
        .filter(|p| p.is_file())
        .filter_map(|p| storage::mtime_ms(&p).map(|m| (m, p)))
        .max()
        .map(|(_, p)| p)
}

pub fn capture(
    work_dir: &Path,
    cfg: &GuardConfig,
    baseline_id: Option<&str>,
    label: Option<&str>,
) -> anyhow::Result<CaptureResult> {
    let captured = clock::now_unix_ms();
    let baseline_id = baseline_id
        .map(str::to_string)
        .unwrap_or_else(|| clock::timestamp_id(captured));
    let dir_name = match label.map(sanitize_label).filter(|l| !l.is_empty()) {
        Some(label) => format!("{baseline_id}_{label}"),
        None => baseline_id.clone(),
    };
    let root = work_dir.join(&cfg.output.baseline_root);
    let dir = root.join(dir_name);
    if dir.exists() {
        return Err(GuardError::SnapshotExists(dir).into());
    }
    std::fs::create_dir_all(&dir)?;

    let required = cfg.artifacts.required();
    let mut copied_files = Vec::new();
    let mut missing_files = Vec::new();
    for rel in &required {
        let src = work_dir.join(rel);
        if src.exists() {
            storage::copy_file(&src, &dir.join(rel))?;
            copied_files.push(rel.clone());
        } else {
            missing_files.push(rel.clone());
        }
    }
    if let Some(audit) = latest_audit_report(&work_dir.join(&cfg.output.audit_root)) {
        storage::copy_file(&audit, &dir.join(LATEST_AUDIT_COPY_RELPATH))?;
        copied_files.push(LATEST_AUDIT_COPY_RELPATH.to_string());
    }

    let state = snapshot_state(work_dir, cfg);
    let manifest = BaselineManifest {
        baseline_id: baseline_id.clone(),
        label: label.map(str::to_string),
        captured_unix_ms: captured,
        captured_utc: clock::iso_utc(captured),
        artifacts: required,
        copied_files: copied_files.clone(),
        missing_files: missing_files.clone(),
        metrics: state.metrics,
        signatures: state.signatures,
        signature_errors: state.signature_errors,
        join_audit: state.join_audit,
        quality_excerpt: state.quality_excerpt,
    };
    let manifest_path = dir.join(BASELINE_MANIFEST_FILENAME);
    storage::write_json(&manifest_path, &manifest)?;
    info!(
        baseline_id = %baseline_id,
        copied = copied_files.len(),
        missing = missing_files.len(),
        "baseline captured"
    );
    storage::audit(
        work_dir,
        "capture_baseline",
        serde_json::json!({"baseline_id": baseline_id, "missing_files": missing_files}),
    );

    Ok(CaptureResult {
        baseline_id,
        baseline_dir: dir.to_string_lossy().to_string(),
        copied_files,
        missing_files,
        manifest_path: manifest_path.to_string_lossy().to_string(),
    })
}

pub fn load_manifest(dir: &Path) -> anyhow::Result<BaselineManifest> {
    let path = dir.join(BASELINE_MANIFEST_FILENAME);
    if !path.is_file() {
        return Err(GuardError::ManifestMissing(path).into());
    }
    let raw = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Every readable snapshot under the root, oldest first.
pub fn list(work_dir: &Path, cfg: &GuardConfig) -> Vec<(PathBuf, BaselineManifest)> {
    let root = work_dir.join(&cfg.output.baseline_root);
    let Ok(entries) = std::fs::read_dir(&root) else {
        return Vec::new();
    };
    let mut out: Vec<(PathBuf, BaselineManifest)> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.join(BASELINE_MANIFEST_FILENAME).is_file())
        .filter_map(|dir| match load_manifest(&dir) {
            Ok(m) => Some((dir, m)),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "unreadable baseline manifest");
                None
            }
        })
        .collect();
    out.sort_by(|a, b| {
        a.1.captured_unix_ms
            .cmp(&b.1.captured_unix_ms)
            .then_with(|| a.0.cmp(&b.0))
    });
    out
}

pub fn listings(work_dir: &Path, cfg: &GuardConfig) -> Vec<SnapshotListing> {
    list(work_dir, cfg)
        .into_iter()
        .map(|(dir, m)| SnapshotListing {
            baseline_id: m.baseline_id,
            label: m.label,
            captured_utc: m.captured_utc,
            dir: dir.to_string_lossy().to_string(),
        })
        .collect()
}

/// `latest`, an absolute directory, or an id / directory name under the root.
pub fn resolve(work_dir: &Path, cfg: &GuardConfig, selector: &str) -> Result<PathBuf, GuardError> {
    let root = work_dir.join(&cfg.output.baseline_root);
    if selector == "latest" {
        return list(work_dir, cfg)
            .pop()
            .map(|(dir, _)| dir)
            .ok_or(GuardError::NoBaselines(root));
    }
    let candidate = Path::new(selector);
    let dir = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(selector)
    };
    if dir.is_dir() {
        if !dir.join(BASELINE_MANIFEST_FILENAME).is_file() {
            return Err(GuardError::ManifestMissing(dir.join(BASELINE_MANIFEST_FILENAME)));
        }
        return Ok(dir);
    }
    list(work_dir, cfg)
        .into_iter()
        .rev()
        .find(|(_, m)| m.baseline_id == selector)
        .map(|(dir, _)| dir)
        .ok_or(GuardError::BaselineNotFound(dir))
}

fn parity(severity: Severity, code: &str, message: String) -> Finding {
    Finding::new(severity, Category::Parity, code, message)
}

fn compare_tables(
    cfg: &GuardConfig,
    baseline: &BaselineManifest,
    current: &SnapshotState,
    out: &mut Vec<Finding>,
) {
    for spec in &cfg.artifacts.tables {
        let (Some(ArtifactSignature::Table(base)), Some(ArtifactSignature::Table(cur))) = (
            baseline.signatures.get(&spec.path),
            current.signatures.get(&spec.path),
        ) else {
            if let Some(err) = current.signature_errors.get(&spec.path) {
                out.push(parity(
                    Severity::Fatal,
                    "id_contract_mismatch",
                    format!("{} signature unavailable: {err}", spec.name),
                ));
            }
            continue;
        };
        let changed: Vec<&str> = base
            .identity
            .iter()
            .filter(|(key, digest)| cur.identity.get(*key) != Some(*digest))
            .map(|(key, _)| key.as_str())
            .collect();
        if !changed.is_empty() {
            out.push(parity(
                Severity::Fatal,
                "id_contract_mismatch",
                format!("{} identity keys changed: {changed:?}", spec.name),
            ));
        }
        if base.row_count != cur.row_count {
            out.push(parity(
                Severity::Error,
                "row_count_mismatch",
                format!(
                    "{} rows changed from {} to {}.",
                    spec.name, base.row_count, cur.row_count
                ),
            ));
        }
    }
}

fn compare_exports(
    cfg: &GuardConfig,
    baseline: &BaselineManifest,
    current: &SnapshotState,
    out: &mut Vec<Finding>,
) {
    for rel in cfg.artifacts.other.iter().chain(&cfg.artifacts.analysis_exports) {
        let (base, cur) = match (baseline.signatures.get(rel), current.signatures.get(rel)) {
            (None, None) => continue,
            (Some(_), None) if current.signature_errors.contains_key(rel) => continue,
            (None, Some(_)) => {
                out.push(parity(
                    Severity::Info,
                    "analysis_export_added",
                    format!("{rel} has no baseline signature."),
                ));
                continue;
            }
            (Some(_), None) => {
                out.push(parity(
                    Severity::Fatal,
                    "analysis_export_missing",
                    format!("{rel} could not be fingerprinted in the current run."),
                ));
                continue;
            }
            (Some(b), Some(c)) => (b, c),
        };
        match (base, cur) {
            (ArtifactSignature::Sheets { sheets: b }, ArtifactSignature::Sheets { sheets: c }) => {
                if b.keys().ne(c.keys()) {
                    out.push(parity(
                        Severity::Fatal,
                        "analysis_sheet_mismatch",
                        format!(
                            "{rel} sheets changed from {:?} to {:?}.",
                            b.keys().collect::<Vec<_>>(),
                            c.keys().collect::<Vec<_>>()
                        ),
                    ));
                    continue;
                }
                for (name, bs) in b {
                    let Some(cs) = c.get(name) else { continue };
                    if bs.rows != cs.rows || bs.cols != cs.cols {
                        out.push(parity(
                            Severity::Warning,
                            "analysis_shape_changed",
                            format!(
                                "{rel}:{name} shape changed from {}x{} to {}x{}.",
                                bs.rows, bs.cols, cs.rows, cs.cols
                            ),
                        ));
                    }
                    let diff = (bs.numeric_sum - cs.numeric_sum).abs();
                    let comparable = bs.numeric_sum.is_finite() && cs.numeric_sum.is_finite();
                    if comparable && diff > SUM_TOLERANCE {
                        out.push(parity(
                            Severity::Warning,
                            "analysis_numeric_sum_drift",
                            format!(
                                "{rel}:{name} numeric sum changed from {} to {}.",
                                bs.numeric_sum, cs.numeric_sum
                            ),
                        ));
                    }
                }
            }
            (
                ArtifactSignature::Binary { sha256: b, .. },
                ArtifactSignature::Binary { sha256: c, .. },
            ) => {
                if b != c {
                    out.push(parity(
                        Severity::Warning,
                        "analysis_binary_hash_drift",
                        format!("{rel} content hash changed."),
                    ));
                }
            }
            (b, c) => out.push(parity(
                Severity::Fatal,
                "analysis_kind_mismatch",
                format!("{rel} changed kind from {} to {}.", b.kind(), c.kind()),
            )),
        }
    }
}

/// Non-table artifacts that exist but could not be parsed or fingerprinted.
/// Table load failures surface through `compare_tables`.
fn unreadable_artifacts(cfg: &GuardConfig, current: &SnapshotState, out: &mut Vec<Finding>) {
    for (rel, err) in &current.signature_errors {
        if cfg.artifacts.tables.iter().any(|t| &t.path == rel) {
            continue;
        }
        out.push(parity(
            Severity::Fatal,
            "unreadable_artifact",
            format!("{rel} could not be read: {err}"),
        ));
    }
}

fn compare_join(
    cfg: &GuardConfig,
    baseline: &BaselineManifest,
    current: &SnapshotState,
    out: &mut Vec<Finding>,
) {
    let field = &cfg.artifacts.join_audit.match_field;
    let Some(join) = current.join_audit.as_ref() else {
        return;
    };
    let cur = artifacts::join_match_count(join, field);
    if cur == 0 {
        out.push(parity(
            Severity::Fatal,
            "join_zero_matches",
            format!("{} reported zero matched rows.", cfg.artifacts.join_audit.path),
        ));
    }
    if let Some(base) = baseline
        .join_audit
        .as_ref()
        .map(|j| artifacts::join_match_count(j, field))
    {
        if base != cur {
            out.push(parity(
                Severity::Info,
                "join_match_count_delta",
                format!("Join matched rows changed from {base} to {cur} ({:+}).", cur - base),
            ));
        }
    }
}

pub fn compare(
    work_dir: &Path,
    cfg: &GuardConfig,
    selector: &str,
    run_id: &str,
) -> anyhow::Result<ParityReport> {
    let baseline_dir = resolve(work_dir, cfg, selector)?;
    let baseline = load_manifest(&baseline_dir)?;
    let current = snapshot_state(work_dir, cfg);

    let mut findings = Vec::new();
    let mut metric_drift = Vec::new();
    if !current.missing.is_empty() {
        findings.push(parity(
            Severity::Fatal,
            "missing_artifact",
            format!("Missing required artifacts: {:?}", current.missing),
        ));
    } else {
        unreadable_artifacts(cfg, &current, &mut findings);
        compare_tables(cfg, &baseline, &current, &mut findings);
        compare_exports(cfg, &baseline, &current, &mut findings);
        compare_join(cfg, &baseline, &current, &mut findings);
        metric_drift = drift::classify_drift(&current.metrics, &baseline.metrics, &cfg.drift_rules);
        findings.extend(drift::drift_findings(&metric_drift));
    }

    let summary = SeverityCounts::from_findings(&findings);
    let generated = clock::now_unix_ms();
    debug!(baseline = %baseline.baseline_id, findings = findings.len(), "parity compared");
    Ok(ParityReport {
        run_id: run_id.to_string(),
        generated_unix_ms: generated,
        generated_utc: clock::iso_utc(generated),
        status: contract_status(&summary),
        summary,
        baseline_dir: baseline_dir.to_string_lossy().to_string(),
        baseline_manifest_path: baseline_dir
            .join(BASELINE_MANIFEST_FILENAME)
            .to_string_lossy()
            .to_string(),
        findings,
        metric_drift,
        current_metrics: current.metrics,
    })
}

pub fn write_parity_outputs(
    report: &ParityReport,
    out_dir: &Path,
) -> anyhow::Result<(PathBuf, PathBuf)> {
    let json_path = out_dir.join("parity_report.json");
    let md_path = out_dir.join("parity_summary.md");
    storage::write_json(&json_path, report)?;
    storage::write_text(&md_path, &report::parity_markdown(report))?;
    Ok((json_path, md_path))
}

/// Baseline metrics for an audit: the resolved snapshot first, then the
/// quality summary as it stood before the stages ran.
pub fn audit_baseline(
    work_dir: &Path,
    cfg: &GuardConfig,
    selector: &str,
    pre_run_quality: Option<&Value>,
) -> BaselineInfo {
    let mut info = BaselineInfo {
        mode: "unavailable".to_string(),
        ..BaselineInfo::default()
    };

    let snapshot = resolve(work_dir, cfg, selector)
        .map_err(anyhow::Error::from)
        .and_then(|dir| load_manifest(&dir).map(|m| (dir, m)));
    match snapshot {
        Ok((dir, manifest)) => {
            info.mode = "snapshot".to_string();
            info.baseline_id = Some(manifest.baseline_id.clone());
            info.baseline_dir = Some(dir.to_string_lossy().to_string());
            for (name, value) in &manifest.metrics {
                info.metrics.insert(name.clone(), *value);
                info.sources.insert(name.clone(), "baseline_manifest".to_string());
            }
            for spec in &cfg.artifacts.tables {
                let (Some(metric), Some(ArtifactSignature::Table(sig))) =
                    (&spec.row_metric, manifest.signatures.get(&spec.path))
                else {
                    continue;
                };
                if !info.metrics.contains_key(metric) {
                    info.metrics.insert(metric.clone(), sig.row_count as f64);
                    info.sources.insert(metric.clone(), "baseline_signature".to_string());
                }
            }
        }
        Err(e) => debug!(error = %e, "no baseline snapshot for audit"),
    }

    if let Some(qa) = pre_run_quality {
        let mut used = false;
        for (name, value) in artifacts::extract_quality_metrics(qa, &cfg.quality) {
            if !info.metrics.contains_key(&name) {
                info.sources.insert(name.clone(), "pre_run_quality_summary".to_string());
                info.metrics.insert(name, value);
                used = true;
            }
        }
        if used && info.mode == "unavailable" {
            info.mode = "pre_run_quality_summary".to_string();
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constants::*;
    use crate::domain::models::Status;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn seed(root: &Path) {
        let cohort = format!("{DATA_DIRNAME}/{CANONICAL_COHORT_FILENAME}");
        let nlp = format!("{DATA_DIRNAME}/{CANONICAL_NLP_FILENAME}");
        write(root, &cohort, "hadm_id,subject_id\n1,10\n2,20\n3,30\n");
        write(root, &nlp, "hadm_id,subject_id\n1,10\n2,20\n");
        write(
            root,
            QA_SUMMARY_FILENAME,
            r#"{"icu_link_rate": 0.5, "pct_any_gas_0_6h": 0.2, "pct_any_gas_0_24h": 0.3, "gas_source_other_rate": 0.1,
               "first_other_pco2_audit": [{"source": "POC", "pct_eq_160": 0.01}]}"#,
        );
        write(
            root,
            &format!("{RATER_DIRNAME}/{RATER_JOIN_AUDIT_FILENAME}"),
            r#"{"matched_rows": 40}"#,
        );
        write(root, &format!("{RATER_DIRNAME}/{RATER_SUMMARY_FILENAME}"), "kappa 0.8\n");
        for name in ANALYSIS_EXPORT_FILENAMES {
            write(root, name, "group,n\na,1\nb,2\n");
        }
    }

    #[test]
    fn capture_then_compare_is_clean() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let cfg = GuardConfig::default();
        let captured = capture(tmp.path(), &cfg, Some("b1"), Some("first  run")).unwrap();
        assert!(captured.missing_files.is_empty());
        assert_eq!(captured.copied_files.len(), 9);
        assert!(captured.baseline_dir.ends_with("b1_first-run"));

        let report = compare(tmp.path(), &cfg, "latest", "r1").unwrap();
        assert_eq!(report.status, Status::Pass);
        assert!(report.findings.is_empty(), "{:?}", report.findings);
        assert_eq!(report.current_metrics["cohort_rows"], 3.0);
        assert!(!report.metric_drift.is_empty());
    }

    #[test]
    fn identity_change_with_same_row_count_is_fatal() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let cfg = GuardConfig::default();
        capture(tmp.path(), &cfg, Some("b1"), None).unwrap();
        write(
            tmp.path(),
            &format!("{DATA_DIRNAME}/{CANONICAL_COHORT_FILENAME}"),
            "hadm_id,subject_id\n1,10\n2,20\n4,40\n",
        );
        write(tmp.path(), ANALYSIS_EXPORT_FILENAMES[0], "group,n\na,1\nb,5\n");

        let report = compare(tmp.path(), &cfg, "b1", "r2").unwrap();
        let codes: Vec<&str> = report.findings.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["id_contract_mismatch", "analysis_numeric_sum_drift"]);
        assert_eq!(report.status, Status::Fail);
    }

    #[test]
    fn missing_current_artifact_is_single_fatal() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let cfg = GuardConfig::default();
        capture(tmp.path(), &cfg, Some("b1"), None).unwrap();
        std::fs::remove_file(tmp.path().join(QA_SUMMARY_FILENAME)).unwrap();

        let report = compare(tmp.path(), &cfg, "latest", "r3").unwrap();
        assert_eq!(report.status, Status::Fail);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].severity, Severity::Fatal);
        assert!(report.metric_drift.is_empty());
    }

    #[test]
    fn existing_snapshot_dir_is_refused() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let cfg = GuardConfig::default();
        capture(tmp.path(), &cfg, Some("b1"), None).unwrap();
        let err = capture(tmp.path(), &cfg, Some("b1"), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GuardError>(),
            Some(GuardError::SnapshotExists(_))
        ));
    }

    #[test]
    fn resolution_errors_are_distinct() {
        let tmp = TempDir::new().unwrap();
        let cfg = GuardConfig::default();
        assert!(matches!(
            resolve(tmp.path(), &cfg, "latest"),
            Err(GuardError::NoBaselines(_))
        ));
        assert!(matches!(
            resolve(tmp.path(), &cfg, "nope"),
            Err(GuardError::BaselineNotFound(_))
        ));
        std::fs::create_dir_all(tmp.path().join(BASELINE_ROOT).join("empty")).unwrap();
        assert!(matches!(
            resolve(tmp.path(), &cfg, "empty"),
            Err(GuardError::ManifestMissing(_))
        ));
    }

    #[test]
    fn capture_records_missing_and_latest_audit() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        std::fs::remove_file(tmp.path().join(ANALYSIS_EXPORT_FILENAMES[3])).unwrap();
        write(tmp.path(), &format!("{AUDIT_ROOT}/run1/{AUDIT_REPORT_FILENAME}"), "{}");
        let cfg = GuardConfig::default();
        let captured = capture(tmp.path(), &cfg, None, None).unwrap();
        assert_eq!(captured.missing_files, vec![ANALYSIS_EXPORT_FILENAMES[3].to_string()]);
        assert!(captured
            .copied_files
            .contains(&LATEST_AUDIT_COPY_RELPATH.to_string()));
        assert_eq!(listings(tmp.path(), &cfg).len(), 1);
    }

    #[test]
    fn audit_baseline_falls_back_to_pre_run_quality() {
        let tmp = TempDir::new().unwrap();
        let cfg = GuardConfig::default();
        let qa = serde_json::json!({"icu_link_rate": 0.4});
        let info = audit_baseline(tmp.path(), &cfg, "latest", Some(&qa));
        assert_eq!(info.mode, "pre_run_quality_summary");
        assert_eq!(info.metrics["icu_link_rate"], 0.4);

        seed(tmp.path());
        capture(tmp.path(), &cfg, Some("b1"), None).unwrap();
        let info = audit_baseline(tmp.path(), &cfg, "latest", Some(&qa));
        assert_eq!(info.mode, "snapshot");
        assert_eq!(info.metrics["icu_link_rate"], 0.5);
        assert_eq!(info.sources["cohort_rows"], "baseline_manifest");
    }

    fn codes(report: &ParityReport) -> Vec<&str> {
        report.findings.iter().map(|f| f.code.as_str()).collect()
    }

    #[test]
    fn unparseable_json_artifacts_are_fatal() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let cfg = GuardConfig::default();
        capture(tmp.path(), &cfg, Some("b1"), None).unwrap();
        write(tmp.path(), QA_SUMMARY_FILENAME, "{not json");
        write(
            tmp.path(),
            &format!("{RATER_DIRNAME}/{RATER_JOIN_AUDIT_FILENAME}"),
            "{not json",
        );

        let report = compare(tmp.path(), &cfg, "b1", "r4").unwrap();
        assert_eq!(report.status, Status::Fail);
        assert_eq!(codes(&report), vec!["unreadable_artifact", "unreadable_artifact"]);
        assert!(report
            .findings
            .iter()
            .all(|f| f.severity == Severity::Fatal));
        assert!(report.findings[1].message.contains(QA_SUMMARY_FILENAME));
    }

    #[test]
    fn zero_join_matches_fail_regardless_of_baseline() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let cfg = GuardConfig::default();
        capture(tmp.path(), &cfg, Some("b1"), None).unwrap();
        let join = format!("{RATER_DIRNAME}/{RATER_JOIN_AUDIT_FILENAME}");

        write(tmp.path(), &join, r#"{"matched_rows": 38}"#);
        let shifted = compare(tmp.path(), &cfg, "b1", "r5").unwrap();
        assert_eq!(codes(&shifted), vec!["join_match_count_delta"]);
        assert!(shifted.findings[0].message.contains("from 40 to 38 (-2)"));
        assert_eq!(shifted.status, Status::Pass);

        write(tmp.path(), &join, r#"{"matched_rows": 0}"#);
        let zero = compare(tmp.path(), &cfg, "b1", "r6").unwrap();
        assert_eq!(codes(&zero), vec!["join_zero_matches", "join_match_count_delta"]);
        assert_eq!(zero.findings[0].severity, Severity::Fatal);
        assert_eq!(zero.status, Status::Fail);
    }

    #[test]
    fn export_signature_changes_are_classified() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let cfg = GuardConfig::default();
        let captured = capture(tmp.path(), &cfg, Some("b1"), None).unwrap();
        let dir = PathBuf::from(&captured.baseline_dir);
        let mut manifest = load_manifest(&dir).unwrap();
        manifest.signatures.insert(
            ANALYSIS_EXPORT_FILENAMES[0].to_string(),
            ArtifactSignature::Binary {
                size_bytes: 1,
                sha256: "00".to_string(),
            },
        );
        manifest.signatures.insert(
            ANALYSIS_EXPORT_FILENAMES[1].to_string(),
            ArtifactSignature::Sheets {
                sheets: BTreeMap::from([(
                    "Other".to_string(),
                    crate::domain::models::SheetSignature {
                        rows: 2,
                        cols: 2,
                        numeric_sum: 3.0,
                    },
                )]),
            },
        );
        manifest.signatures.remove(ANALYSIS_EXPORT_FILENAMES[2]);
        storage::write_json(&dir.join(BASELINE_MANIFEST_FILENAME), &manifest).unwrap();

        let report = compare(tmp.path(), &cfg, "b1", "r7").unwrap();
        assert_eq!(
            codes(&report),
            vec![
                "analysis_kind_mismatch",
                "analysis_sheet_mismatch",
                "analysis_export_added",
            ]
        );
        assert_eq!(report.findings[2].severity, Severity::Info);
        assert_eq!(report.status, Status::Fail);
    }
}

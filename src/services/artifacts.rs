use crate::domain::config::{GuardConfig, QualityConfig, RecordMetric};
use crate::domain::models::{ArtifactCheck, Category, Finding, Severity};
use crate::services::storage;
use crate::services::table::Table;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Everything the validator learned about the current outputs.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub artifact_checks: BTreeMap<String, ArtifactCheck>,
    pub findings: Vec<Finding>,
    /// Loaded tables keyed by table name, reused by the contract engine.
    pub tables: BTreeMap<String, Table>,
    pub quality_summary: Option<Value>,
    pub join_audit: Option<Value>,
    pub current_metrics: BTreeMap<String, f64>,
}

pub fn check_artifact(path: &Path, run_start_ms: u64) -> ArtifactCheck {
    match std::fs::metadata(path) {
        Err(_) => ArtifactCheck {
            path: path.to_string_lossy().to_string(),
            exists: false,
            fresh: false,
            size_bytes: 0,
            mtime_unix_ms: None,
        },
        Ok(meta) => {
            let mtime = storage::mtime_ms(path);
            ArtifactCheck {
                path: path.to_string_lossy().to_string(),
                exists: true,
                fresh: mtime.map(|m| m >= run_start_ms).unwrap_or(false),
                size_bytes: meta.len(),
                mtime_unix_ms: mtime,
            }
        }
    }
}

/// Loads a JSON document, turning a parse failure into a fatal finding.
fn read_json_artifact(path: &Path, code: &str, findings: &mut Vec<Finding>) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    match storage::read_json(path) {
        Ok(v) => Some(v),
        Err(e) => {
            findings.push(Finding::new(
                Severity::Fatal,
                Category::Artifact,
                code,
                format!("{} is not valid JSON: {e}", path.display()),
            ));
            None
        }
    }
}

pub fn load_and_validate(
    work_dir: &Path,
    cfg: &GuardConfig,
    run_start_ms: u64,
) -> ValidationOutcome {
    let mut out = ValidationOutcome::default();
    let artifacts = &cfg.artifacts;

    for rel in artifacts.required() {
        let check = check_artifact(&work_dir.join(&rel), run_start_ms);
        if !check.exists {
            out.findings.push(Finding::new(
                Severity::Fatal,
                Category::Artifact,
                "missing_artifact",
                format!("Missing required artifact: {rel}"),
            ));
        } else {
            if !check.fresh {
                out.findings.push(Finding::new(
                    Severity::Warning,
                    Category::Artifact,
                    "stale_artifact",
                    format!("Artifact was not refreshed in this run: {rel}"),
                ));
            }
            if check.size_bytes == 0 {
                out.findings.push(Finding::new(
                    Severity::Error,
                    Category::Artifact,
                    "empty_artifact",
                    format!("Artifact is empty: {rel}"),
                ));
            }
        }
        out.artifact_checks.insert(rel, check);
    }

    out.quality_summary = read_json_artifact(
        &work_dir.join(&artifacts.quality_summary),
        "invalid_quality_summary_json",
        &mut out.findings,
    );
    out.join_audit = read_json_artifact(
        &work_dir.join(&artifacts.join_audit.path),
        "invalid_join_audit_json",
        &mut out.findings,
    );

    for spec in &artifacts.tables {
        let path = work_dir.join(&spec.path);
        if !path.exists() {
            continue;
        }
        let table = match Table::load(&path) {
            Ok(t) => t,
            Err(e) => {
                warn!(table = %spec.name, error = %e, "table load failed");
                out.findings.push(Finding::new(
                    Severity::Fatal,
                    Category::Artifact,
                    format!("{}_read_failure", spec.name),
                    format!("Unable to read {} table: {e}", spec.name),
                ));
                continue;
            }
        };
        let missing = table.missing_columns(&spec.required_columns);
        if !missing.is_empty() {
            out.findings.push(Finding::new(
                Severity::Fatal,
                Category::Schema,
                format!("{}_missing_columns", spec.name),
                format!("{} table missing columns: {missing:?}", spec.name),
            ));
        }
        out.findings.extend(check_non_finite(&table, &spec.name));
        if let Some(metric) = &spec.row_metric {
            out.current_metrics
                .insert(metric.clone(), table.row_count() as f64);
        }
        out.tables.insert(spec.name.clone(), table);
    }

    if let Some(qa) = out.quality_summary.as_ref().filter(|v| has_content(v)) {
        out.findings.extend(quality_summary_findings(qa, &cfg.quality));
        out.current_metrics
            .extend(extract_quality_metrics(qa, &cfg.quality));
    }

    if let Some(join) = out.join_audit.as_ref().filter(|v| has_content(v)) {
        if join_match_count(join, &artifacts.join_audit.match_field) == 0 {
            out.findings.push(Finding::new(
                Severity::Fatal,
                Category::Quality,
                "join_zero_matches",
                format!(
                    "Join audit {} reported zero matched rows.",
                    artifacts.join_audit.path
                ),
            ));
        }
    }

    debug!(
        findings = out.findings.len(),
        tables = out.tables.len(),
        metrics = out.current_metrics.len(),
        "artifact validation complete"
    );
    out
}

fn has_content(v: &Value) -> bool {
    v.as_object().map(|o| !o.is_empty()).unwrap_or(false)
}

pub fn check_non_finite(table: &Table, name: &str) -> Option<Finding> {
    let count = table.non_finite_count();
    (count > 0).then(|| {
        Finding::new(
            Severity::Fatal,
            Category::Numeric,
            "non_finite_values_detected",
            format!("{name} table contains {count} non-finite values in numeric columns."),
        )
    })
}

pub fn join_match_count(join: &Value, field: &str) -> i64 {
    join.get(field).and_then(json_number).map(|v| v as i64).unwrap_or(0)
}

fn json_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn record_metric(qa: &Value, spec: &RecordMetric) -> Option<f64> {
    let records = qa.pointer(&spec.pointer)?.as_array()?;
    let record = records.iter().find(|r| {
        r.get(&spec.match_field)
            .map(|v| match v {
                Value::String(s) => s.trim().eq_ignore_ascii_case(&spec.match_value),
                other => other.to_string().eq_ignore_ascii_case(&spec.match_value),
            })
            .unwrap_or(false)
    })?;
    record.get(&spec.value_field).and_then(json_number)
}

/// Scalar metrics opted into the allow-list. Absent or null fields are skipped.
pub fn extract_quality_metrics(qa: &Value, cfg: &QualityConfig) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    for name in &cfg.metrics {
        if let Some(v) = qa.get(name).and_then(json_number) {
            metrics.insert(name.clone(), v);
        }
    }
    for spec in &cfg.record_metrics {
        if let Some(v) = record_metric(qa, spec) {
            metrics.insert(spec.name.clone(), v);
        }
    }
    metrics
}

pub fn quality_excerpt(qa: &Value, cfg: &QualityConfig) -> BTreeMap<String, Value> {
    cfg.excerpt_keys
        .iter()
        .map(|k| (k.clone(), qa.get(k).cloned().unwrap_or(Value::Null)))
        .collect()
}

pub fn quality_summary_findings(qa: &Value, cfg: &QualityConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    let quality = |severity, code: &str, message: String| {
        Finding::new(severity, Category::Quality, code, message)
    };

    for check in &cfg.collapse_flags {
        if qa.pointer(&check.pointer).and_then(Value::as_bool).unwrap_or(false) {
            findings.push(quality(Severity::Fatal, &check.code, check.message.clone()));
        }
    }

    for check in &cfg.pass_checks {
        let Some(entries) = qa.pointer(&check.pointer).and_then(Value::as_object) else {
            continue;
        };
        for (field, entry) in entries {
            let present = entry.get("present").and_then(Value::as_bool).unwrap_or(false);
            let passes = entry.get("passes").and_then(Value::as_bool).unwrap_or(false);
            if present && !passes {
                findings.push(quality(
                    Severity::Fatal,
                    &check.code,
                    format!("{} for {field}.", check.message),
                ));
            }
        }
    }

    for check in &cfg.attach_checks {
        let candidates: f64 = check
            .candidate_pointers
            .iter()
            .filter_map(|p| qa.pointer(p).and_then(json_number))
            .sum();
        let attached: f64 = qa
            .pointer(&check.attached_pointer)
            .and_then(Value::as_object)
            .map(|o| o.values().filter_map(json_number).sum())
            .unwrap_or(0.0);
        if candidates > 0.0 && attached == 0.0 {
            findings.push(quality(Severity::Fatal, &check.code, check.message.clone()));
        }
    }

    for check in &cfg.percent_records {
        let Some(rows) = qa.pointer(&check.pointer).and_then(Value::as_array) else {
            findings.push(quality(
                Severity::Error,
                &check.absent_code,
                format!("Quality summary is missing {} records.", check.pointer),
            ));
            continue;
        };
        for (idx, row) in rows.iter().enumerate() {
            match row.get(&check.field).filter(|v| !v.is_null()) {
                None => findings.push(quality(
                    Severity::Error,
                    &check.missing_code,
                    format!("{} record {idx} is missing {}.", check.pointer, check.field),
                )),
                Some(v) => {
                    let valid = json_number(v).map(|x| x.is_finite() && x >= 0.0);
                    if valid != Some(true) {
                        findings.push(quality(
                            Severity::Error,
                            &check.invalid_code,
                            format!("{} record {idx} has invalid {}.", check.pointer, check.field),
                        ));
                    }
                }
            }
        }
    }

    for spec in &cfg.record_metrics {
        if let Some(code) = &spec.missing_code {
            if record_metric(qa, spec).is_none() {
                findings.push(quality(
                    Severity::Error,
                    code,
                    format!("Quality summary is missing the {} metric.", spec.name),
                ));
            }
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn good_qa() -> Value {
        json!({
            "icu_link_rate": 0.5,
            "pct_any_gas_0_6h": 0.4,
            "pct_any_gas_0_24h": 0.6,
            "gas_source_other_rate": 0.1,
            "gas_source_audit": {"all_other_or_unknown": false},
            "uom_expectation_checks": {"paco2_uom_checks": {
                "poc_abg_paco2_uom": {"present": true, "passes": true},
                "poc_vbg_paco2_uom": {"present": false}
            }},
            "omr_diagnostics": {
                "pre_window_candidate_rows": 3,
                "post_window_candidate_rows": 0,
                "attached_non_null_counts": {"bmi": 2}
            },
            "vitals_outlier_audit": [{"out_of_range_pct": 0.01}],
            "first_other_pco2_audit": [
                {"source": "ABG", "pct_eq_160": 0.9},
                {"source": "poc", "pct_eq_160": 0.02}
            ]
        })
    }

    #[test]
    fn clean_quality_summary_has_no_findings_and_all_metrics() {
        let cfg = QualityConfig::default();
        let qa = good_qa();
        assert!(quality_summary_findings(&qa, &cfg).is_empty());
        let metrics = extract_quality_metrics(&qa, &cfg);
        assert_eq!(metrics.len(), 5);
        assert_eq!(metrics["first_other_pco2_pct_eq_160_poc"], 0.02);
    }

    #[test]
    fn quality_summary_anomalies_become_findings() {
        let cfg = QualityConfig::default();
        let mut qa = good_qa();
        qa["gas_source_audit"]["all_other_or_unknown"] = json!(true);
        qa["uom_expectation_checks"]["paco2_uom_checks"]["poc_abg_paco2_uom"]["passes"] =
            json!(false);
        qa["omr_diagnostics"]["attached_non_null_counts"] = json!({"bmi": 0});
        qa["vitals_outlier_audit"] = json!([{"out_of_range_pct": null}, {"out_of_range_pct": -1}]);
        qa["first_other_pco2_audit"] = json!([]);

        let findings = quality_summary_findings(&qa, &cfg);
        let codes: Vec<&str> = findings.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(
            codes,
            vec![
                "all_other_or_unknown_gas_source",
                "uom_paco2_failure",
                "omr_attach_inconsistency",
                "missing_vitals_outlier_pct",
                "invalid_vitals_outlier_pct",
                "missing_first_other_pco2_audit",
            ]
        );
        assert_eq!(findings[0].severity, Severity::Fatal);
        assert_eq!(findings[3].severity, Severity::Error);
    }

    #[test]
    fn artifact_check_reports_missing_and_fresh() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        let missing = check_artifact(&path, 0);
        assert!(!missing.exists && !missing.fresh);

        std::fs::write(&path, "x").unwrap();
        let fresh = check_artifact(&path, 0);
        assert!(fresh.exists && fresh.fresh);
        assert_eq!(fresh.size_bytes, 1);

        let stale = check_artifact(&path, u64::MAX);
        assert!(!stale.fresh);
    }

    #[test]
    fn missing_artifacts_each_yield_fatal_finding() {
        let tmp = TempDir::new().unwrap();
        let cfg = GuardConfig::default();
        let out = load_and_validate(tmp.path(), &cfg, 0);
        let missing = out
            .findings
            .iter()
            .filter(|f| f.code == "missing_artifact" && f.severity == Severity::Fatal)
            .count();
        assert_eq!(missing, cfg.artifacts.required().len());
        assert!(out.tables.is_empty());
        assert!(out.current_metrics.is_empty());
    }

    #[test]
    fn tables_are_loaded_and_checked() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = GuardConfig::default();
        cfg.artifacts.tables.truncate(1);
        let table = &cfg.artifacts.tables[0];
        let path = tmp.path().join(&table.path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "hadm_id,subject_id,score\n1,10,inf\n2,20,0.5\n").unwrap();

        let out = load_and_validate(tmp.path(), &cfg, 0);
        assert_eq!(out.current_metrics["cohort_rows"], 2.0);
        assert!(out.tables.contains_key("cohort"));
        assert!(out.findings.iter().any(|f| f.code == "cohort_missing_columns"));
        assert!(out
            .findings
            .iter()
            .any(|f| f.code == "non_finite_values_detected" && f.severity == Severity::Fatal));
    }

    #[test]
    fn zero_join_matches_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let cfg = GuardConfig::default();
        let path = tmp.path().join(&cfg.artifacts.join_audit.path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"matched_rows": 0, "r3_rows": 10}"#).unwrap();
        let out = load_and_validate(tmp.path(), &cfg, 0);
        assert!(out.findings.iter().any(|f| f.code == "join_zero_matches"));
    }

    #[test]
    fn unreadable_inputs_are_findings_and_validation_continues() {
        let tmp = TempDir::new().unwrap();
        let cfg = GuardConfig::default();
        let put = |rel: &str, body: &str| {
            let path = tmp.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        };
        // Ragged row: the csv reader rejects it.
        put(&cfg.artifacts.tables[0].path, "hadm_id,subject_id\n1,10,extra\n");
        put(&cfg.artifacts.tables[1].path, "hadm_id,subject_id\n1,10\n2,20\n");
        put(&cfg.artifacts.quality_summary, "{not json");
        put(&cfg.artifacts.join_audit.path, "");

        let out = load_and_validate(tmp.path(), &cfg, 0);
        let codes: Vec<&str> = out.findings.iter().map(|f| f.code.as_str()).collect();
        for code in [
            "cohort_read_failure",
            "invalid_quality_summary_json",
            "invalid_join_audit_json",
            "empty_artifact",
        ] {
            assert!(codes.contains(&code), "{code} not in {codes:?}");
        }
        let read_failure = out
            .findings
            .iter()
            .find(|f| f.code == "cohort_read_failure")
            .unwrap();
        assert_eq!(read_failure.severity, Severity::Fatal);

        assert!(!out.tables.contains_key("cohort"));
        assert!(out.tables.contains_key("classifier"));
        assert_eq!(out.current_metrics["classifier_rows"], 2.0);
        assert!(out.quality_summary.is_none());
        assert!(out.join_audit.is_none());
    }
}

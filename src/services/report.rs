//! Report assembly and the human/CSV renderings written next to each JSON report.

use crate::cli::StrictnessPolicy;
use crate::domain::models::{
    audit_status, ArtifactCheck, AuditReport, BaselineInfo, Category, ContractReport, DriftLevel,
    Finding, LogHit, MetricDrift, ParityReport, PipelineRun, RunManifest, Severity,
    SeverityCounts, StageContractReport, StageStatus,
};
use crate::services::clock;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

pub struct AuditInputs {
    pub run_id: String,
    pub strictness: StrictnessPolicy,
    pub manifest: RunManifest,
    pub baseline: BaselineInfo,
    pub pipeline_run: PipelineRun,
    pub preflight_findings: Vec<Finding>,
    pub artifact_checks: BTreeMap<String, ArtifactCheck>,
    pub artifact_findings: Vec<Finding>,
    pub contracts: BTreeMap<String, StageContractReport>,
    pub current_metrics: BTreeMap<String, f64>,
    pub metric_drift: Vec<MetricDrift>,
    pub log_hits: Vec<LogHit>,
}

fn stage_findings(run: &PipelineRun) -> Vec<Finding> {
    run.stages
        .iter()
        .filter(|s| s.status == StageStatus::Failed)
        .map(|s| {
            let detail = match (&s.spawn_error, s.returncode) {
                (Some(err), _) => format!("could not start: {err}"),
                (None, Some(code)) => format!("exited with code {code}"),
                (None, None) => "failed".to_string(),
            };
            Finding::new(
                Severity::Fatal,
                Category::Pipeline,
                "stage_failed",
                format!("Stage {} {detail}.", s.stage_id),
            )
        })
        .collect()
}

/// Findings are ordered by source: preflight, pipeline, artifacts,
/// contracts, drift, logs.
pub fn build_audit_report(inputs: AuditInputs) -> AuditReport {
    let mut findings = inputs.preflight_findings;
    findings.extend(stage_findings(&inputs.pipeline_run));
    findings.extend(inputs.artifact_findings);
    for stage in inputs.contracts.values() {
        findings.extend(stage.findings.iter().cloned());
    }
    findings.extend(crate::services::drift::drift_findings(&inputs.metric_drift));
    findings.extend(inputs.log_hits.iter().map(|h| h.finding.clone()));

    let summary = SeverityCounts::from_findings(&findings);
    let generated = clock::now_unix_ms();
    AuditReport {
        run_id: inputs.run_id,
        generated_unix_ms: generated,
        generated_utc: clock::iso_utc(generated),
        strictness: inputs.strictness,
        status: audit_status(&summary, inputs.strictness),
        summary,
        manifest: inputs.manifest,
        baseline: inputs.baseline,
        pipeline_run: inputs.pipeline_run,
        artifact_checks: inputs.artifact_checks,
        contracts: inputs.contracts,
        current_metrics: inputs.current_metrics,
        metric_drift: inputs.metric_drift,
        log_hits: inputs.log_hits,
        findings,
    }
}

fn summary_line(out: &mut String, counts: &SeverityCounts) {
    let _ = writeln!(
        out,
        "- Findings: fatal={} error={} warning={} info={}",
        counts.fatal, counts.error, counts.warning, counts.info
    );
}

fn findings_section(out: &mut String, findings: &[Finding]) {
    out.push_str("\n## Findings\n\n");
    if findings.is_empty() {
        out.push_str("- none\n");
        return;
    }
    for f in findings {
        let _ = writeln!(
            out,
            "- [{}] `{}` ({:?}): {}",
            f.severity.as_str(),
            f.code,
            f.category,
            f.message
        );
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.6}")).unwrap_or_else(|| "n/a".to_string())
}

fn drift_level(level: DriftLevel) -> &'static str {
    match level {
        DriftLevel::Ok => "ok",
        DriftLevel::OkImproved => "ok_improved",
        DriftLevel::Warning => "warning",
        DriftLevel::Fail => "fail",
    }
}

fn drift_section(out: &mut String, drift: &[MetricDrift]) {
    out.push_str("\n## Metric Drift\n\n");
    if drift.is_empty() {
        out.push_str("- no comparable metrics\n");
        return;
    }
    out.push_str("| metric | baseline | current | delta | relative | severity |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    for d in drift {
        let _ = writeln!(
            out,
            "| {} | {:.6} | {:.6} | {:+.6} | {} | {} |",
            d.metric,
            d.baseline_value,
            d.current_value,
            d.delta,
            fmt_opt(d.relative_delta),
            drift_level(d.severity)
        );
    }
}

pub fn audit_markdown(report: &AuditReport) -> String {
    let mut out = String::from("# Pipeline Audit\n\n");
    let _ = writeln!(out, "- Run: `{}`", report.run_id);
    let _ = writeln!(out, "- Generated: {}", report.generated_utc);
    let _ = writeln!(out, "- Status: **{}**", report.status.as_str());
    let _ = writeln!(out, "- Strictness: {:?}", report.strictness);
    let _ = writeln!(
        out,
        "- Baseline: {} ({})",
        report.baseline.baseline_id.as_deref().unwrap_or("none"),
        report.baseline.mode
    );
    summary_line(&mut out, &report.summary);

    out.push_str("\n## Stages\n\n");
    for s in &report.pipeline_run.stages {
        let _ = writeln!(
            out,
            "- `{}` {:?} code={} lines={} duration={}",
            s.stage_id,
            s.status,
            s.returncode
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            s.line_count,
            fmt_opt(s.duration_s)
        );
    }

    if !report.contracts.is_empty() {
        out.push_str("\n## Contracts\n\n");
        for (stage, c) in &report.contracts {
            let _ = writeln!(out, "- `{stage}`: {:?} ({} findings)", c.status, c.findings.len());
        }
    }
    drift_section(&mut out, &report.metric_drift);
    findings_section(&mut out, &report.findings);
    out
}

pub fn parity_markdown(report: &ParityReport) -> String {
    let mut out = String::from("# Baseline Parity\n\n");
    let _ = writeln!(out, "- Run: `{}`", report.run_id);
    let _ = writeln!(out, "- Generated: {}", report.generated_utc);
    let _ = writeln!(out, "- Baseline: `{}`", report.baseline_dir);
    let _ = writeln!(out, "- Status: **{}**", report.status.as_str());
    summary_line(&mut out, &report.summary);
    drift_section(&mut out, &report.metric_drift);
    findings_section(&mut out, &report.findings);
    out
}

pub fn contract_markdown(report: &ContractReport) -> String {
    let mut out = String::from("# Data Contracts\n\n");
    let _ = writeln!(out, "- Generated: {}", report.generated_utc);
    let _ = writeln!(out, "- Stages: {}", report.stages.join(", "));
    let _ = writeln!(out, "- Status: **{}**", report.status.as_str());
    summary_line(&mut out, &report.summary);
    out.push_str("\n## Stages\n\n");
    for (stage, c) in &report.contracts {
        let shape = match (c.row_count, c.column_count) {
            (Some(r), Some(k)) => format!("{r} rows x {k} cols"),
            _ => "not loaded".to_string(),
        };
        let _ = writeln!(out, "- `{stage}`: {:?}, {shape}, `{}`", c.status, c.artifact_path);
        for (key, value) in &c.diagnostics {
            let _ = writeln!(out, "  - {key} = {value}");
        }
    }
    findings_section(&mut out, &report.findings);
    out
}

pub fn write_metric_drift_csv(path: &Path, drift: &[MetricDrift]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut w = csv::Writer::from_path(path)?;
    w.write_record([
        "metric",
        "current_value",
        "baseline_value",
        "delta",
        "abs_delta",
        "relative_delta",
        "compare_mode",
        "warn_threshold",
        "fail_threshold",
        "severity",
    ])?;
    for d in drift {
        w.write_record([
            d.metric.clone(),
            d.current_value.to_string(),
            d.baseline_value.to_string(),
            d.delta.to_string(),
            d.abs_delta.to_string(),
            d.relative_delta.map(|v| v.to_string()).unwrap_or_default(),
            format!("{:?}", d.compare_mode).to_lowercase(),
            d.warn_threshold.to_string(),
            d.fail_threshold.to_string(),
            drift_level(d.severity).to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// One row per finding; log hits carry their file and line as the source.
pub fn write_warnings_index_csv(path: &Path, report: &AuditReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut w = csv::Writer::from_path(path)?;
    w.write_record(["severity", "category", "code", "source", "message"])?;
    // Log hit findings are the trailing block of `findings`, in hit order.
    let first_hit = report.findings.len().saturating_sub(report.log_hits.len());
    for (idx, f) in report.findings.iter().enumerate() {
        let source = idx
            .checked_sub(first_hit)
            .and_then(|i| report.log_hits.get(i))
            .map(|h| format!("{}:{}", h.log_path, h.line_number))
            .unwrap_or_default();
        w.write_record([
            f.severity.as_str().to_string(),
            format!("{:?}", f.category).to_lowercase(),
            f.code.clone(),
            source,
            f.message.clone(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

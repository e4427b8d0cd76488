use crate::services::artifacts;
use crate::services::contracts;
use crate::services::log_scan::LogScanner;
use crate::services::report::{self, AuditInputs};
use crate::services::runner::{Echo, StageRunner};
use crate::services::{clock, drift, preflight, snapshot, storage};
use crate::*;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub fn handle_audit_commands(
    cli: &Cli,
    work_dir: &Path,
    cfg: &GuardConfig,
) -> anyhow::Result<Option<bool>> {
    let Commands::Audit {
        baseline,
        strictness,
        run_id,
        consistency_check,
    } = &cli.command
    else {
        return Ok(None);
    };

    // Setup errors surface before any stage runs.
    let scanner = LogScanner::new(&cfg.logs)?;
    let run_id = run_id
        .clone()
        .unwrap_or_else(|| clock::timestamp_id(clock::now_unix_ms()));
    let out_dir = work_dir.join(&cfg.output.audit_root).join(&run_id);
    std::fs::create_dir_all(out_dir.join("logs"))?;
    info!(run_id = %run_id, "audit started");

    // The stages rewrite the quality summary; keep the pre-run view.
    let pre_run_quality = storage::read_json(&work_dir.join(&cfg.artifacts.quality_summary)).ok();

    let manifest = preflight::collect_run_manifest(work_dir, &run_id, &cfg.preflight);
    let preflight_findings = preflight::run_preflight_checks(work_dir, &cfg.preflight);

    let runner = StageRunner {
        work_dir,
        logs_dir: out_dir.join("logs"),
        env: &cfg.stage_env,
        echo: if cli.json { Echo::Stderr } else { Echo::Stdout },
    };
    let consistency = consistency_check.then_some(&cfg.consistency_stage);
    let pipeline_run = runner.run_pipeline(&cfg.stages, consistency)?;

    let validation = artifacts::load_and_validate(work_dir, cfg, pipeline_run.started_unix_ms);
    let preloaded: BTreeMap<String, &_> = cfg
        .artifacts
        .tables
        .iter()
        .filter_map(|spec| {
            validation
                .tables
                .get(&spec.name)
                .map(|t| (spec.path.clone(), t))
        })
        .collect();
    let stages: Vec<String> = cfg.contracts.keys().cloned().collect();
    let contract_report = contracts::run_contracts(work_dir, cfg, &stages, &preloaded);

    let mut current_metrics = validation.current_metrics.clone();
    for (stage, c) in &contract_report.contracts {
        for (key, value) in &c.diagnostics {
            current_metrics.insert(format!("{stage}.{key}"), *value);
        }
    }

    let baseline_info =
        snapshot::audit_baseline(work_dir, cfg, baseline, pre_run_quality.as_ref());
    let metric_drift =
        drift::classify_drift(&current_metrics, &baseline_info.metrics, &cfg.drift_rules);
    let log_hits = scanner.scan(&pipeline_run.stages);

    let audit = report::build_audit_report(AuditInputs {
        run_id: run_id.clone(),
        strictness: *strictness,
        manifest,
        baseline: baseline_info,
        pipeline_run,
        preflight_findings,
        artifact_checks: validation.artifact_checks,
        artifact_findings: validation.findings,
        contracts: contract_report.contracts,
        current_metrics,
        metric_drift,
        log_hits,
    });

    storage::write_json(&out_dir.join("run_manifest.json"), &audit.manifest)?;
    storage::write_json(&out_dir.join(AUDIT_REPORT_FILENAME), &audit)?;
    storage::write_text(&out_dir.join("audit_summary.md"), &report::audit_markdown(&audit))?;
    report::write_metric_drift_csv(&out_dir.join("metric_drift.csv"), &audit.metric_drift)?;
    report::write_warnings_index_csv(&out_dir.join("warnings_index.csv"), &audit)?;
    storage::audit(
        work_dir,
        "audit",
        serde_json::json!({
            "run_id": run_id,
            "status": audit.status,
            "summary": audit.summary,
        }),
    );
    info!(run_id = %run_id, status = audit.status.as_str(), "audit finished");

    let passed = audit.status != Status::Fail;
    let report_path = out_dir.join(AUDIT_REPORT_FILENAME);
    print_status(cli.json, passed, audit, |a| {
        let mut out = format!(
            "audit {} (fatal={} error={} warning={} info={})\nreport: {}",
            a.status.as_str(),
            a.summary.fatal,
            a.summary.error,
            a.summary.warning,
            a.summary.info,
            report_path.display()
        );
        for f in &a.findings {
            out.push_str(&format!("\n{}\t{}\t{}", f.severity.as_str(), f.code, f.message));
        }
        out
    })?;
    Ok(Some(passed))
}

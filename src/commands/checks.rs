use crate::services::{clock, contracts, preflight, storage};
use crate::*;
use std::collections::BTreeMap;
use std::path::Path;

pub fn handle_check_commands(
    cli: &Cli,
    work_dir: &Path,
    cfg: &GuardConfig,
) -> anyhow::Result<Option<bool>> {
    match &cli.command {
        Commands::ContractCheck { mode, stage } => {
            let stages = contracts::resolve_stages(stage, &cfg.contracts)?;
            let report = contracts::run_contracts(work_dir, cfg, &stages, &BTreeMap::new());
            let run_id = clock::timestamp_id(report.generated_unix_ms);
            let out_dir = work_dir.join(&cfg.output.contract_root).join(&run_id);
            let outputs = contracts::write_contract_outputs(&report, &out_dir)?;
            storage::audit(
                work_dir,
                "contract_check",
                serde_json::json!({
                    "stages": stages,
                    "mode": mode,
                    "status": report.status,
                }),
            );
            let passed = report.status != Status::Fail;
            print_status(cli.json, passed, report, |r| {
                let mut out = format!(
                    "contracts {} for {} (error={} warning={})\nreport: {}",
                    r.status.as_str(),
                    r.stages.join(","),
                    r.summary.error + r.summary.fatal,
                    r.summary.warning,
                    outputs.report_path.display()
                );
                if let Some(marker) = &outputs.failed_marker {
                    out.push_str(&format!("\nmarker: {}", marker.display()));
                }
                for f in &r.findings {
                    out.push_str(&format!("\n{}\t{}\t{}", f.severity.as_str(), f.code, f.message));
                }
                out
            })?;
            if !passed && *mode == ContractMode::Warn {
                tracing::warn!("contract failures reported in warn mode");
            }
            Ok(Some(passed || *mode == ContractMode::Warn))
        }
        Commands::Preflight => {
            let findings = preflight::run_preflight_checks(work_dir, &cfg.preflight);
            let overall = contract_status(&SeverityCounts::from_findings(&findings));
            let report = PreflightReport { overall, findings };
            let passed = overall != Status::Fail;
            print_status(cli.json, passed, report, |r| {
                let mut out = format!("preflight: {}", r.overall.as_str());
                for f in &r.findings {
                    out.push_str(&format!("\n{}\t{}\t{}", f.severity.as_str(), f.code, f.message));
                }
                out
            })?;
            Ok(Some(passed))
        }
        _ => Ok(None),
    }
}

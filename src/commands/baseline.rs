use crate::services::{clock, snapshot, storage};
use crate::*;
use std::path::Path;

pub fn handle_baseline_commands(
    cli: &Cli,
    work_dir: &Path,
    cfg: &GuardConfig,
) -> anyhow::Result<Option<bool>> {
    match &cli.command {
        Commands::CaptureBaseline { baseline_id, label } => {
            let result =
                snapshot::capture(work_dir, cfg, baseline_id.as_deref(), label.as_deref())?;
            let complete = result.missing_files.is_empty();
            print_status(cli.json, complete, result, |r| {
                let mut out = format!(
                    "captured baseline {} ({} files) -> {}",
                    r.baseline_id,
                    r.copied_files.len(),
                    r.baseline_dir
                );
                for missing in &r.missing_files {
                    out.push_str(&format!("\nmissing\t{missing}"));
                }
                out
            })?;
            Ok(Some(complete))
        }
        Commands::CompareBaseline { baseline, run_id } => {
            let run_id = run_id
                .clone()
                .unwrap_or_else(|| clock::timestamp_id(clock::now_unix_ms()));
            let report = snapshot::compare(work_dir, cfg, baseline, &run_id)?;
            let out_dir = work_dir.join(&cfg.output.parity_root).join(&run_id);
            let (json_path, md_path) = snapshot::write_parity_outputs(&report, &out_dir)?;
            storage::audit(
                work_dir,
                "compare_baseline",
                serde_json::json!({
                    "run_id": run_id,
                    "baseline_dir": report.baseline_dir,
                    "status": report.status,
                }),
            );
            let passed = report.status != Status::Fail;
            print_status(cli.json, passed, report, |r| {
                let mut out = format!(
                    "parity {} against {} (fatal={} error={} warning={} info={})\nreport: {}\nsummary: {}",
                    r.status.as_str(),
                    r.baseline_dir,
                    r.summary.fatal,
                    r.summary.error,
                    r.summary.warning,
                    r.summary.info,
                    json_path.display(),
                    md_path.display()
                );
                for f in &r.findings {
                    out.push_str(&format!("\n{}\t{}\t{}", f.severity.as_str(), f.code, f.message));
                }
                out
            })?;
            Ok(Some(passed))
        }
        Commands::Baselines => {
            let items = snapshot::listings(work_dir, cfg);
            print_out(cli.json, &items, |s| {
                format!(
                    "{}\t{}\t{}\t{}",
                    s.baseline_id,
                    s.captured_utc,
                    s.label.as_deref().unwrap_or("-"),
                    s.dir
                )
            })?;
            Ok(Some(true))
        }
        _ => Ok(None),
    }
}

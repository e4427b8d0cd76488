//! Per-stage contract evaluation over output tables.

use crate::domain::config::{GuardConfig, MissingColumnPolicy, StageContract};
use crate::domain::constants::FAILED_CONTRACT_FILENAME;
use crate::domain::errors::GuardError;
use crate::domain::models::{
    contract_status, Category, ContractReport, Finding, Severity, SeverityCounts,
    StageContractReport, StageContractStatus, Status,
};
use crate::services::rules::{self, RuleContext};
use crate::services::table::Table;
use crate::services::{clock, report, storage};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `all` expands to every configured stage; anything unknown is rejected
/// before any work happens.
pub fn resolve_stages(
    requested: &str,
    contracts: &BTreeMap<String, StageContract>,
) -> Result<Vec<String>, GuardError> {
    let wanted: Vec<String> = requested
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if wanted.is_empty() || wanted.iter().any(|s| s == "all") {
        return Ok(contracts.keys().cloned().collect());
    }
    let unknown: Vec<String> = wanted
        .iter()
        .filter(|s| !contracts.contains_key(*s))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(GuardError::UnsupportedStage(unknown));
    }
    Ok(wanted)
}

/// Runs every rule of one stage against its table.
pub fn evaluate_stage(
    stage: &str,
    contract: &StageContract,
    table: &Table,
    ctx: &RuleContext,
) -> StageContractReport {
    let mut report = StageContractReport::empty(
        stage,
        StageContractStatus::Pass,
        contract.artifact.clone(),
    );
    report.row_count = Some(table.row_count());
    report.column_count = Some(table.column_count());

    for spec in &contract.rules {
        let absent: Vec<&str> = rules::required_columns(&spec.rule)
            .into_iter()
            .filter(|c| !table.has_column(c))
            .collect();
        if !absent.is_empty() {
            let code = rules::rule_code(&spec.rule);
            match spec.on_missing {
                MissingColumnPolicy::Skip => {
                    debug!(stage, rule = code, ?absent, "rule skipped");
                }
                MissingColumnPolicy::Degrade => report.findings.push(Finding::new(
                    Severity::Warning,
                    Category::Contract,
                    "export_incomplete",
                    format!("{code} not evaluated; missing columns {absent:?}"),
                )),
            }
            continue;
        }
        let outcome = rules::evaluate(spec, table, ctx);
        report.findings.extend(outcome.findings);
        report.diagnostics.extend(outcome.diagnostics);
    }

    report.status = contract_status(&SeverityCounts::from_findings(&report.findings)).into();
    report
}

/// Evaluates the requested stages. `preloaded` maps artifact paths to
/// tables already read by the caller; anything else is loaded here.
pub fn run_contracts(
    work_dir: &Path,
    cfg: &GuardConfig,
    stages: &[String],
    preloaded: &BTreeMap<String, &Table>,
) -> ContractReport {
    let ctx = RuleContext { work_dir };
    let mut contracts = BTreeMap::new();
    let mut findings = Vec::new();

    for (stage, contract) in &cfg.contracts {
        if !stages.contains(stage) {
            contracts.insert(
                stage.clone(),
                StageContractReport::empty(
                    stage,
                    StageContractStatus::Skipped,
                    contract.artifact.clone(),
                ),
            );
            continue;
        }
        let path = work_dir.join(&contract.artifact);
        if !path.exists() {
            findings.push(Finding::new(
                Severity::Error,
                Category::Contract,
                format!("missing_{stage}_artifact"),
                format!("{stage} artifact missing: {}", contract.artifact),
            ));
            contracts.insert(
                stage.clone(),
                StageContractReport::empty(
                    stage,
                    StageContractStatus::Missing,
                    contract.artifact.clone(),
                ),
            );
            continue;
        }

        let loaded;
        let table = match preloaded.get(&contract.artifact) {
            Some(t) => *t,
            None => match Table::load(&path) {
                Ok(t) => {
                    loaded = t;
                    &loaded
                }
                Err(e) => {
                    let mut stage_report = StageContractReport::empty(
                        stage,
                        StageContractStatus::Fail,
                        contract.artifact.clone(),
                    );
                    stage_report.findings.push(Finding::new(
                        Severity::Error,
                        Category::Contract,
                        format!("{stage}_artifact_unreadable"),
                        e.to_string(),
                    ));
                    findings.extend(stage_report.findings.iter().cloned());
                    contracts.insert(stage.clone(), stage_report);
                    continue;
                }
            },
        };

        let stage_report = evaluate_stage(stage, contract, table, &ctx);
        info!(
            stage = %stage,
            status = ?stage_report.status,
            findings = stage_report.findings.len(),
            "contract evaluated"
        );
        findings.extend(stage_report.findings.iter().cloned());
        contracts.insert(stage.clone(), stage_report);
    }

    let summary = SeverityCounts::from_findings(&findings);
    let generated = clock::now_unix_ms();
    ContractReport {
        generated_unix_ms: generated,
        generated_utc: clock::iso_utc(generated),
        status: contract_status(&summary),
        summary,
        stages: stages.to_vec(),
        contracts,
        findings,
    }
}

pub struct ContractOutputs {
    pub report_path: PathBuf,
    pub summary_path: PathBuf,
    pub failed_marker: Option<PathBuf>,
}

pub fn write_contract_outputs(
    report: &ContractReport,
    out_dir: &Path,
) -> anyhow::Result<ContractOutputs> {
    let report_path = out_dir.join("contract_report.json");
    let summary_path = out_dir.join("contract_summary.md");
    storage::write_json(&report_path, report)?;
    storage::write_text(&summary_path, &report::contract_markdown(report))?;
    let failed_marker = if report.status == Status::Fail {
        let marker = out_dir.join(FAILED_CONTRACT_FILENAME);
        storage::write_json(
            &marker,
            &serde_json::json!({
                "status": report.status,
                "generated_utc": report.generated_utc,
                "stages": report.stages,
                "summary": report.summary,
                "findings": report.findings,
            }),
        )?;
        Some(marker)
    } else {
        None
    };
    Ok(ContractOutputs {
        report_path,
        summary_path,
        failed_marker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{Rule, RuleSpec};
    use tempfile::TempDir;

    fn contract(rules: Vec<RuleSpec>) -> StageContract {
        StageContract {
            artifact: "out.csv".to_string(),
            rules,
        }
    }

    fn cfg_with(contract: StageContract) -> GuardConfig {
        GuardConfig {
            contracts: BTreeMap::from([("cohort".to_string(), contract)]),
            ..GuardConfig::default()
        }
    }

    fn union_rule() -> Rule {
        Rule::UnionFlag {
            target: "any".to_string(),
            components: vec!["a".to_string(), "b".to_string()],
            code: "any_mismatch".to_string(),
        }
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let contracts = GuardConfig::default().contracts;
        assert_eq!(resolve_stages("all", &contracts).unwrap().len(), 2);
        assert_eq!(resolve_stages("cohort", &contracts).unwrap(), vec!["cohort"]);
        assert!(matches!(
            resolve_stages("cohort,rater", &contracts),
            Err(GuardError::UnsupportedStage(s)) if s == vec!["rater".to_string()]
        ));
    }

    #[test]
    fn missing_artifact_marks_stage_missing() {
        let tmp = TempDir::new().unwrap();
        let cfg = cfg_with(contract(vec![RuleSpec::error(union_rule())]));
        let report = run_contracts(tmp.path(), &cfg, &["cohort".to_string()], &BTreeMap::new());
        assert_eq!(report.status, Status::Fail);
        assert_eq!(report.contracts["cohort"].status, StageContractStatus::Missing);
        assert_eq!(report.findings[0].code, "missing_cohort_artifact");
    }

    #[test]
    fn missing_columns_skip_or_degrade() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("out.csv"), "a,b\n1,0\n").unwrap();
        let stages = ["cohort".to_string()];

        let skip = run_contracts(
            tmp.path(),
            &cfg_with(contract(vec![RuleSpec::error(union_rule())])),
            &stages,
            &BTreeMap::new(),
        );
        assert_eq!(skip.status, Status::Pass);
        assert!(skip.findings.is_empty());

        let degrade = run_contracts(
            tmp.path(),
            &cfg_with(contract(vec![RuleSpec::error(union_rule()).degrading()])),
            &stages,
            &BTreeMap::new(),
        );
        assert_eq!(degrade.status, Status::Warning);
        assert_eq!(degrade.findings[0].code, "export_incomplete");
    }

    #[test]
    fn preloaded_tables_are_reused_and_failures_write_marker() {
        let tmp = TempDir::new().unwrap();
        // The file on disk is clean; the preloaded table is not.
        std::fs::write(tmp.path().join("out.csv"), "a,b,any\n1,0,1\n").unwrap();
        let bad = Table::from_csv_str("a,b,any\n1,0,0\n0,1,0\n0,0,0\n").unwrap();
        let preloaded = BTreeMap::from([("out.csv".to_string(), &bad)]);
        let cfg = cfg_with(contract(vec![RuleSpec::error(union_rule())]));
        let report = run_contracts(tmp.path(), &cfg, &["cohort".to_string()], &preloaded);

        assert_eq!(report.status, Status::Fail);
        assert_eq!(report.findings.len(), 1);
        let stage = &report.contracts["cohort"];
        assert_eq!(stage.row_count, Some(3));
        assert_eq!(stage.diagnostics["any_mismatch_rows"], 2.0);

        let out = write_contract_outputs(&report, &tmp.path().join("contracts")).unwrap();
        assert!(out.report_path.exists());
        assert!(out.summary_path.exists());
        assert!(out.failed_marker.unwrap().exists());
    }

    #[test]
    fn unrequested_stages_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let report = run_contracts(
            tmp.path(),
            &GuardConfig::default(),
            &["classifier".to_string()],
            &BTreeMap::new(),
        );
        assert_eq!(report.contracts["cohort"].status, StageContractStatus::Skipped);
        assert_eq!(report.contracts["classifier"].status, StageContractStatus::Missing);
    }
}

pub const CONFIG_FILENAME: &str = "pipeguard.toml";
pub const EVENT_LOG_RELPATH: &str = "debug/pipeguard_events.jsonl";

pub const DATA_DIRNAME: &str = "MIMIC tabular data";
pub const PRIOR_RUNS_DIRNAME: &str = "prior runs";
pub const CANONICAL_COHORT_FILENAME: &str = "MIMICIV all with CC.csv";
pub const CANONICAL_NLP_FILENAME: &str = "MIMICIV all with CC_with_NLP.csv";
pub const QA_SUMMARY_FILENAME: &str = "qa_summary.json";
pub const RATER_DIRNAME: &str = "annotation_agreement_outputs_nlp";
pub const RATER_JOIN_AUDIT_FILENAME: &str = "R3_vs_NLP_join_audit.json";
pub const RATER_SUMMARY_FILENAME: &str = "R3_vs_NLP_summary.txt";

pub const ANALYSIS_EXPORT_FILENAMES: [&str; 4] = [
    "Symptom_Composition_by_Hypercapnia_Definition.csv",
    "Symptom_Composition_Pivot_ChartReady.csv",
    "Symptom_Composition_by_ABG_VBG_Overlap.csv",
    "Symptom_Composition_by_ICD_Gas_Overlap.csv",
];

pub const BASELINE_ROOT: &str = "artifacts/baselines/pipeline";
pub const PARITY_ROOT: &str = "debug/pipeline_parity";
pub const AUDIT_ROOT: &str = "debug/pipeline_audit";
pub const CONTRACT_ROOT: &str = "debug/contracts";

pub const BASELINE_MANIFEST_FILENAME: &str = "baseline_manifest.json";
pub const AUDIT_REPORT_FILENAME: &str = "audit_report.json";
pub const LATEST_AUDIT_COPY_RELPATH: &str = "debug/pipeline_audit/latest_audit_report.json";
pub const FAILED_CONTRACT_FILENAME: &str = "FAILED_CONTRACT.json";

pub const CONSISTENCY_STAGE_ID: &str = "05_consistency";

use crate::domain::constants::*;
use crate::domain::models::{CompareMode, DriftRule, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every rule table the engine consults. Loaded from `pipeguard.toml`;
/// any table left out of the file keeps its built-in default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub stages: Vec<StageSpec>,
    pub consistency_stage: StageSpec,
    pub stage_env: BTreeMap<String, String>,
    pub artifacts: ArtifactsConfig,
    pub quality: QualityConfig,
    pub drift_rules: BTreeMap<String, DriftRule>,
    pub logs: LogScanConfig,
    pub contracts: BTreeMap<String, StageContract>,
    pub preflight: PreflightConfig,
    pub output: OutputConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            stages: vec![
                StageSpec::new("01_cohort", "make notebook-cohort"),
                StageSpec::new("02_classifier", "make notebook-classifier"),
                StageSpec::new("03_rater", "make notebook-rater"),
                StageSpec::new("04_analysis", "make notebook-analysis"),
            ],
            consistency_stage: StageSpec::new(CONSISTENCY_STAGE_ID, "make notebook-pipeline"),
            stage_env: BTreeMap::from([("PYTHONUNBUFFERED".to_string(), "1".to_string())]),
            artifacts: ArtifactsConfig::default(),
            quality: QualityConfig::default(),
            drift_rules: default_drift_rules(),
            logs: LogScanConfig::default(),
            contracts: BTreeMap::from([
                (
                    "cohort".to_string(),
                    StageContract {
                        artifact: data_path(CANONICAL_COHORT_FILENAME),
                        rules: default_cohort_rules(),
                    },
                ),
                (
                    "classifier".to_string(),
                    StageContract {
                        artifact: data_path(CANONICAL_NLP_FILENAME),
                        rules: default_classifier_rules(),
                    },
                ),
            ]),
            preflight: PreflightConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    pub id: String,
    pub command: String,
}

impl StageSpec {
    pub fn new(id: &str, command: &str) -> Self {
        Self {
            id: id.to_string(),
            command: command.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityKey {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub required_columns: Vec<String>,
    #[serde(default)]
    pub identity_keys: Vec<IdentityKey>,
    /// Current-metric name that receives this table's row count.
    #[serde(default)]
    pub row_metric: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinAuditSpec {
    pub path: String,
    pub match_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub tables: Vec<TableSpec>,
    pub quality_summary: String,
    pub join_audit: JoinAuditSpec,
    pub other: Vec<String>,
    pub analysis_exports: Vec<String>,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        let identity = || {
            vec![
                IdentityKey {
                    name: "hadm_id".to_string(),
                    columns: strings(&["hadm_id"]),
                },
                IdentityKey {
                    name: "subject_id".to_string(),
                    columns: strings(&["subject_id"]),
                },
                IdentityKey {
                    name: "id_pair".to_string(),
                    columns: strings(&["hadm_id", "subject_id"]),
                },
            ]
        };
        Self {
            tables: vec![
                TableSpec {
                    name: "cohort".to_string(),
                    path: data_path(CANONICAL_COHORT_FILENAME),
                    required_columns: strings(&[
                        "hadm_id",
                        "subject_id",
                        "ed_stay_id",
                        "anthro_timing_tier",
                        "anthro_days_offset",
                        "anthro_chartdate",
                        "anthro_timing_uncertain",
                    ]),
                    identity_keys: identity(),
                    row_metric: Some("cohort_rows".to_string()),
                },
                TableSpec {
                    name: "classifier".to_string(),
                    path: data_path(CANONICAL_NLP_FILENAME),
                    required_columns: strings(&[
                        "hadm_id", "subject_id", "RFV1", "RFV2", "RFV3", "RFV4", "RFV5",
                    ]),
                    identity_keys: identity(),
                    row_metric: Some("classifier_rows".to_string()),
                },
            ],
            quality_summary: QA_SUMMARY_FILENAME.to_string(),
            join_audit: JoinAuditSpec {
                path: format!("{RATER_DIRNAME}/{RATER_JOIN_AUDIT_FILENAME}"),
                match_field: "matched_rows".to_string(),
            },
            other: vec![format!("{RATER_DIRNAME}/{RATER_SUMMARY_FILENAME}")],
            analysis_exports: strings(&ANALYSIS_EXPORT_FILENAMES),
        }
    }
}

impl ArtifactsConfig {
    /// Every required artifact as a work-dir relative path, in a stable order.
    pub fn required(&self) -> Vec<String> {
        let mut out: Vec<String> = self.tables.iter().map(|t| t.path.clone()).collect();
        out.push(self.quality_summary.clone());
        out.push(self.join_audit.path.clone());
        out.extend(self.other.iter().cloned());
        out.extend(self.analysis_exports.iter().cloned());
        out
    }
}

/// Selects one record out of a JSON array and reads a numeric field from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetric {
    pub name: String,
    pub pointer: String,
    pub match_field: String,
    pub match_value: String,
    pub value_field: String,
    #[serde(default)]
    pub missing_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointerCheck {
    pub pointer: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachCheck {
    pub candidate_pointers: Vec<String>,
    pub attached_pointer: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentRecordsCheck {
    pub pointer: String,
    pub field: String,
    pub absent_code: String,
    pub missing_code: String,
    pub invalid_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Top-level quality-summary fields copied into the metric maps.
    pub metrics: Vec<String>,
    pub record_metrics: Vec<RecordMetric>,
    pub collapse_flags: Vec<PointerCheck>,
    pub pass_checks: Vec<PointerCheck>,
    pub attach_checks: Vec<AttachCheck>,
    pub percent_records: Vec<PercentRecordsCheck>,
    pub excerpt_keys: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            metrics: strings(&[
                "icu_link_rate",
                "pct_any_gas_0_6h",
                "pct_any_gas_0_24h",
                "gas_source_other_rate",
            ]),
            record_metrics: vec![RecordMetric {
                name: "first_other_pco2_pct_eq_160_poc".to_string(),
                pointer: "/first_other_pco2_audit".to_string(),
                match_field: "source".to_string(),
                match_value: "POC".to_string(),
                value_field: "pct_eq_160".to_string(),
                missing_code: Some("missing_first_other_pco2_audit".to_string()),
            }],
            collapse_flags: vec![PointerCheck {
                pointer: "/gas_source_audit/all_other_or_unknown".to_string(),
                code: "all_other_or_unknown_gas_source".to_string(),
                message: "Gas source attribution collapsed to all other/unknown.".to_string(),
            }],
            pass_checks: vec![PointerCheck {
                pointer: "/uom_expectation_checks/paco2_uom_checks".to_string(),
                code: "uom_paco2_failure".to_string(),
                message: "pCO2 UOM validation failed".to_string(),
            }],
            attach_checks: vec![AttachCheck {
                candidate_pointers: strings(&[
                    "/omr_diagnostics/pre_window_candidate_rows",
                    "/omr_diagnostics/post_window_candidate_rows",
                ]),
                attached_pointer: "/omr_diagnostics/attached_non_null_counts".to_string(),
                code: "omr_attach_inconsistency".to_string(),
                message: "OMR had in-window candidates but attached anthropometrics are all null."
                    .to_string(),
            }],
            percent_records: vec![PercentRecordsCheck {
                pointer: "/vitals_outlier_audit".to_string(),
                field: "out_of_range_pct".to_string(),
                absent_code: "missing_vitals_outlier_audit".to_string(),
                missing_code: "missing_vitals_outlier_pct".to_string(),
                invalid_code: "invalid_vitals_outlier_pct".to_string(),
            }],
            excerpt_keys: strings(&[
                "icu_link_rate",
                "pct_any_gas_0_6h",
                "pct_any_gas_0_24h",
                "gas_source_other_rate",
                "gas_source_audit",
                "uom_expectation_checks",
                "omr_diagnostics",
                "first_other_pco2_audit",
            ]),
        }
    }
}

pub fn default_drift_rules() -> BTreeMap<String, DriftRule> {
    let rule = |compare, warn, fail| DriftRule {
        compare,
        warn,
        fail,
        lower_is_better: false,
    };
    let mut rules = BTreeMap::new();
    rules.insert("cohort_rows".to_string(), rule(CompareMode::Relative, 0.05, 0.10));
    rules.insert("classifier_rows".to_string(), rule(CompareMode::Relative, 0.05, 0.10));
    for metric in ["icu_link_rate", "pct_any_gas_0_6h", "pct_any_gas_0_24h"] {
        rules.insert(metric.to_string(), rule(CompareMode::Absolute, 0.04, 0.08));
    }
    rules.insert(
        "gas_source_other_rate".to_string(),
        DriftRule {
            lower_is_better: true,
            ..rule(CompareMode::Absolute, 0.04, 0.08)
        },
    );
    rules.insert(
        "first_other_pco2_pct_eq_160_poc".to_string(),
        rule(CompareMode::Absolute, 0.05, 0.10),
    );
    rules
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPattern {
    pub severity: Severity,
    pub pattern: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogScanConfig {
    /// Ordered; the first match wins for a line.
    pub patterns: Vec<LogPattern>,
    pub allowlist: Vec<String>,
}

impl Default for LogScanConfig {
    fn default() -> Self {
        let p = |severity, pattern: &str, code: &str| LogPattern {
            severity,
            pattern: pattern.to_string(),
            code: code.to_string(),
        };
        Self {
            patterns: vec![
                p(Severity::Fatal, r"Traceback \(most recent call last\)", "traceback"),
                p(Severity::Fatal, r"\bERROR\b", "error_token"),
                p(Severity::Fatal, r"\bException\b", "exception_token"),
                p(Severity::Error, "RuntimeWarning", "runtime_warning"),
                p(Severity::Error, "ConvergenceWarning", "convergence_warning"),
                p(Severity::Error, "overflow", "overflow"),
                p(Severity::Error, "invalid value encountered", "invalid_value"),
            ],
            allowlist: strings(&[r"Skipping .*archive .* export"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    pub dotenv: String,
    pub required_keys: Vec<String>,
    pub work_dir_key: String,
    /// Empty disables the credential check.
    pub credential_command: Vec<String>,
    pub credential_timeout_secs: u64,
    pub resources: Vec<String>,
    pub tool_versions: BTreeMap<String, Vec<String>>,
    pub env_knobs: Vec<String>,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            dotenv: ".env".to_string(),
            required_keys: strings(&[
                "MIMIC_BACKEND",
                "WORK_PROJECT",
                "BQ_PHYSIONET_PROJECT",
                "BQ_DATASET_HOSP",
                "BQ_DATASET_ICU",
                "BQ_DATASET_ED",
            ]),
            work_dir_key: "WORK_DIR".to_string(),
            credential_command: strings(&[
                "gcloud",
                "auth",
                "application-default",
                "print-access-token",
            ]),
            credential_timeout_secs: 30,
            resources: Vec::new(),
            tool_versions: BTreeMap::from([
                ("python".to_string(), strings(&["python3", "--version"])),
                ("uv".to_string(), strings(&["uv", "--version"])),
            ]),
            env_knobs: strings(&[
                "WORK_DIR",
                "CLASSIFIER_INPUT_FILENAME",
                "RATER_NLP_INPUT_FILENAME",
                "RATER_ANNOTATION_PATH",
                "ANALYSIS_INPUT_FILENAME",
                "BQ_QUERY_TIMEOUT_SECS",
                "WRITE_ARCHIVE_XLSX_EXPORTS",
                "COHORT_FAIL_ON_ALL_OTHER_SOURCE",
                "COHORT_FAIL_ON_OMR_ATTACH_INCONSISTENCY",
                "COHORT_ALLOW_EMPTY_OMR",
                "GOOGLE_APPLICATION_CREDENTIALS",
                "HF_TOKEN",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub baseline_root: String,
    pub parity_root: String,
    pub audit_root: String,
    pub contract_root: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            baseline_root: BASELINE_ROOT.to_string(),
            parity_root: PARITY_ROOT.to_string(),
            audit_root: AUDIT_ROOT.to_string(),
            contract_root: CONTRACT_ROOT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageContract {
    pub artifact: String,
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingColumnPolicy {
    #[default]
    Skip,
    Degrade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default)]
    pub on_missing: MissingColumnPolicy,
    /// Severity for single-tier rules; tiered rules carry their own.
    #[serde(default = "error_severity")]
    pub severity: Severity,
    #[serde(flatten)]
    pub rule: Rule,
}

fn error_severity() -> Severity {
    Severity::Error
}

/// Row predicate. An empty `equals` list means "cell is non-null".
/// Values compare trimmed and case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    #[serde(default)]
    pub equals: Vec<String>,
    #[serde(default)]
    pub negate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitBand {
    pub min: f64,
    pub max: f64,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitPairing {
    pub column: String,
    pub canonical: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Json,
    Csv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    Unique {
        columns: Vec<String>,
        code: String,
    },
    UnionFlag {
        target: String,
        components: Vec<String>,
        code: String,
    },
    AllowedValues {
        column: String,
        allowed: Vec<String>,
        code: String,
    },
    NumericRange {
        column: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        code: String,
        #[serde(default)]
        unit_confusion: Option<UnitBand>,
    },
    Coverage {
        column: String,
        #[serde(default)]
        filter: Option<RowFilter>,
        #[serde(default)]
        warn_below: Option<f64>,
        #[serde(default)]
        fail_below: Option<f64>,
        code: String,
    },
    MeanThreshold {
        column: String,
        #[serde(default)]
        warn_at: Option<f64>,
        #[serde(default)]
        fail_at: Option<f64>,
        warn_code: String,
        fail_code: String,
    },
    MedianBand {
        column: String,
        #[serde(default)]
        filter: Option<RowFilter>,
        min: f64,
        max: f64,
        code: String,
    },
    Provenance {
        when: RowFilter,
        #[serde(default)]
        requires: Vec<String>,
        presence_code: String,
        #[serde(default)]
        unit: Option<UnitPairing>,
        #[serde(default)]
        unit_code: Option<String>,
    },
    RequiredColumns {
        columns: Vec<String>,
        #[serde(default)]
        when_present: Option<String>,
        code: String,
    },
    CompanionFile {
        dir: String,
        pattern: String,
        format: FileFormat,
        missing_code: String,
        parse_code: String,
    },
    JsonArrayCells {
        column: String,
        code: String,
    },
    RequireAnyValue {
        column: String,
        values: Vec<String>,
        code: String,
    },
    FlagAgreement {
        derived: String,
        authoritative: String,
        #[serde(default)]
        tolerance: f64,
        code: String,
    },
    ZeroPositives {
        column: String,
        code: String,
        #[serde(default)]
        escalate_column: Option<String>,
        #[serde(default)]
        escalate_code: Option<String>,
    },
    Tally {
        column: String,
        diagnostic: String,
    },
}

impl RuleSpec {
    pub fn error(rule: Rule) -> Self {
        Self {
            on_missing: MissingColumnPolicy::Skip,
            severity: Severity::Error,
            rule,
        }
    }

    pub fn warning(rule: Rule) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(rule)
        }
    }

    pub fn degrading(mut self) -> Self {
        self.on_missing = MissingColumnPolicy::Degrade;
        self
    }
}

const ED_VITALS_CLEAN_COLUMNS: [(&str, &[&str]); 10] = [
    (
        "ed_triage_temp",
        &[
            "ed_triage_temp_f_clean",
            "ed_triage_temp_was_celsius_like",
            "ed_triage_temp_out_of_range",
        ],
    ),
    (
        "ed_first_temp",
        &[
            "ed_first_temp_f_clean",
            "ed_first_temp_was_celsius_like",
            "ed_first_temp_out_of_range",
        ],
    ),
    (
        "ed_triage_pain",
        &[
            "ed_triage_pain_clean",
            "ed_triage_pain_is_sentinel_13",
            "ed_triage_pain_out_of_range",
        ],
    ),
    (
        "ed_first_pain",
        &[
            "ed_first_pain_clean",
            "ed_first_pain_is_sentinel_13",
            "ed_first_pain_out_of_range",
        ],
    ),
    ("ed_triage_sbp", &["ed_triage_sbp_clean", "ed_triage_sbp_out_of_range"]),
    ("ed_triage_dbp", &["ed_triage_dbp_clean", "ed_triage_dbp_out_of_range"]),
    ("ed_first_sbp", &["ed_first_sbp_clean", "ed_first_sbp_out_of_range"]),
    ("ed_first_dbp", &["ed_first_dbp_clean", "ed_first_dbp_out_of_range"]),
    (
        "ed_triage_o2sat",
        &[
            "ed_triage_o2sat_clean",
            "ed_triage_o2sat_gt_100",
            "ed_triage_o2sat_out_of_range",
            "ed_triage_o2sat_zero",
        ],
    ),
    (
        "ed_first_o2sat",
        &[
            "ed_first_o2sat_clean",
            "ed_first_o2sat_gt_100",
            "ed_first_o2sat_out_of_range",
            "ed_first_o2sat_zero",
        ],
    ),
];

const ED_VITALS_CLEAN_BOUNDS: [(&str, f64, f64); 10] = [
    ("ed_triage_temp_f_clean", 50.0, 120.0),
    ("ed_first_temp_f_clean", 50.0, 120.0),
    ("ed_triage_pain_clean", 0.0, 10.0),
    ("ed_first_pain_clean", 0.0, 10.0),
    ("ed_triage_sbp_clean", 20.0, 300.0),
    ("ed_first_sbp_clean", 20.0, 300.0),
    ("ed_triage_dbp_clean", 10.0, 200.0),
    ("ed_first_dbp_clean", 10.0, 200.0),
    ("ed_triage_o2sat_clean", 0.0, 100.0),
    ("ed_first_o2sat_clean", 0.0, 100.0),
];

pub fn default_cohort_rules() -> Vec<RuleSpec> {
    let mut rules = vec![
        RuleSpec::error(Rule::Unique {
            columns: strings(&["hadm_id"]),
            code: "hadm_id_not_unique".to_string(),
        }),
        RuleSpec::error(Rule::Unique {
            columns: strings(&["ed_stay_id"]),
            code: "ed_stay_id_not_unique".to_string(),
        }),
        RuleSpec::error(Rule::UnionFlag {
            target: "pco2_threshold_any".to_string(),
            components: strings(&[
                "abg_hypercap_threshold",
                "vbg_hypercap_threshold",
                "other_hypercap_threshold",
            ]),
            code: "pco2_threshold_any_mismatch".to_string(),
        }),
        RuleSpec::error(Rule::RequiredColumns {
            columns: strings(&[
                "gas_source_inference_primary_tier",
                "gas_source_hint_conflict_rate",
                "gas_source_resolved_rate",
            ]),
            when_present: None,
            code: "missing_gas_source_diagnostic_columns".to_string(),
        }),
    ];

    for (raw, clean) in ED_VITALS_CLEAN_COLUMNS {
        rules.push(RuleSpec::error(Rule::RequiredColumns {
            columns: strings(clean),
            when_present: Some(raw.to_string()),
            code: "missing_ed_vitals_clean_columns".to_string(),
        }));
    }
    for (column, min, max) in ED_VITALS_CLEAN_BOUNDS {
        let unit_confusion = column.ends_with("_temp_f_clean").then(|| UnitBand {
            min: 20.0,
            max: 50.0,
            code: "ed_temp_clean_contains_celsius_band_values".to_string(),
        });
        rules.push(RuleSpec::error(Rule::NumericRange {
            column: column.to_string(),
            min: Some(min),
            max: Some(max),
            code: "invalid_ed_vitals_clean_range".to_string(),
            unit_confusion,
        }));
    }

    rules.extend([
        RuleSpec::warning(Rule::MeanThreshold {
            column: "gas_source_other_rate".to_string(),
            warn_at: Some(0.50),
            fail_at: None,
            warn_code: "gas_source_other_rate_high".to_string(),
            fail_code: "gas_source_other_rate_fail_threshold_exceeded".to_string(),
        }),
        RuleSpec::error(Rule::MedianBand {
            column: "first_other_pco2".to_string(),
            filter: Some(RowFilter {
                column: "first_other_src".to_string(),
                equals: strings(&["POC"]),
                negate: false,
            }),
            min: 45.0,
            max: 80.0,
            code: "poc_other_pco2_median_out_of_bounds".to_string(),
        }),
        RuleSpec::error(Rule::RequireAnyValue {
            column: "anthro_source".to_string(),
            values: strings(&["omr", "icu_charted"]),
            code: "anthro_no_supported_sources".to_string(),
        }),
        RuleSpec::error(Rule::AllowedValues {
            column: "anthro_source".to_string(),
            allowed: strings(&["omr", "icu_charted", "missing"]),
            code: "anthro_source_unexpected_value".to_string(),
        }),
        RuleSpec::error(Rule::Coverage {
            column: "bmi_closest_pre_ed".to_string(),
            filter: None,
            warn_below: None,
            fail_below: Some(0.30),
            code: "anthro_bmi_coverage_below_minimum".to_string(),
        }),
    ]);

    for gas in ["abg", "vbg", "other"] {
        let value = format!("poc_{gas}_paco2");
        rules.push(RuleSpec::error(Rule::Provenance {
            when: RowFilter {
                column: value.clone(),
                equals: Vec::new(),
                negate: false,
            },
            requires: Vec::new(),
            presence_code: "paco2_uom_missing_with_value".to_string(),
            unit: Some(UnitPairing {
                column: format!("{value}_uom"),
                canonical: "mmHg".to_string(),
            }),
            unit_code: Some("paco2_uom_not_canonical".to_string()),
        }));
    }
    rules
}

pub fn default_classifier_rules() -> Vec<RuleSpec> {
    let agreement = |gas: &str| {
        RuleSpec::error(Rule::FlagAgreement {
            derived: format!("hypercap_by_{gas}"),
            authoritative: format!("flag_{gas}_hypercapnia"),
            tolerance: 0.0,
            code: format!("{gas}_authoritative_disagreement"),
        })
    };
    vec![
        RuleSpec::error(Rule::Unique {
            columns: strings(&["hadm_id"]),
            code: "hadm_id_not_unique".to_string(),
        }),
        RuleSpec::error(Rule::RequiredColumns {
            columns: strings(&["segment_preds"]),
            when_present: None,
            code: "missing_segment_preds".to_string(),
        }),
        RuleSpec::error(Rule::JsonArrayCells {
            column: "segment_preds".to_string(),
            code: "segment_preds_malformed".to_string(),
        }),
        RuleSpec::error(Rule::UnionFlag {
            target: "hypercap_by_bg".to_string(),
            components: strings(&["hypercap_by_abg", "hypercap_by_vbg"]),
            code: "bg_union_mismatch".to_string(),
        }),
        RuleSpec::warning(Rule::ZeroPositives {
            column: "hypercap_by_abg".to_string(),
            code: "abg_all_zero".to_string(),
            escalate_column: Some("flag_abg_hypercapnia".to_string()),
            escalate_code: Some("abg_all_zero_with_authoritative_positive".to_string()),
        }),
        agreement("abg"),
        agreement("vbg"),
        RuleSpec::error(Rule::RequiredColumns {
            columns: strings(&["cc_missing_reason", "cc_pseudomissing_flag", "cc_missing_flag"]),
            when_present: None,
            code: "missing_cc_missingness_columns".to_string(),
        }),
        RuleSpec::error(Rule::Provenance {
            when: RowFilter {
                column: "cc_missing_reason".to_string(),
                equals: strings(&["true_missing"]),
                negate: true,
            },
            requires: strings(&["RFV1_name"]),
            presence_code: "unexpected_blank_rfv1".to_string(),
            unit: None,
            unit_code: None,
        }),
        RuleSpec::error(Rule::Tally {
            column: "cc_pseudomissing_flag".to_string(),
            diagnostic: "pseudo_missing_rows".to_string(),
        }),
        RuleSpec::error(Rule::CompanionFile {
            dir: format!("{DATA_DIRNAME}/{PRIOR_RUNS_DIRNAME}"),
            pattern: "* classifier_cc_missing_audit.csv".to_string(),
            format: FileFormat::Csv,
            missing_code: "missing_classifier_cc_missing_audit".to_string(),
            parse_code: "classifier_cc_missing_audit_unreadable".to_string(),
        }),
    ]
}

fn data_path(file_name: &str) -> String {
    format!("{DATA_DIRNAME}/{file_name}")
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_required_artifact() {
        let cfg = GuardConfig::default();
        let required = cfg.artifacts.required();
        assert_eq!(required.len(), 9);
        assert!(required.contains(&"qa_summary.json".to_string()));
        assert_eq!(cfg.stages.len(), 4);
        assert!(cfg.drift_rules["gas_source_other_rate"].lower_is_better);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let raw = r#"
[[stages]]
id = "01_echo"
command = "echo hi"

[drift_rules.cohort_rows]
compare = "absolute"
warn = 1.0
fail = 2.0
"#;
        let cfg: GuardConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.stages.len(), 1);
        assert_eq!(cfg.drift_rules.len(), 1);
        assert_eq!(cfg.drift_rules["cohort_rows"].compare, CompareMode::Absolute);
        assert_eq!(cfg.contracts.len(), 2);
        assert_eq!(cfg.logs.patterns[0].code, "traceback");
    }

    #[test]
    fn rule_specs_parse_from_tagged_tables() {
        let raw = r#"
artifact = "table.csv"

[[rules]]
kind = "union_flag"
target = "any"
components = ["a", "b"]
code = "any_mismatch"

[[rules]]
kind = "coverage"
on_missing = "degrade"
column = "bmi"
warn_below = 0.5
fail_below = 0.3
code = "bmi_low"
"#;
        let contract: StageContract = toml::from_str(raw).unwrap();
        assert_eq!(contract.rules.len(), 2);
        assert!(matches!(contract.rules[0].rule, Rule::UnionFlag { .. }));
        assert_eq!(contract.rules[0].severity, Severity::Error);
        assert_eq!(contract.rules[1].on_missing, MissingColumnPolicy::Degrade);
    }
}

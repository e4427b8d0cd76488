#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const COHORT: &str = "MIMIC tabular data/MIMICIV all with CC.csv";
pub const CLASSIFIER: &str = "MIMIC tabular data/MIMICIV all with CC_with_NLP.csv";
pub const QA_SUMMARY: &str = "qa_summary.json";
pub const JOIN_AUDIT: &str = "annotation_agreement_outputs_nlp/R3_vs_NLP_join_audit.json";
pub const EXPORTS: [&str; 4] = [
    "Symptom_Composition_by_Hypercapnia_Definition.csv",
    "Symptom_Composition_Pivot_ChartReady.csv",
    "Symptom_Composition_by_ABG_VBG_Overlap.csv",
    "Symptom_Composition_by_ICD_Gas_Overlap.csv",
];

pub const COHORT_CSV: &str = "\
hadm_id,subject_id,ed_stay_id,anthro_timing_tier,anthro_days_offset,anthro_chartdate,anthro_timing_uncertain,gas_source_inference_primary_tier,gas_source_hint_conflict_rate,gas_source_resolved_rate,pco2_threshold_any,abg_hypercap_threshold,vbg_hypercap_threshold,other_hypercap_threshold
1,10,100,pre,-1,2020-01-01,0,abg,0.0,1.0,1,1,0,0
2,20,200,pre,0,2020-02-01,0,vbg,0.0,1.0,1,0,1,0
3,30,300,post,2,2020-03-01,1,other,0.1,0.9,0,0,0,0
";

pub const CLASSIFIER_CSV: &str = "\
hadm_id,subject_id,RFV1,RFV2,RFV3,RFV4,RFV5,RFV1_name,segment_preds,cc_missing_reason,cc_pseudomissing_flag,cc_missing_flag
1,10,A,,,,,Dyspnea,[],,0,0
2,20,B,,,,,Cough,[],,0,0
3,30,C,,,,,Fever,[],,1,0
";

pub struct TestEnv {
    _tmp: TempDir,
    pub home: PathBuf,
    pub work: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let home = tmp.path().join("home");
        fs::create_dir_all(&home).expect("create isolated home");
        let work = tmp.path().join("work");
        fs::create_dir_all(&work).expect("create work dir");
        let work = work.canonicalize().expect("canonical work dir");

        let env = Self {
            _tmp: tmp,
            home,
            work,
        };
        env.seed_workspace();
        env.write_config(&[
            ("01_cohort", "echo building cohort"),
            ("02_classifier", "echo classifying notes"),
        ]);
        env
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.work.join(rel)
    }

    pub fn write(&self, rel: &str, body: &str) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        fs::write(path, body).expect("write fixture file");
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.path(rel)).expect("remove fixture file");
    }

    /// Stage commands are written as TOML literal strings.
    pub fn write_config(&self, stages: &[(&str, &str)]) {
        let stages = stages
            .iter()
            .map(|(id, cmd)| format!("  {{ id = '{id}', command = '{cmd}' }},"))
            .collect::<Vec<_>>()
            .join("\n");
        let body = format!(
            "stages = [\n{stages}\n]\n\
consistency_stage = {{ id = '05_consistency', command = 'echo consistency ok' }}\n\n\
[preflight]\n\
required_keys = ['WORK_PROJECT']\n\
credential_command = []\n\
tool_versions = {{}}\n"
        );
        self.write("pipeguard.toml", &body);
    }

    fn seed_workspace(&self) {
        self.write(COHORT, COHORT_CSV);
        self.write(CLASSIFIER, CLASSIFIER_CSV);
        self.write(
            "MIMIC tabular data/prior runs/2024-01-01 classifier_cc_missing_audit.csv",
            "reason,count\ntrue_missing,0\n",
        );
        self.write(
            QA_SUMMARY,
            &serde_json::json!({
                "icu_link_rate": 0.5,
                "pct_any_gas_0_6h": 0.4,
                "pct_any_gas_0_24h": 0.6,
                "gas_source_other_rate": 0.2,
                "gas_source_audit": {"all_other_or_unknown": false},
                "first_other_pco2_audit": [{"source": "POC", "pct_eq_160": 0.01}],
                "vitals_outlier_audit": [{"vital": "temp", "out_of_range_pct": 0.5}]
            })
            .to_string(),
        );
        self.write(JOIN_AUDIT, r#"{"matched_rows": 3, "nlp_rows": 3}"#);
        self.write(
            "annotation_agreement_outputs_nlp/R3_vs_NLP_summary.txt",
            "kappa 0.81\n",
        );
        for name in EXPORTS {
            self.write(name, "group,n\nabg,2\nvbg,1\n");
        }
        self.write(
            ".env",
            &format!(
                "WORK_PROJECT=demo\nWORK_DIR={}\n",
                self.work.to_string_lossy()
            ),
        );
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("pipeguard");
        cmd.env("HOME", &self.home)
            .env_remove("RUST_LOG")
            .current_dir(&self.work);
        cmd
    }

    pub fn run_json(&self, args: &[&str]) -> Value {
        self.run_json_code(args, 0)
    }

    pub fn run_json_code(&self, args: &[&str], code: i32) -> Value {
        let out = self
            .cmd()
            .arg("--json")
            .args(args)
            .assert()
            .code(code)
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json output")
    }

    pub fn read_json(&self, path: impl AsRef<Path>) -> Value {
        let raw = fs::read_to_string(path.as_ref()).expect("read json file");
        serde_json::from_str(&raw).expect("valid json file")
    }

    pub fn codes(report: &Value) -> Vec<String> {
        report["findings"]
            .as_array()
            .expect("findings array")
            .iter()
            .map(|f| f["code"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

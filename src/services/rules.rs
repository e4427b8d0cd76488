//! Contract rule evaluation.
//!
//! Each rule is a pure predicate over one table (plus the work dir for
//! companion files). A rule only ever reports its own findings and
//! diagnostics; it never inspects or suppresses another rule's output.

use crate::domain::config::{FileFormat, Rule, RowFilter, RuleSpec};
use crate::domain::models::{Category, Finding, Severity};
use crate::services::storage;
use crate::services::table::{Cell, Table};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

pub struct RuleContext<'a> {
    pub work_dir: &'a Path,
}

#[derive(Debug, Default)]
pub struct RuleOutcome {
    pub findings: Vec<Finding>,
    pub diagnostics: BTreeMap<String, f64>,
}

impl RuleOutcome {
    fn push(&mut self, severity: Severity, code: &str, message: String) {
        self.findings
            .push(Finding::new(severity, Category::Contract, code, message));
    }

    fn diag(&mut self, key: impl Into<String>, value: f64) {
        self.diagnostics.insert(key.into(), value);
    }
}

/// Human-readable rule label, used when a rule is skipped or degraded.
pub fn rule_code(rule: &Rule) -> &str {
    match rule {
        Rule::Unique { code, .. }
        | Rule::UnionFlag { code, .. }
        | Rule::AllowedValues { code, .. }
        | Rule::NumericRange { code, .. }
        | Rule::Coverage { code, .. }
        | Rule::MedianBand { code, .. }
        | Rule::RequiredColumns { code, .. }
        | Rule::JsonArrayCells { code, .. }
        | Rule::RequireAnyValue { code, .. }
        | Rule::FlagAgreement { code, .. }
        | Rule::ZeroPositives { code, .. } => code,
        Rule::MeanThreshold { warn_code, .. } => warn_code,
        Rule::Provenance { presence_code, .. } => presence_code,
        Rule::CompanionFile { missing_code, .. } => missing_code,
        Rule::Tally { diagnostic, .. } => diagnostic,
    }
}

/// Columns a rule cannot run without. A negated provenance filter does not
/// need its column: when absent, no row is exempted.
pub fn required_columns(rule: &Rule) -> Vec<&str> {
    match rule {
        Rule::Unique { columns, .. } => columns.iter().map(String::as_str).collect(),
        Rule::UnionFlag {
            target, components, ..
        } => std::iter::once(target.as_str())
            .chain(components.iter().map(String::as_str))
            .collect(),
        Rule::AllowedValues { column, .. }
        | Rule::NumericRange { column, .. }
        | Rule::MeanThreshold { column, .. }
        | Rule::JsonArrayCells { column, .. }
        | Rule::RequireAnyValue { column, .. }
        | Rule::ZeroPositives { column, .. }
        | Rule::Tally { column, .. } => vec![column.as_str()],
        Rule::Coverage { column, filter, .. } | Rule::MedianBand { column, filter, .. } => {
            let mut cols = vec![column.as_str()];
            if let Some(f) = filter {
                cols.push(&f.column);
            }
            cols
        }
        Rule::Provenance {
            when,
            requires,
            unit,
            ..
        } => {
            let mut cols: Vec<&str> = requires.iter().map(String::as_str).collect();
            if !when.negate {
                cols.push(&when.column);
            }
            if let Some(u) = unit {
                cols.push(&u.column);
            }
            cols
        }
        Rule::FlagAgreement {
            derived,
            authoritative,
            ..
        } => vec![derived.as_str(), authoritative.as_str()],
        Rule::RequiredColumns { .. } | Rule::CompanionFile { .. } => Vec::new(),
    }
}

fn cells<'t>(table: &'t Table, column: &str) -> &'t [Cell] {
    table.column(column).unwrap_or(&[])
}

fn number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Int(v) => Some(*v as f64),
        Cell::Float(v) if !v.is_nan() => Some(*v),
        _ => None,
    }
}

/// Row mask for a filter; an absent column matches nothing (or everything
/// when negated).
pub fn filter_mask(table: &Table, filter: &RowFilter) -> Vec<bool> {
    match table.column(&filter.column) {
        None => vec![filter.negate; table.row_count()],
        Some(col) => col
            .iter()
            .map(|cell| {
                let hit = if filter.equals.is_empty() {
                    !cell.is_null()
                } else {
                    filter.equals.iter().any(|v| cell.matches_text(v))
                };
                hit != filter.negate
            })
            .collect(),
    }
}

fn mask_or_all(table: &Table, filter: &Option<RowFilter>) -> Vec<bool> {
    match filter {
        Some(f) => filter_mask(table, f),
        None => vec![true; table.row_count()],
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

pub fn evaluate(spec: &RuleSpec, table: &Table, ctx: &RuleContext) -> RuleOutcome {
    let mut out = RuleOutcome::default();
    let severity = spec.severity;
    match &spec.rule {
        Rule::Unique { columns, code } => {
            let mut seen = HashSet::new();
            for row in 0..table.row_count() {
                let key: Vec<String> = columns
                    .iter()
                    .map(|c| cells(table, c)[row].canonical())
                    .collect();
                seen.insert(key);
            }
            let duplicates = table.row_count() - seen.len();
            out.diag(format!("{}_duplicate_rows", columns.join("+")), duplicates as f64);
            if duplicates > 0 {
                out.push(
                    severity,
                    code,
                    format!("Found {duplicates} duplicate {} rows.", columns.join("+")),
                );
            }
        }
        Rule::UnionFlag {
            target,
            components,
            code,
        } => {
            let reported = cells(table, target);
            let mismatch = (0..table.row_count())
                .filter(|&row| {
                    let expected = components.iter().any(|c| cells(table, c)[row].truthy());
                    expected != reported[row].truthy()
                })
                .count();
            out.diag(format!("{target}_mismatch_rows"), mismatch as f64);
            if mismatch > 0 {
                out.push(
                    severity,
                    code,
                    format!("{target} mismatch in {mismatch} rows."),
                );
            }
        }
        Rule::AllowedValues {
            column,
            allowed,
            code,
        } => {
            let mut unexpected = BTreeSet::new();
            let mut count = 0usize;
            for cell in cells(table, column).iter().filter(|c| !c.is_null()) {
                let value = cell.canonical();
                if !allowed.iter().any(|a| a == value.trim()) {
                    count += 1;
                    unexpected.insert(value);
                }
            }
            out.diag(format!("{column}_unexpected_rows"), count as f64);
            if count > 0 {
                let sample: Vec<String> = unexpected.into_iter().take(5).collect();
                out.push(
                    severity,
                    code,
                    format!("{column} has {count} values outside {allowed:?}: {sample:?}"),
                );
            }
        }
        Rule::NumericRange {
            column,
            min,
            max,
            code,
            unit_confusion,
        } => {
            let values: Vec<f64> = cells(table, column).iter().filter_map(number).collect();
            let outside = values
                .iter()
                .filter(|&&v| {
                    min.map(|m| v < m).unwrap_or(false) || max.map(|m| v > m).unwrap_or(false)
                })
                .count();
            out.diag(format!("{column}_out_of_range_rows"), outside as f64);
            if outside > 0 {
                out.push(
                    severity,
                    code,
                    format!(
                        "{column} has {outside} non-null values outside [{}, {}].",
                        bound(*min),
                        bound(*max)
                    ),
                );
            }
            if let Some(band) = unit_confusion {
                let in_band = values
                    .iter()
                    .filter(|&&v| v >= band.min && v <= band.max)
                    .count();
                out.diag(format!("{column}_unit_band_rows"), in_band as f64);
                if in_band > 0 {
                    out.push(
                        severity,
                        &band.code,
                        format!(
                            "{column} has {in_band} non-null values in the {}-{} band.",
                            band.min, band.max
                        ),
                    );
                }
            }
        }
        Rule::Coverage {
            column,
            filter,
            warn_below,
            fail_below,
            code,
        } => {
            let mask = mask_or_all(table, filter);
            let col = cells(table, column);
            let population = mask.iter().filter(|&&m| m).count();
            if population > 0 {
                let covered = (0..table.row_count())
                    .filter(|&row| mask[row] && !col[row].is_null())
                    .count();
                let rate = covered as f64 / population as f64;
                out.diag(format!("{column}_coverage_rate"), rate);
                if fail_below.map(|t| rate < t).unwrap_or(false) {
                    out.push(
                        Severity::Error,
                        code,
                        format!(
                            "{column} coverage fell below minimum {:.2}: {rate:.4}",
                            fail_below.unwrap_or_default()
                        ),
                    );
                } else if warn_below.map(|t| rate < t).unwrap_or(false) {
                    out.push(
                        Severity::Warning,
                        code,
                        format!(
                            "{column} coverage fell below soft floor {:.2}: {rate:.4}",
                            warn_below.unwrap_or_default()
                        ),
                    );
                }
            }
        }
        Rule::MeanThreshold {
            column,
            warn_at,
            fail_at,
            warn_code,
            fail_code,
        } => {
            let values: Vec<f64> = cells(table, column).iter().filter_map(number).collect();
            if !values.is_empty() {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                out.diag(format!("{column}_mean"), mean);
                if let Some(t) = fail_at.filter(|t| mean >= *t) {
                    out.push(
                        Severity::Error,
                        fail_code,
                        format!("Mean {column} exceeded fail threshold {t:.2}: {mean:.4}"),
                    );
                }
                if let Some(t) = warn_at.filter(|t| mean >= *t) {
                    out.push(
                        Severity::Warning,
                        warn_code,
                        format!("Mean {column} exceeded warning threshold {t:.2}: {mean:.4}"),
                    );
                }
            }
        }
        Rule::MedianBand {
            column,
            filter,
            min,
            max,
            code,
        } => {
            let mask = mask_or_all(table, filter);
            let mut values: Vec<f64> = cells(table, column)
                .iter()
                .enumerate()
                .filter(|(row, _)| mask[*row])
                .filter_map(|(_, c)| number(c))
                .collect();
            out.diag(format!("{column}_median_n"), values.len() as f64);
            if let Some(m) = median(&mut values) {
                out.diag(format!("{column}_median"), m);
                if m < *min || m > *max {
                    out.push(
                        severity,
                        code,
                        format!(
                            "{column} median outside [{min:.1}, {max:.1}] with median={m:.1} (n={}).",
                            values.len()
                        ),
                    );
                }
            }
        }
        Rule::Provenance {
            when,
            requires,
            presence_code,
            unit,
            unit_code,
        } => {
            let mask = filter_mask(table, when);
            let mut absent = 0usize;
            let mut wrong_unit = 0usize;
            for row in (0..table.row_count()).filter(|&r| mask[r]) {
                let missing_companion = requires.iter().any(|c| cells(table, c)[row].is_blank());
                let mut missing_unit = false;
                if let Some(u) = unit {
                    let cell = &cells(table, &u.column)[row];
                    if cell.is_blank() {
                        missing_unit = true;
                    } else if !cell.matches_text(&u.canonical) {
                        wrong_unit += 1;
                    }
                }
                if missing_companion || missing_unit {
                    absent += 1;
                }
            }
            out.diag(format!("{presence_code}_rows"), absent as f64);
            if absent > 0 {
                out.push(
                    severity,
                    presence_code,
                    format!(
                        "{absent} rows selected by {} lack required companion values.",
                        when.column
                    ),
                );
            }
            if let Some(u) = unit {
                let code = unit_code.as_deref().unwrap_or(presence_code);
                out.diag(format!("{code}_rows"), wrong_unit as f64);
                if wrong_unit > 0 {
                    out.push(
                        severity,
                        code,
                        format!(
                            "{} differs from canonical unit `{}` in {wrong_unit} rows.",
                            u.column, u.canonical
                        ),
                    );
                }
            }
        }
        Rule::RequiredColumns {
            columns,
            when_present,
            code,
        } => {
            let applies = when_present
                .as_ref()
                .map(|c| table.has_column(c))
                .unwrap_or(true);
            if applies {
                let missing = table.missing_columns(columns);
                if !missing.is_empty() {
                    let message = match when_present {
                        Some(trigger) => format!(
                            "Column '{trigger}' is present but required companion columns are missing: {missing:?}"
                        ),
                        None => format!("Missing required columns: {missing:?}"),
                    };
                    out.push(severity, code, message);
                }
            }
        }
        Rule::CompanionFile {
            dir,
            pattern,
            format,
            missing_code,
            parse_code,
        } => {
            let dir_path = ctx.work_dir.join(dir);
            match storage::newest_match(&dir_path, pattern) {
                None => out.push(
                    severity,
                    missing_code,
                    format!("No file matching `{pattern}` in {}.", dir_path.display()),
                ),
                Some(path) => {
                    let parsed = match format {
                        FileFormat::Json => storage::read_json(&path).map(|_| ()),
                        FileFormat::Csv => Table::load_csv(&path)
                            .map(|_| ())
                            .map_err(anyhow::Error::from),
                    };
                    if let Err(e) = parsed {
                        out.push(
                            severity,
                            parse_code,
                            format!("{} could not be parsed: {e}", path.display()),
                        );
                    }
                }
            }
        }
        Rule::JsonArrayCells { column, code } => {
            let malformed = cells(table, column)
                .iter()
                .filter(|cell| match cell {
                    Cell::Null => false,
                    Cell::Text(s) => !matches!(
                        serde_json::from_str::<serde_json::Value>(s),
                        Ok(serde_json::Value::Array(_))
                    ),
                    _ => true,
                })
                .count();
            out.diag(format!("{column}_malformed_rows"), malformed as f64);
            if malformed > 0 {
                out.push(
                    severity,
                    code,
                    format!("Found {malformed} malformed {column} rows."),
                );
            }
        }
        Rule::RequireAnyValue {
            column,
            values,
            code,
        } => {
            let col = cells(table, column);
            let mut total = 0usize;
            for value in values {
                let n = col.iter().filter(|c| c.matches_text(value)).count();
                out.diag(format!("{column}_count_{value}"), n as f64);
                total += n;
            }
            if total == 0 {
                out.push(
                    severity,
                    code,
                    format!("{column} has no rows with any of {values:?}."),
                );
            }
        }
        Rule::FlagAgreement {
            derived,
            authoritative,
            tolerance,
            code,
        } => {
            let derived_col = cells(table, derived);
            let auth_col = cells(table, authoritative);
            let mut valid = 0usize;
            let mut disagree = 0usize;
            for (d, a) in derived_col.iter().zip(auth_col) {
                let Some(a) = a.as_f64().filter(|v| !v.is_nan()) else {
                    continue;
                };
                valid += 1;
                if d.truthy() != (a > 0.0) {
                    disagree += 1;
                }
            }
            if valid > 0 {
                let rate = disagree as f64 / valid as f64;
                out.diag(format!("{derived}_disagreement_rate"), rate);
                if rate > *tolerance {
                    out.push(
                        severity,
                        code,
                        format!(
                            "{derived} disagrees with {authoritative} in {disagree} rows ({:.4}%), tolerance={:.4}%.",
                            rate * 100.0,
                            tolerance * 100.0
                        ),
                    );
                }
            }
        }
        Rule::ZeroPositives {
            column,
            code,
            escalate_column,
            escalate_code,
        } => {
            let positives = cells(table, column).iter().filter(|c| c.truthy()).count();
            out.diag(format!("{column}_positives"), positives as f64);
            if positives == 0 {
                let authoritative = escalate_column
                    .as_ref()
                    .and_then(|c| table.column(c))
                    .map(|col| {
                        col.iter()
                            .filter(|c| c.as_f64().map(|v| v > 0.0).unwrap_or(false))
                            .count()
                    })
                    .unwrap_or(0);
                match escalate_code {
                    Some(escalated) if authoritative > 0 => out.push(
                        Severity::Error,
                        escalated,
                        format!(
                            "{column} has zero positives despite {authoritative} authoritative positives."
                        ),
                    ),
                    _ => out.push(severity, code, format!("{column} has zero positives.")),
                }
            }
        }
        Rule::Tally { column, diagnostic } => {
            let n = cells(table, column).iter().filter(|c| c.truthy()).count();
            out.diag(diagnostic.clone(), n as f64);
        }
    }
    out
}

fn bound(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-inf/inf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{
        default_classifier_rules, default_cohort_rules, UnitBand, UnitPairing,
    };
    use tempfile::TempDir;

    fn table(csv: &str) -> Table {
        Table::from_csv_str(csv).unwrap()
    }

    fn run(rule: Rule, t: &Table) -> RuleOutcome {
        let tmp = std::env::temp_dir();
        evaluate(&RuleSpec::error(rule), t, &RuleContext { work_dir: &tmp })
    }

    #[test]
    fn union_flag_reports_exact_mismatch_count_once() {
        let t = table(
            "abg,vbg,other,any\n1,0,0,1\n0,0,0,1\n0,1,0,0\n0,0,1,1\n0,0,0,0\n1,1,0,0\n",
        );
        let out = run(
            Rule::UnionFlag {
                target: "any".to_string(),
                components: vec!["abg".into(), "vbg".into(), "other".into()],
                code: "any_mismatch".to_string(),
            },
            &t,
        );
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].code, "any_mismatch");
        assert!(out.findings[0].message.contains("in 3 rows"));
        assert_eq!(out.diagnostics["any_mismatch_rows"], 3.0);
    }

    #[test]
    fn union_flag_clean_table_has_no_findings() {
        let t = table("a,b,u\n1,0,1\n0,0,0\n,1,1\n");
        let out = run(
            Rule::UnionFlag {
                target: "u".to_string(),
                components: vec!["a".into(), "b".into()],
                code: "u_mismatch".to_string(),
            },
            &t,
        );
        assert!(out.findings.is_empty());
    }

    #[test]
    fn unique_counts_repeat_rows() {
        let t = table("hadm_id\n1\n1\n2\n2\n2\n3\n");
        let out = run(
            Rule::Unique {
                columns: vec!["hadm_id".into()],
                code: "hadm_id_not_unique".into(),
            },
            &t,
        );
        assert_eq!(out.findings.len(), 1);
        assert!(out.findings[0].message.starts_with("Found 3 duplicate"));
    }

    #[test]
    fn numeric_range_flags_unit_confusion_separately() {
        let t = table("temp\n98.6\n37.0\n130\n\nabc\n");
        let out = run(
            Rule::NumericRange {
                column: "temp".into(),
                min: Some(50.0),
                max: Some(120.0),
                code: "out_of_range".into(),
                unit_confusion: Some(UnitBand {
                    min: 20.0,
                    max: 50.0,
                    code: "celsius_band".into(),
                }),
            },
            &t,
        );
        let codes: Vec<&str> = out.findings.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["out_of_range", "celsius_band"]);
        assert_eq!(out.diagnostics["temp_out_of_range_rows"], 2.0);
        assert_eq!(out.diagnostics["temp_unit_band_rows"], 1.0);
    }

    #[test]
    fn coverage_has_independent_warn_and_fail_floors() {
        let spec = |warn, fail| Rule::Coverage {
            column: "bmi".into(),
            filter: None,
            warn_below: warn,
            fail_below: fail,
            code: "bmi_coverage".into(),
        };
        let t = table("id,bmi\n1,20\n2,\n3,\n4,25\n");
        let fail = run(spec(Some(0.8), Some(0.6)), &t);
        assert_eq!(fail.findings[0].severity, Severity::Error);
        let warn = run(spec(Some(0.8), Some(0.3)), &t);
        assert_eq!(warn.findings[0].severity, Severity::Warning);
        let ok = run(spec(Some(0.4), Some(0.3)), &t);
        assert!(ok.findings.is_empty());
        assert_eq!(ok.diagnostics["bmi_coverage_rate"], 0.5);
    }

    #[test]
    fn provenance_reports_presence_and_unit_distinctly() {
        let t = table("paco2,paco2_uom\n50,mmHg\n55,\n60,kPa\n,\n45, MMHG \n");
        let out = run(
            Rule::Provenance {
                when: RowFilter {
                    column: "paco2".into(),
                    equals: Vec::new(),
                    negate: false,
                },
                requires: Vec::new(),
                presence_code: "uom_missing".into(),
                unit: Some(UnitPairing {
                    column: "paco2_uom".into(),
                    canonical: "mmHg".into(),
                }),
                unit_code: Some("uom_not_canonical".into()),
            },
            &t,
        );
        let codes: Vec<&str> = out.findings.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["uom_missing", "uom_not_canonical"]);
        assert_eq!(out.diagnostics["uom_missing_rows"], 1.0);
        assert_eq!(out.diagnostics["uom_not_canonical_rows"], 1.0);
    }

    #[test]
    fn negated_provenance_exempts_matching_rows() {
        let t = table("RFV1_name,cc_missing_reason\nDyspnea,\n,true_missing\n,pseudo_missing\n");
        let rule = default_classifier_rules()
            .into_iter()
            .find(|r| rule_code(&r.rule) == "unexpected_blank_rfv1")
            .unwrap();
        let tmp = TempDir::new().unwrap();
        let out = evaluate(&rule, &t, &RuleContext { work_dir: tmp.path() });
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.diagnostics["unexpected_blank_rfv1_rows"], 1.0);
    }

    #[test]
    fn zero_positives_escalates_with_authoritative_evidence() {
        let rule = |esc: bool| Rule::ZeroPositives {
            column: "abg".into(),
            code: "abg_all_zero".into(),
            escalate_column: esc.then(|| "flag".to_string()),
            escalate_code: Some("abg_all_zero_with_authoritative_positive".into()),
        };
        let t = table("abg,flag\n0,1\n0,0\n");
        assert_eq!(
            run(rule(true), &t).findings[0].code,
            "abg_all_zero_with_authoritative_positive"
        );
        assert_eq!(run(rule(false), &t).findings[0].code, "abg_all_zero");
    }

    #[test]
    fn flag_agreement_respects_tolerance() {
        let t = table("derived,auth\n1,1\n0,1\n0,\n1,0\n");
        let rule = |tolerance| Rule::FlagAgreement {
            derived: "derived".into(),
            authoritative: "auth".into(),
            tolerance,
            code: "disagree".into(),
        };
        let strict = run(rule(0.0), &t);
        assert_eq!(strict.findings.len(), 1);
        assert!((strict.diagnostics["derived_disagreement_rate"] - 2.0 / 3.0).abs() < 1e-12);
        assert!(run(rule(0.7), &t).findings.is_empty());
    }

    #[test]
    fn json_array_cells_reject_non_arrays() {
        let t = table("segment_preds\n\"[]\"\n\"[{\"\"a\"\":1}]\"\n\"{}\"\nnot json\n\n");
        let out = run(
            Rule::JsonArrayCells {
                column: "segment_preds".into(),
                code: "malformed".into(),
            },
            &t,
        );
        assert_eq!(out.diagnostics["segment_preds_malformed_rows"], 2.0);
    }

    #[test]
    fn companion_file_missing_and_unreadable_are_distinct() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("audits");
        std::fs::create_dir_all(&dir).unwrap();
        let rule = RuleSpec::error(Rule::CompanionFile {
            dir: "audits".into(),
            pattern: "* audit.json".into(),
            format: FileFormat::Json,
            missing_code: "audit_missing".into(),
            parse_code: "audit_unreadable".into(),
        });
        let t = Table::default();
        let ctx = RuleContext { work_dir: tmp.path() };
        assert_eq!(evaluate(&rule, &t, &ctx).findings[0].code, "audit_missing");

        std::fs::write(dir.join("2024 audit.json"), "{not json").unwrap();
        assert_eq!(evaluate(&rule, &t, &ctx).findings[0].code, "audit_unreadable");

        std::fs::write(dir.join("2024 audit.json"), "{}").unwrap();
        assert!(evaluate(&rule, &t, &ctx).findings.is_empty());
    }

    #[test]
    fn default_rule_tables_declare_their_columns() {
        for spec in default_cohort_rules().iter().chain(default_classifier_rules().iter()) {
            if let Rule::RequiredColumns { .. } | Rule::CompanionFile { .. } = spec.rule {
                continue;
            }
            assert!(!required_columns(&spec.rule).is_empty(), "{}", rule_code(&spec.rule));
        }
    }
}

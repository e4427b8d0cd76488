use crate::domain::models::{
    Category, CompareMode, DriftLevel, DriftRule, Finding, MetricDrift, Severity,
};
use std::collections::BTreeMap;

/// Classifies every metric present in both maps and in the rule table.
/// Output is ordered by metric name.
pub fn classify_drift(
    current: &BTreeMap<String, f64>,
    baseline: &BTreeMap<String, f64>,
    rules: &BTreeMap<String, DriftRule>,
) -> Vec<MetricDrift> {
    rules
        .iter()
        .filter_map(|(metric, rule)| {
            let cur = *current.get(metric)?;
            let base = *baseline.get(metric)?;
            Some(classify_metric(metric, cur, base, rule))
        })
        .collect()
}

pub fn classify_metric(metric: &str, current: f64, baseline: f64, rule: &DriftRule) -> MetricDrift {
    let delta = current - baseline;
    let abs_delta = delta.abs();
    let relative_delta = (baseline != 0.0).then(|| abs_delta / baseline.abs());

    let severity = if rule.lower_is_better && delta < 0.0 {
        DriftLevel::OkImproved
    } else {
        let comparator = match rule.compare {
            CompareMode::Relative => relative_delta,
            CompareMode::Absolute => Some(abs_delta),
        };
        match comparator {
            // Relative drift against a zero baseline is undefined.
            None => DriftLevel::Warning,
            Some(v) if v > rule.fail => DriftLevel::Fail,
            Some(v) if v > rule.warn => DriftLevel::Warning,
            Some(_) => DriftLevel::Ok,
        }
    };

    MetricDrift {
        metric: metric.to_string(),
        current_value: current,
        baseline_value: baseline,
        delta,
        abs_delta,
        relative_delta,
        compare_mode: rule.compare,
        warn_threshold: rule.warn,
        fail_threshold: rule.fail,
        severity,
    }
}

/// `fail` drift is an error, `warning` drift a warning; the rest is silent.
pub fn drift_findings(drift: &[MetricDrift]) -> Vec<Finding> {
    drift
        .iter()
        .filter_map(|d| {
            let (severity, code) = match d.severity {
                DriftLevel::Fail => (Severity::Error, "metric_drift_fail"),
                DriftLevel::Warning => (Severity::Warning, "metric_drift_warning"),
                DriftLevel::Ok | DriftLevel::OkImproved => return None,
            };
            Some(Finding::new(
                severity,
                Category::Drift,
                code,
                format!(
                    "{} drifted from {} to {} (delta {:+.6}).",
                    d.metric, d.baseline_value, d.current_value, d.delta
                ),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(compare: CompareMode, lower_is_better: bool) -> DriftRule {
        DriftRule {
            compare,
            warn: 0.05,
            fail: 0.10,
            lower_is_better,
        }
    }

    #[test]
    fn relative_thresholds() {
        let r = rule(CompareMode::Relative, false);
        assert_eq!(classify_metric("rows", 103.0, 100.0, &r).severity, DriftLevel::Ok);
        assert_eq!(classify_metric("rows", 93.0, 100.0, &r).severity, DriftLevel::Warning);
        assert_eq!(classify_metric("rows", 120.0, 100.0, &r).severity, DriftLevel::Fail);
    }

    #[test]
    fn zero_baseline_relative_is_warning_without_relative_delta() {
        let d = classify_metric("rows", 5.0, 0.0, &rule(CompareMode::Relative, false));
        assert_eq!(d.relative_delta, None);
        assert_eq!(d.severity, DriftLevel::Warning);

        let abs = classify_metric("rate", 0.01, 0.0, &rule(CompareMode::Absolute, false));
        assert_eq!(abs.severity, DriftLevel::Ok);
    }

    #[test]
    fn improvement_never_drifts() {
        let d = classify_metric("other_rate", 0.1, 0.9, &rule(CompareMode::Absolute, true));
        assert_eq!(d.severity, DriftLevel::OkImproved);
        let worse = classify_metric("other_rate", 0.9, 0.1, &rule(CompareMode::Absolute, true));
        assert_eq!(worse.severity, DriftLevel::Fail);
    }

    #[test]
    fn only_shared_ruled_metrics_are_classified_in_name_order() {
        let rules = BTreeMap::from([
            ("b".to_string(), rule(CompareMode::Absolute, false)),
            ("a".to_string(), rule(CompareMode::Absolute, false)),
            ("c".to_string(), rule(CompareMode::Absolute, false)),
        ]);
        let current = BTreeMap::from([
            ("a".to_string(), 1.0),
            ("b".to_string(), 0.5),
            ("x".to_string(), 1.0),
        ]);
        let baseline = BTreeMap::from([
            ("a".to_string(), 0.5),
            ("b".to_string(), 0.5),
            ("c".to_string(), 1.0),
        ]);
        let drift = classify_drift(&current, &baseline, &rules);
        let names: Vec<&str> = drift.iter().map(|d| d.metric.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let findings = drift_findings(&drift);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, "metric_drift_fail");
        assert_eq!(findings[0].severity, Severity::Error);
    }
}

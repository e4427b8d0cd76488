use crate::domain::config::LogScanConfig;
use crate::domain::errors::GuardError;
use crate::domain::models::{Category, Finding, LogHit, Severity, StageResult};
use regex::{Regex, RegexBuilder};
use std::path::Path;
use tracing::debug;

struct CompiledPattern {
    severity: Severity,
    code: String,
    regex: Regex,
}

/// Case-insensitive line classifier over stage logs.
pub struct LogScanner {
    patterns: Vec<CompiledPattern>,
    allowlist: Vec<Regex>,
}

fn compile(pattern: &str) -> Result<Regex, GuardError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| GuardError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

impl LogScanner {
    pub fn new(cfg: &LogScanConfig) -> Result<Self, GuardError> {
        let patterns = cfg
            .patterns
            .iter()
            .map(|p| {
                Ok(CompiledPattern {
                    severity: p.severity,
                    code: p.code.clone(),
                    regex: compile(&p.pattern)?,
                })
            })
            .collect::<Result<Vec<_>, GuardError>>()?;
        let allowlist = cfg
            .allowlist
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            allowlist,
        })
    }

    /// At most one finding per line: allow-listed lines are skipped, then
    /// the first matching pattern wins.
    pub fn classify(&self, line: &str) -> Option<Finding> {
        if self.allowlist.iter().any(|r| r.is_match(line)) {
            return None;
        }
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(line))
            .map(|p| Finding::new(p.severity, Category::Log, p.code.as_str(), line.trim()))
    }

    pub fn scan_file(&self, stage_id: &str, path: &Path) -> Vec<LogHit> {
        let Ok(raw) = std::fs::read(path) else {
            return Vec::new();
        };
        let text = String::from_utf8_lossy(&raw);
        text.lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                self.classify(line).map(|finding| LogHit {
                    stage_id: stage_id.to_string(),
                    log_path: path.to_string_lossy().to_string(),
                    line_number: idx + 1,
                    finding,
                })
            })
            .collect()
    }

    /// Stages without a log on disk (skipped, spawn failures) contribute nothing.
    pub fn scan(&self, stages: &[StageResult]) -> Vec<LogHit> {
        let hits: Vec<LogHit> = stages
            .iter()
            .flat_map(|s| self.scan_file(&s.stage_id, Path::new(&s.log_path)))
            .collect();
        debug!(hits = hits.len(), "log scan complete");
        hits
    }
}

use crate::domain::config::PreflightConfig;
use crate::domain::models::{Category, Finding, GitInfo, RunManifest, Severity};
use crate::services::clock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

fn preflight(severity: Severity, code: &str, message: impl Into<String>) -> Finding {
    Finding::new(severity, Category::Preflight, code, message)
}

/// Best-effort environment diagnostics. Nothing here aborts a run.
pub fn run_preflight_checks(work_dir: &Path, cfg: &PreflightConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    let env_path = work_dir.join(&cfg.dotenv);
    match std::fs::read_to_string(&env_path) {
        Err(_) => findings.push(preflight(
            Severity::Error,
            "missing_dotenv_file",
            format!("Missing {} file in work dir.", cfg.dotenv),
        )),
        Ok(raw) => {
            let values = parse_dotenv(&raw);
            let present = |key: &str| values.get(key).map(|v| !v.is_empty()).unwrap_or(false);
            let mut missing: Vec<&str> = cfg
                .required_keys
                .iter()
                .map(String::as_str)
                .filter(|k| !present(*k))
                .collect();
            missing.sort();
            if !missing.is_empty() {
                findings.push(preflight(
                    Severity::Error,
                    "missing_required_env_keys",
                    format!("Missing required {} keys: {missing:?}", cfg.dotenv),
                ));
            }
            match values.get(&cfg.work_dir_key).filter(|v| !v.is_empty()) {
                None => findings.push(preflight(
                    Severity::Warning,
                    "missing_work_dir_env_key",
                    format!(
                        "Optional key {} is unset; the run manifest will rely on the process cwd.",
                        cfg.work_dir_key
                    ),
                )),
                Some(declared) => {
                    if !same_dir(&expand_home(declared), work_dir) {
                        findings.push(preflight(
                            Severity::Warning,
                            "work_dir_mismatch",
                            format!(
                                "{} does not match the current work dir.",
                                cfg.work_dir_key
                            ),
                        ));
                    }
                }
            }
        }
    }

    if let Some(finding) = credential_check(
        work_dir,
        &cfg.credential_command,
        Duration::from_secs(cfg.credential_timeout_secs),
    ) {
        findings.push(finding);
    }

    for resource in &cfg.resources {
        if !work_dir.join(resource).exists() {
            findings.push(preflight(
                Severity::Error,
                "missing_resource",
                format!("Required resource file is missing: {resource}"),
            ));
        }
    }

    debug!(count = findings.len(), "preflight complete");
    findings
}

fn credential_check(work_dir: &Path, command: &[String], timeout: Duration) -> Option<Finding> {
    let (program, args) = command.split_first()?;
    let unavailable = || {
        preflight(
            Severity::Error,
            "credential_check_unavailable",
            format!("`{program}` is unavailable or the credential check timed out."),
        )
    };
    let mut child = match Command::new(program)
        .args(args)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(_) => return Some(unavailable()),
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return None,
            Ok(Some(_)) => {
                return Some(preflight(
                    Severity::Error,
                    "credential_unavailable",
                    format!("Credential check `{}` failed.", command.join(" ")),
                ))
            }
            Ok(None) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(50)),
            Ok(None) | Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                return Some(unavailable());
            }
        }
    }
}

/// `KEY=VALUE` lines; `export`, comments and surrounding quotes tolerated.
pub fn parse_dotenv(raw: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        out.insert(key.trim().to_string(), value.to_string());
    }
    out
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => PathBuf::from(home).join(rest),
            Err(_) => PathBuf::from(raw),
        },
        None => PathBuf::from(raw),
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    let a = a.canonicalize().unwrap_or_else(|_| a.to_path_buf());
    let b = b.canonicalize().unwrap_or_else(|_| b.to_path_buf());
    a == b
}

/// Hides values for names that look like secrets.
pub fn safe_env_value(name: &str, value: Option<&str>) -> String {
    match value {
        None | Some("") => "<unset>".to_string(),
        Some(_)
            if ["TOKEN", "KEY", "SECRET", "PASSWORD"]
                .iter()
                .any(|t| name.to_ascii_uppercase().contains(t)) =>
        {
            "<set>".to_string()
        }
        Some(v) => v.to_string(),
    }
}

fn text_command(program: &str, args: &[&str], cwd: &Path) -> String {
    Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_default()
}

pub fn collect_run_manifest(work_dir: &Path, run_id: &str, cfg: &PreflightConfig) -> RunManifest {
    let git = GitInfo {
        branch: text_command("git", &["rev-parse", "--abbrev-ref", "HEAD"], work_dir),
        commit: text_command("git", &["rev-parse", "HEAD"], work_dir),
        dirty: !text_command("git", &["status", "--porcelain"], work_dir).is_empty(),
    };
    let tool_versions = cfg
        .tool_versions
        .iter()
        .map(|(name, command)| {
            let version = match command.split_first() {
                Some((program, args)) => {
                    let args: Vec<&str> = args.iter().map(String::as_str).collect();
                    text_command(program, &args, work_dir)
                }
                None => String::new(),
            };
            let version = if version.is_empty() {
                "<missing>".to_string()
            } else {
                version
            };
            (name.clone(), version)
        })
        .collect();
    let env_knobs = cfg
        .env_knobs
        .iter()
        .map(|k| {
            let value = std::env::var(k).ok();
            (k.clone(), safe_env_value(k, value.as_deref()))
        })
        .collect();
    let generated = clock::now_unix_ms();
    RunManifest {
        run_id: run_id.to_string(),
        generated_unix_ms: generated,
        generated_utc: clock::iso_utc(generated),
        work_dir: work_dir.to_string_lossy().to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        git,
        tool_versions,
        env_knobs,
    }
}

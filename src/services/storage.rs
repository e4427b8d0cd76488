use crate::domain::config::GuardConfig;
use crate::domain::constants::{CONFIG_FILENAME, EVENT_LOG_RELPATH};
use crate::services::clock;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Appends one JSONL event under the work dir. Never fails the caller.
pub fn audit(work_dir: &Path, action: &str, data: serde_json::Value) {
    let path = work_dir.join(EVENT_LOG_RELPATH);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let ms = clock::now_unix_ms();
    let event = serde_json::json!({
        "ts": clock::iso_utc(ms),
        "ts_unix_ms": ms,
        "action": action,
        "data": data
    });
    let line = format!("{}\n", event);
    let _ = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| std::io::Write::write_all(&mut f, line.as_bytes()));
}

pub fn load_config(work_dir: &Path, explicit: Option<&Path>) -> anyhow::Result<GuardConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => work_dir.join(CONFIG_FILENAME),
    };
    if !path.exists() {
        if explicit.is_some() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        return Ok(GuardConfig::default());
    }
    let raw = std::fs::read_to_string(&path)?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))
}

pub fn resolve_work_dir(raw: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = match raw {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir()?,
    };
    Ok(dir.canonicalize().unwrap_or(dir))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

pub fn write_text(path: &Path, body: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, body)?;
    Ok(())
}

pub fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Copies preserving the source mtime so freshness stays meaningful.
pub fn copy_file(src: &Path, dst: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dst)?;
    if let Ok(modified) = std::fs::metadata(src).and_then(|m| m.modified()) {
        if let Ok(f) = std::fs::File::options().write(true).open(dst) {
            let _ = f.set_modified(modified);
        }
    }
    Ok(())
}

pub fn mtime_ms(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(clock::system_time_ms)
}

/// Newest file in `dir` whose name matches `pattern` (`*` wildcards only).
pub fn newest_match(dir: &Path, pattern: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| wildcard_match(pattern, &e.file_name().to_string_lossy()))
        .map(|e| {
            let path = e.path();
            (mtime_ms(&path).unwrap_or(0), path)
        })
        .max()
        .map(|(_, path)| path)
}

pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }
    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !name.starts_with(first)
        || !name.ends_with(last)
        || name.len() < first.len() + last.len()
    {
        return false;
    }
    let mut rest = &name[first.len()..name.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

use crate::domain::config::StageSpec;
use crate::domain::models::{PipelineRun, StageResult, StageStatus};
use crate::services::clock;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Line fan-out to a log file and a console stream.
pub struct Tee<F: Write, C: Write> {
    file: F,
    console: C,
    lines: usize,
}

impl<F: Write, C: Write> Tee<F, C> {
    pub fn new(file: F, console: C) -> Self {
        Self {
            file,
            console,
            lines: 0,
        }
    }

    pub fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line)?;
        // A broken console must not lose the log.
        let _ = self.console.write_all(line);
        if !line.ends_with(b"\n") {
            self.file.write_all(b"\n")?;
            let _ = self.console.write_all(b"\n");
        }
        self.lines += 1;
        Ok(())
    }

    pub fn finish(mut self) -> std::io::Result<usize> {
        self.file.flush()?;
        let _ = self.console.flush();
        Ok(self.lines)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    Stdout,
    Stderr,
    Quiet,
}

impl Echo {
    fn sink(self) -> Box<dyn Write> {
        match self {
            Echo::Stdout => Box::new(std::io::stdout()),
            Echo::Stderr => Box::new(std::io::stderr()),
            Echo::Quiet => Box::new(std::io::sink()),
        }
    }
}

pub struct StageRunner<'a> {
    pub work_dir: &'a Path,
    pub logs_dir: PathBuf,
    pub env: &'a BTreeMap<String, String>,
    pub echo: Echo,
}

impl StageRunner<'_> {
    pub fn log_path(&self, stage_id: &str) -> PathBuf {
        self.logs_dir.join(format!("{stage_id}.log"))
    }

    /// Runs stages in order, stopping at the first failure. Stages after a
    /// failure are still recorded as `skipped` with their log path.
    pub fn run_pipeline(
        &self,
        stages: &[StageSpec],
        consistency: Option<&StageSpec>,
    ) -> anyhow::Result<PipelineRun> {
        std::fs::create_dir_all(&self.logs_dir)?;
        let started = clock::now_unix_ms();
        let mut results = Vec::with_capacity(stages.len() + 1);
        let mut failed = false;

        for stage in stages {
            if failed {
                results.push(self.skipped(stage));
                continue;
            }
            let result = self.run_stage(stage)?;
            failed = result.status == StageStatus::Failed;
            results.push(result);
        }

        if let Some(stage) = consistency {
            if failed {
                results.push(self.skipped(stage));
            } else {
                let result = self.run_stage(stage)?;
                failed = result.status == StageStatus::Failed;
                results.push(result);
            }
        }

        let ended = clock::now_unix_ms();
        Ok(PipelineRun {
            started_unix_ms: started,
            ended_unix_ms: ended,
            duration_s: clock::elapsed_secs(started, ended),
            success: !failed,
            stages: results,
        })
    }

    fn skipped(&self, stage: &StageSpec) -> StageResult {
        StageResult {
            stage_id: stage.id.clone(),
            command: stage.command.clone(),
            status: StageStatus::Skipped,
            returncode: None,
            started_unix_ms: None,
            ended_unix_ms: None,
            duration_s: None,
            line_count: 0,
            log_path: self.log_path(&stage.id).to_string_lossy().to_string(),
            spawn_error: None,
        }
    }

    pub fn run_stage(&self, stage: &StageSpec) -> anyhow::Result<StageResult> {
        let log_path = self.log_path(&stage.id);
        let file = std::io::BufWriter::new(std::fs::File::create(&log_path)?);
        let mut tee = Tee::new(file, self.echo.sink());
        let started = clock::now_unix_ms();
        info!(stage_id = %stage.id, command = %stage.command, "stage started");

        let spawned = Command::new("sh")
            .arg("-c")
            .arg(format!("exec 2>&1\n{}", stage.command))
            .current_dir(self.work_dir)
            .envs(self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let _ = tee.finish();
                let ended = clock::now_unix_ms();
                warn!(stage_id = %stage.id, error = %e, "stage failed to spawn");
                return Ok(StageResult {
                    stage_id: stage.id.clone(),
                    command: stage.command.clone(),
                    status: StageStatus::Failed,
                    returncode: None,
                    started_unix_ms: Some(started),
                    ended_unix_ms: Some(ended),
                    duration_s: Some(clock::elapsed_secs(started, ended)),
                    line_count: 0,
                    log_path: log_path.to_string_lossy().to_string(),
                    spawn_error: Some(e.to_string()),
                });
            }
        };

        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf)? == 0 {
                    break;
                }
                tee.write_line(&buf)?;
            }
        }
        let status = child.wait()?;
        let line_count = tee.finish()?;
        let ended = clock::now_unix_ms();
        // Killed by a signal reports no code; treat as failure.
        let returncode = status.code().unwrap_or(-1);
        let stage_status = if status.success() {
            StageStatus::Ok
        } else {
            StageStatus::Failed
        };
        info!(
            stage_id = %stage.id,
            status = ?stage_status,
            returncode,
            line_count,
            "stage finished"
        );

        Ok(StageResult {
            stage_id: stage.id.clone(),
            command: stage.command.clone(),
            status: stage_status,
            returncode: Some(returncode),
            started_unix_ms: Some(started),
            ended_unix_ms: Some(ended),
            duration_s: Some(clock::elapsed_secs(started, ended)),
            line_count,
            log_path: log_path.to_string_lossy().to_string(),
            spawn_error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runner<'a>(tmp: &'a TempDir, env: &'a BTreeMap<String, String>) -> StageRunner<'a> {
        StageRunner {
            work_dir: tmp.path(),
            logs_dir: tmp.path().join("logs"),
            env,
            echo: Echo::Quiet,
        }
    }

    #[test]
    fn tee_counts_lines_and_terminates_partial_line() {
        let mut file = Vec::new();
        let mut console = Vec::new();
        let mut tee = Tee::new(&mut file, &mut console);
        tee.write_line(b"one\n").unwrap();
        tee.write_line(b"two").unwrap();
        assert_eq!(tee.finish().unwrap(), 2);
        assert_eq!(file, b"one\ntwo\n");
        assert_eq!(console, file);
    }

    #[test]
    fn failure_stops_pipeline_and_records_skipped_stages() {
        let tmp = TempDir::new().unwrap();
        let env = BTreeMap::from([("GREETING".to_string(), "hello".to_string())]);
        let stages = vec![
            StageSpec::new("01_ok", "echo \"$GREETING\"; echo oops >&2"),
            StageSpec::new("02_bad", "exit 3"),
            StageSpec::new("03_never", "echo never"),
        ];
        let consistency = StageSpec::new("05_consistency", "echo again");
        let run = runner(&tmp, &env)
            .run_pipeline(&stages, Some(&consistency))
            .unwrap();

        assert!(!run.success);
        assert_eq!(run.stages.len(), 4);
        assert_eq!(run.stages[0].status, StageStatus::Ok);
        assert_eq!(run.stages[0].line_count, 2);
        assert_eq!(run.stages[1].returncode, Some(3));
        assert_eq!(run.stages[2].status, StageStatus::Skipped);
        assert_eq!(run.stages[2].returncode, None);
        assert!(run.stages[2].log_path.ends_with("03_never.log"));
        assert_eq!(run.stages[3].status, StageStatus::Skipped);

        let log = std::fs::read_to_string(&run.stages[0].log_path).unwrap();
        assert_eq!(log, "hello\noops\n");
    }

    #[test]
    fn consistency_stage_runs_after_clean_pipeline() {
        let tmp = TempDir::new().unwrap();
        let env = BTreeMap::new();
        let stages = vec![StageSpec::new("01_ok", "true")];
        let consistency = StageSpec::new("05_consistency", "echo rerun");
        let run = runner(&tmp, &env)
            .run_pipeline(&stages, Some(&consistency))
            .unwrap();
        assert!(run.success);
        assert_eq!(run.stages[1].stage_id, "05_consistency");
        assert_eq!(run.stages[1].line_count, 1);
    }
}

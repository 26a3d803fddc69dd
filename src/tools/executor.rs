use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::ScanError;
use crate::utils::truncation::stderr_excerpt;

/// An argument vector for one external tool invocation. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), stdin: None }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
    pub json: Option<serde_json::Value>,
}

impl ToolOutput {
    /// Non-empty trimmed stdout lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

enum Outcome {
    Finished(std::io::Result<std::process::Output>),
    TimedOut,
    Cancelled,
}

/// Spawns external tools and tracks every live process so a cancelled scan
/// can tear them all down.
pub struct ToolExecutor {
    bin_dir: Option<PathBuf>,
    search_path: bool,
    processes: DashMap<u64, CancellationToken>,
    next_id: AtomicU64,
}

impl ToolExecutor {
    pub fn new(bin_dir: Option<PathBuf>) -> Self {
        Self { bin_dir, search_path: true, processes: DashMap::new(), next_id: AtomicU64::new(1) }
    }

    /// Stop falling back to `PATH`; only `bin_dir` is searched.
    pub fn without_path_search(mut self) -> Self {
        self.search_path = false;
        self
    }

    /// Run with strict exit-code checking: non-zero exits become `ToolFailed`.
    pub async fn run(
        &self,
        command: &ToolCommand,
        timeout: Duration,
        parse_json: bool,
    ) -> Result<ToolOutput, ScanError> {
        self.execute(command, timeout, parse_json, true).await
    }

    /// Run without treating a non-zero exit as an error.
    pub async fn run_unchecked(
        &self,
        command: &ToolCommand,
        timeout: Duration,
        parse_json: bool,
    ) -> Result<ToolOutput, ScanError> {
        self.execute(command, timeout, parse_json, false).await
    }

    /// Terminate every registered process. Returns how many were signalled.
    pub fn cleanup(&self) -> usize {
        let ids: Vec<u64> = self.processes.iter().map(|entry| *entry.key()).collect();
        let mut terminated = 0;
        for id in ids {
            if let Some((_, token)) = self.processes.remove(&id) {
                token.cancel();
                terminated += 1;
            }
        }
        if terminated > 0 {
            warn!(count = terminated, "Terminated running tool processes");
        }
        terminated
    }

    pub fn active_count(&self) -> usize {
        self.processes.len()
    }

    /// Locate a binary: `bin_dir` first, then `PATH` unless disabled.
    pub fn locate(&self, program: &str) -> Option<PathBuf> {
        if let Some(dir) = &self.bin_dir {
            let candidate = dir.join(program);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
        if !self.search_path {
            return None;
        }
        which::which(program).ok()
    }

    fn resolve(&self, program: &str) -> PathBuf {
        self.bin_dir
            .as_ref()
            .map(|dir| dir.join(program))
            .filter(|candidate| is_executable(candidate))
            .unwrap_or_else(|| PathBuf::from(program))
    }

    async fn execute(
        &self,
        command: &ToolCommand,
        timeout: Duration,
        parse_json: bool,
        check: bool,
    ) -> Result<ToolOutput, ScanError> {
        debug!(command = %command, timeout_secs = timeout.as_secs_f64(), "Spawning tool");

        let mut cmd = Command::new(self.resolve(&command.program));
        cmd.args(&command.args)
            .stdin(if command.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ScanError::ToolNotFound(command.program.clone()),
            _ => ScanError::Io(e),
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.processes.insert(id, token.clone());
        let _registration = Registration { processes: &self.processes, id };

        if let (Some(input), Some(mut stdin)) = (command.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!(error = %e, "Failed to write tool stdin");
                }
            });
        }

        // Dropping the wait future drops the child, which kills it.
        let outcome = tokio::select! {
            result = child.wait_with_output() => Outcome::Finished(result),
            _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
            _ = token.cancelled() => Outcome::Cancelled,
        };
        let duration = started.elapsed();

        let output = match outcome {
            Outcome::Finished(result) => result?,
            Outcome::TimedOut => {
                warn!(tool = %command.program, timeout_secs = timeout.as_secs_f64(), "Tool timed out, killed");
                return Err(ScanError::ToolTimeout { tool: command.program.clone(), timeout });
            }
            Outcome::Cancelled => {
                debug!(tool = %command.program, "Tool cancelled");
                return Err(ScanError::Cancelled);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        debug!(
            tool = %command.program,
            exit_code,
            duration_ms = duration.as_millis() as u64,
            stdout_bytes = stdout.len(),
            "Tool finished"
        );

        if check && !output.status.success() {
            let message = if stderr.is_empty() { &stdout } else { &stderr };
            return Err(ScanError::ToolFailed {
                tool: command.program.clone(),
                exit_code,
                message: stderr_excerpt(message),
            });
        }

        let json = if parse_json && !stdout.is_empty() {
            match serde_json::from_str(&stdout) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(tool = %command.program, error = %e, "Tool output is not valid JSON");
                    None
                }
            }
        } else {
            None
        };

        Ok(ToolOutput { stdout, stderr, exit_code, duration, json })
    }
}

struct Registration<'a> {
    processes: &'a DashMap<u64, CancellationToken>,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.processes.remove(&self.id);
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

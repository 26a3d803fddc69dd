use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{error, info};

use super::executor::{ToolCommand, ToolExecutor, ToolOutput};
use super::registry::Tool;
use crate::config::ReconConfig;
use crate::errors::{BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, RetryPolicy, ScanError};

/// Executor wrapped in retry/backoff and one circuit breaker per tool.
pub struct ToolRunner {
    executor: Arc<ToolExecutor>,
    retry: RetryPolicy,
    strategy: BackoffStrategy,
    breaker_config: CircuitBreakerConfig,
    breakers: DashMap<Tool, Arc<CircuitBreaker>>,
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(
        executor: Arc<ToolExecutor>,
        retry: RetryPolicy,
        strategy: BackoffStrategy,
        breaker_config: CircuitBreakerConfig,
        timeout: Duration,
    ) -> Self {
        Self { executor, retry, strategy, breaker_config, breakers: DashMap::new(), timeout }
    }

    pub fn from_config(config: &ReconConfig) -> Self {
        let mut executor = ToolExecutor::new(config.tools.bin_dir.clone());
        if !config.tools.search_path {
            executor = executor.without_path_search();
        }
        Self::new(
            Arc::new(executor),
            config.retry_policy(),
            config.resilience.backoff_strategy,
            config.breaker_config(),
            config.tools.timeout(),
        )
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    pub fn breaker(&self, tool: Tool) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(tool)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(tool.binary(), self.breaker_config.clone())))
            .clone()
    }

    /// Strict run: non-zero exits fail and are retried.
    pub async fn run(&self, tool: Tool, command: &ToolCommand, parse_json: bool) -> Result<ToolOutput, ScanError> {
        self.run_inner(tool, command, parse_json, true).await
    }

    /// For tools whose non-zero exit is a normal answer (e.g. no matches).
    pub async fn run_lenient(
        &self,
        tool: Tool,
        command: &ToolCommand,
        parse_json: bool,
    ) -> Result<ToolOutput, ScanError> {
        self.run_inner(tool, command, parse_json, false).await
    }

    async fn run_inner(
        &self,
        tool: Tool,
        command: &ToolCommand,
        parse_json: bool,
        strict: bool,
    ) -> Result<ToolOutput, ScanError> {
        let breaker = self.breaker(tool);
        let executor = &self.executor;
        let timeout = self.timeout;
        breaker
            .call(self.retry.retry(tool.binary(), self.strategy, || async move {
                if strict {
                    executor.run(command, timeout, parse_json).await
                } else {
                    executor.run_unchecked(command, timeout, parse_json).await
                }
            }))
            .await
    }

    /// Where each tool resolves, `None` when missing.
    pub fn availability(&self, tools: &[Tool]) -> Vec<(Tool, Option<PathBuf>)> {
        tools.iter().map(|tool| (*tool, self.executor.locate(tool.binary()))).collect()
    }

    /// Fail with `ToolNotFound` naming every missing binary.
    pub fn preflight(&self, tools: &[Tool]) -> Result<(), ScanError> {
        let missing: Vec<&str> = self
            .availability(tools)
            .into_iter()
            .filter(|(_, path)| path.is_none())
            .map(|(tool, _)| tool.binary())
            .collect();

        if missing.is_empty() {
            info!(count = tools.len(), "All required tools found");
            Ok(())
        } else {
            error!(missing = ?missing, "Required tools not found");
            Err(ScanError::ToolNotFound(missing.join(", ")))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::errors::CircuitState;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn fake_tool(dir: &Path, name: &str, script: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn runner(dir: &Path, max_retries: u32, threshold: u32) -> ToolRunner {
        ToolRunner::new(
            Arc::new(ToolExecutor::new(Some(dir.to_path_buf())).without_path_search()),
            RetryPolicy {
                max_retries,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                jitter: false,
                ..RetryPolicy::default()
            },
            BackoffStrategy::Exponential,
            CircuitBreakerConfig { failure_threshold: threshold, reset_timeout: Duration::from_secs(60) },
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_preflight_reports_missing_tools() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), "subfinder", "exit 0");
        let r = runner(dir.path(), 0, 5);
        assert!(r.preflight(&[Tool::Subfinder]).is_ok());
        assert_eq!(
            r.availability(&[Tool::Subfinder]),
            vec![(Tool::Subfinder, Some(dir.path().join("subfinder")))]
        );

        let err = r.preflight(&[Tool::Subfinder, Tool::Chaos, Tool::Sublist3r]).unwrap_err();
        assert!(matches!(&err, ScanError::ToolNotFound(names) if names == "chaos, sublist3r"), "{:?}", err);
        assert!(err.classify().is_fatal());
    }

    #[test]
    fn test_path_fallback_finds_system_binaries() {
        let dir = tempfile::tempdir().unwrap();
        let with_path = ToolExecutor::new(Some(dir.path().to_path_buf()));
        assert!(with_path.locate("sh").is_some());
        assert!(with_path.without_path_search().locate("sh").is_none());
    }

    #[tokio::test]
    async fn test_retries_flaky_tool_until_success() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("count");
        fake_tool(
            dir.path(),
            "subfinder",
            &format!(
                "n=$(cat {c} 2>/dev/null || echo 0); n=$((n+1)); echo $n > {c}; \
                 if [ $n -lt 3 ]; then echo fail >&2; exit 1; fi; echo a.example.com",
                c = counter.display()
            ),
        );
        let r = runner(dir.path(), 3, 5);
        let out = r.run(Tool::Subfinder, &ToolCommand::new("subfinder"), false).await.unwrap();
        assert_eq!(out.stdout, "a.example.com");
        assert_eq!(std::fs::read_to_string(&counter).unwrap().trim(), "3");
        assert_eq!(r.breaker(Tool::Subfinder).failure_count(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_timeout_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), "amass", "sleep 5");
        let r = ToolRunner::new(
            Arc::new(ToolExecutor::new(Some(dir.path().to_path_buf()))),
            RetryPolicy {
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                jitter: false,
                ..RetryPolicy::default()
            },
            BackoffStrategy::Linear,
            CircuitBreakerConfig::default(),
            Duration::from_millis(100),
        );
        let err = r.run(Tool::Amass, &ToolCommand::new("amass"), false).await.unwrap_err();
        match err {
            ScanError::ToolTimeout { tool, timeout } => {
                assert_eq!(tool, "amass");
                assert_eq!(timeout, Duration::from_millis(100));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_breaker_opens_per_tool() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), "nuclei", "exit 2");
        fake_tool(dir.path(), "gf", "echo match");
        let r = runner(dir.path(), 0, 2);

        for _ in 0..2 {
            let _ = r.run(Tool::Nuclei, &ToolCommand::new("nuclei"), false).await;
        }
        assert_eq!(r.breaker(Tool::Nuclei).state(), CircuitState::Open);
        let err = r.run(Tool::Nuclei, &ToolCommand::new("nuclei"), false).await.unwrap_err();
        assert!(matches!(err, ScanError::CircuitOpen(_)));

        let ok = r.run(Tool::Gf, &ToolCommand::new("gf"), false).await.unwrap();
        assert_eq!(ok.stdout, "match");
    }

    #[tokio::test]
    async fn test_lenient_run_accepts_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), "gf", "exit 1");
        let r = runner(dir.path(), 2, 5);
        let out = r.run_lenient(Tool::Gf, &ToolCommand::new("gf"), false).await.unwrap();
        assert_eq!(out.exit_code, 1);
        assert!(out.stdout.is_empty());
    }
}

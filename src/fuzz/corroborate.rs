use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::ReconConfig;
use crate::errors::ScanError;
use crate::models::{SecondaryEvidence, TemplateScanReport};
use crate::tools::parsers::parse_nuclei_jsonl;
use crate::tools::registry::{gf_command, nuclei_command};
use crate::tools::{Tool, ToolRunner};

/// Secondary scanners consulted once a payload trial is flagged.
#[async_trait]
pub trait Corroborator: Send + Sync {
    /// Never fails: scanner errors leave the corresponding evidence empty.
    async fn corroborate(&self, url: &str) -> SecondaryEvidence;
}

/// nuclei driven through the tool runner.
pub struct TemplateScanner {
    runner: Arc<ToolRunner>,
    templates: Vec<String>,
    severities: Vec<String>,
    proxy: Option<String>,
}

impl TemplateScanner {
    pub fn new(runner: Arc<ToolRunner>, templates: Vec<String>, severities: Vec<String>, proxy: Option<String>) -> Self {
        Self { runner, templates, severities, proxy }
    }

    pub fn from_config(runner: Arc<ToolRunner>, config: &ReconConfig) -> Self {
        Self::new(
            runner,
            config.tools.nuclei_templates.clone(),
            config.tools.nuclei_severity.clone(),
            config.proxy.url.clone(),
        )
    }

    pub async fn scan(&self, target: &str) -> Result<TemplateScanReport, ScanError> {
        let command = nuclei_command(target, &self.templates, &self.severities, self.proxy.as_deref());
        let output = self.runner.run(Tool::Nuclei, &command, false).await?;
        let report = parse_nuclei_jsonl(&output.stdout);
        debug!(target, findings = report.total(), "Template scan finished");
        Ok(report)
    }
}

/// gf pattern matching plus a nuclei scan of the flagged URL.
pub struct ToolCorroborator {
    runner: Arc<ToolRunner>,
    gf_patterns: Vec<String>,
    scanner: TemplateScanner,
}

impl ToolCorroborator {
    pub fn new(runner: Arc<ToolRunner>, gf_patterns: Vec<String>, scanner: TemplateScanner) -> Self {
        Self { runner, gf_patterns, scanner }
    }

    pub fn from_config(runner: Arc<ToolRunner>, config: &ReconConfig) -> Self {
        let scanner = TemplateScanner::from_config(runner.clone(), config);
        Self::new(runner, config.tools.gf_patterns.clone(), scanner)
    }

    async fn gf_matches(&self, url: &str) -> BTreeMap<String, Vec<String>> {
        let mut matches = BTreeMap::new();
        for pattern in &self.gf_patterns {
            // gf exits non-zero when nothing matches.
            match self.runner.run_lenient(Tool::Gf, &gf_command(pattern, url), false).await {
                Ok(output) => {
                    let lines: Vec<String> = output.lines().map(str::to_string).collect();
                    if !lines.is_empty() {
                        matches.insert(pattern.clone(), lines);
                    }
                }
                Err(e) => warn!(pattern = %pattern, url, error = %e, "gf pattern failed"),
            }
        }
        matches
    }
}

#[async_trait]
impl Corroborator for ToolCorroborator {
    async fn corroborate(&self, url: &str) -> SecondaryEvidence {
        let (gf_matches, nuclei) = tokio::join!(self.gf_matches(url), self.scanner.scan(url));
        let nuclei = match nuclei {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(url, error = %e, "Template scan of flagged URL failed");
                None
            }
        };
        SecondaryEvidence { gf_matches, nuclei }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::errors::{BackoffStrategy, CircuitBreakerConfig, RetryPolicy};
    use crate::tools::ToolExecutor;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    fn fake_tool(dir: &Path, name: &str, script: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn runner(dir: &Path) -> Arc<ToolRunner> {
        Arc::new(ToolRunner::new(
            Arc::new(ToolExecutor::new(Some(dir.to_path_buf()))),
            RetryPolicy { max_retries: 0, jitter: false, ..RetryPolicy::default() },
            BackoffStrategy::Exponential,
            CircuitBreakerConfig::default(),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn test_collects_gf_and_nuclei_evidence() {
        let dir = tempfile::tempdir().unwrap();
        // Echo stdin back only for the "debug-pages" pattern.
        fake_tool(dir.path(), "gf", r#"if [ "$1" = "debug-pages" ]; then cat; else exit 1; fi"#);
        fake_tool(
            dir.path(),
            "nuclei",
            r#"echo '{"template-id":"debug-endpoint","matched-at":"http://a.test/?debug=1","info":{"name":"Debug","severity":"low"}}'"#,
        );

        let r = runner(dir.path());
        let scanner = TemplateScanner::new(r.clone(), vec!["misconfiguration".into()], vec!["low".into()], None);
        let corroborator = ToolCorroborator::new(r, vec!["debug-pages".into(), "takeovers".into()], scanner);

        let evidence = corroborator.corroborate("http://a.test/?debug=1").await;
        assert_eq!(evidence.gf_matches.len(), 1);
        assert_eq!(evidence.gf_matches["debug-pages"], vec!["http://a.test/?debug=1"]);
        let nuclei = evidence.nuclei.unwrap();
        assert_eq!(nuclei.total(), 1);
        assert_eq!(nuclei.findings[0].template, "debug-endpoint");
    }

    #[tokio::test]
    async fn test_scanner_failures_leave_evidence_empty() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), "nuclei", "echo broken >&2; exit 1");
        let r = runner(dir.path());
        let scanner = TemplateScanner::new(r.clone(), vec![], vec![], None);
        // gf is absent from the bin dir; a missing binary must not panic either.
        let corroborator = ToolCorroborator::new(r, vec!["reconpro-missing-pattern".into()], scanner);

        let evidence = corroborator.corroborate("http://a.test/").await;
        assert!(evidence.nuclei.is_none());
        assert!(evidence.is_empty());
    }
}

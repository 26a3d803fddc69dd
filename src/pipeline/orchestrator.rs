use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::events::{ScanEvent, ScanObserver};
use super::metrics::compute_metadata;
use super::phase::display_name;
use super::state::*;
use crate::config::{validate_semantics, ReconConfig};
use crate::discovery::{
    classify_api_endpoints, extract_parameterized_urls, normalize_hostname, DiscoveryEngine, DiscoverySettings,
};
use crate::errors::ScanError;
use crate::fuzz::{Fuzzer, JwtAnalyzer, PayloadCatalog, TemplateScanner, ToolCorroborator};
use crate::http::{HttpClient, TokenJar};
use crate::models::{FuzzResult, HttpMethod, JwtFinding, SubtaskFailure, TemplateScanReport};
use crate::sink::ResultSink;
use crate::tools::{Tool, ToolRunner};
use crate::utils::formatting::format_progress;

/// Drives one scan through the phase sequence. Engines are built once from the
/// configuration and shared by every phase.
pub struct ScanOrchestrator {
    config: ReconConfig,
    runner: Arc<ToolRunner>,
    http: HttpClient,
    discovery: DiscoveryEngine,
    fuzzer: Fuzzer,
    templates: TemplateScanner,
    jwt: JwtAnalyzer,
    tokens: Arc<TokenJar>,
    sink: Arc<dyn ResultSink>,
    observers: Vec<Arc<dyn ScanObserver>>,
    cancel_token: CancellationToken,
}

impl ScanOrchestrator {
    pub async fn new(
        config: ReconConfig,
        sink: Arc<dyn ResultSink>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ScanError> {
        validate_semantics(&config)?;

        let runner = Arc::new(ToolRunner::from_config(&config));
        let tokens = Arc::new(TokenJar::new());
        let mut http = HttpClient::from_config(&config, cancel_token.clone())?;
        if config.scan.enable_jwt_analysis {
            http = http.with_token_jar(tokens.clone());
        }

        let payloads = match &config.fuzz.payload_dir {
            Some(dir) => PayloadCatalog::load_dir(dir).await?,
            None => PayloadCatalog::builtin(),
        };
        let mut fuzzer = Fuzzer::from_config(http.clone(), &config, Arc::new(payloads));
        if config.fuzz.corroborate {
            fuzzer = fuzzer.with_corroborator(Arc::new(ToolCorroborator::from_config(runner.clone(), &config)));
        }

        let discovery = DiscoveryEngine::new(runner.clone(), http.clone(), DiscoverySettings::from_config(&config));
        let templates = TemplateScanner::from_config(runner.clone(), &config);
        let jwt = JwtAnalyzer::new(runner.clone());

        Ok(Self {
            config,
            runner,
            http,
            discovery,
            fuzzer,
            templates,
            jwt,
            tokens,
            sink,
            observers: Vec::new(),
            cancel_token,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn required_tools(&self) -> Vec<Tool> {
        required_tools(&self.config)
    }

    /// Run one full scan of `domain`. The HTTP client is shut down when
    /// this returns, so each orchestrator serves a single scan.
    ///
    /// Cancellation is not an error: the report comes back with status
    /// `Cancelled`. Only fatal problems found during INIT (invalid target,
    /// missing tools) are returned as `Err`.
    pub async fn run(&self, domain: &str) -> Result<ScanReport, ScanError> {
        let mut report = ScanReport::new(Uuid::new_v4().to_string(), domain.trim().to_ascii_lowercase());
        report.status = ScanStatus::Running;
        info!(scan_id = %report.scan_id, domain = %report.domain, "Scan started");
        self.emit(&ScanEvent::ScanStarted { scan_id: report.scan_id.clone(), domain: report.domain.clone() });

        let outcome = self.execute(&mut report).await;
        // The HTTP gate closes on every exit path; an orchestrator runs one scan.
        self.http.shutdown();
        match outcome {
            Ok(()) => {}
            Err(ScanError::Cancelled) => self.finish_cancelled(&mut report).await,
            Err(e) => {
                error!(scan_id = %report.scan_id, error = %e, "Scan failed");
                report.status = ScanStatus::Failed;
                report.error = Some(e.to_string());
                report.end_time = Some(Utc::now());
                self.emit_finished(&report);
                return Err(e);
            }
        }

        self.emit_finished(&report);
        info!(
            scan_id = %report.scan_id,
            status = %report.status,
            subdomains = report.subdomains.len(),
            urls = report.urls.len(),
            vulnerabilities = report.fuzz_results.len(),
            failed_subtasks = report.failures.len(),
            "Scan finished"
        );
        Ok(report)
    }

    async fn execute(&self, report: &mut ScanReport) -> Result<(), ScanError> {
        self.init(report)?;

        // SUBDOMAIN_ENUM
        self.transition(report, ScanPhase::SubdomainEnum, PhaseStatus::Started, Value::Null);
        let found = self.guarded(self.discovery.enumerate_subdomains(&report.domain)).await?;
        report.subdomains = found.value;
        report.absorb(found.failures);
        let payload = json!({ "count": report.subdomains.len() });
        self.transition(report, ScanPhase::SubdomainEnum, PhaseStatus::Completed, payload);

        if self.config.scan.enable_port_scan {
            self.transition(report, ScanPhase::PortScan, PhaseStatus::Started, Value::Null);
            let ports = self.guarded(self.discovery.scan_ports(&report.subdomains)).await?;
            report.open_ports = ports.value;
            report.absorb(ports.failures);
            let payload = json!({ "count": report.open_ports.len() });
            self.transition(report, ScanPhase::PortScan, PhaseStatus::Completed, payload);
        }

        if self.config.scan.enable_tech_detection {
            self.transition(report, ScanPhase::TechDetection, PhaseStatus::Started, Value::Null);
            let technologies = self.guarded(self.discovery.detect_technologies(&report.subdomains)).await?;
            report.technologies = technologies.value;
            report.absorb(technologies.failures);
            let payload = json!({ "count": report.technologies.len() });
            self.transition(report, ScanPhase::TechDetection, PhaseStatus::Completed, payload);
        }

        if self.config.scan.enable_content_discovery {
            self.content_discovery(report).await?;
        }

        self.collect_urls(report).await?;
        if report.urls.is_empty() {
            // Nothing to extract parameters from; fuzzing is skipped.
            warn!(domain = %report.domain, "No URLs collected, skipping parameter discovery and fuzzing");
            self.transition(report, ScanPhase::UrlCollection, PhaseStatus::Error, json!("no URLs collected"));
        } else {
            let payload = json!({ "count": report.urls.len() });
            self.transition(report, ScanPhase::UrlCollection, PhaseStatus::Completed, payload);
            self.check_cancelled()?;
            self.discover_parameters(report);
            self.fuzz(report).await?;
        }

        if self.config.scan.enable_vulnerability_scan {
            self.vulnerability_scan(report).await?;
        }

        if self.config.scan.enable_jwt_analysis {
            self.check_cancelled()?;
            self.jwt_analysis(report).await?;
        }

        self.check_cancelled()?;
        self.reporting(report).await;
        Ok(())
    }

    fn init(&self, report: &mut ScanReport) -> Result<(), ScanError> {
        self.transition(report, ScanPhase::Init, PhaseStatus::Started, Value::Null);
        let checked = normalize_hostname(&report.domain)
            .ok_or_else(|| ScanError::InvalidArgument(format!("Invalid domain: {}", report.domain)))
            .and_then(|domain| {
                let tools = self.required_tools();
                self.runner.preflight(&tools)?;
                Ok((domain, tools))
            });

        match checked {
            Ok((domain, tools)) => {
                report.domain = domain;
                let names: Vec<&str> = tools.iter().map(|t| t.binary()).collect();
                self.transition(report, ScanPhase::Init, PhaseStatus::Completed, json!({ "tools": names }));
                Ok(())
            }
            Err(e) => {
                self.transition(report, ScanPhase::Init, PhaseStatus::Error, json!(e.to_string()));
                Err(e)
            }
        }
    }

    async fn content_discovery(&self, report: &mut ScanReport) -> Result<(), ScanError> {
        self.transition(report, ScanPhase::ContentDiscovery, PhaseStatus::Started, Value::Null);
        let found = self.guarded(self.discovery.discover_content(&report.domain, &report.subdomains)).await?;
        report.content_urls = found.value;
        report.absorb(found.failures);
        let payload = json!({ "count": report.content_urls.len() });
        self.transition(report, ScanPhase::ContentDiscovery, PhaseStatus::Completed, payload);
        Ok(())
    }

    /// URL sources merged with whatever content discovery found. The phase
    /// is left open for the caller to close.
    async fn collect_urls(&self, report: &mut ScanReport) -> Result<(), ScanError> {
        self.transition(report, ScanPhase::UrlCollection, PhaseStatus::Started, Value::Null);
        let collected = self.guarded(self.discovery.collect_urls(&report.subdomains)).await?;
        report.urls = collected.value;
        report.urls.extend(report.content_urls.iter().cloned());
        report.absorb(collected.failures);
        Ok(())
    }

    fn discover_parameters(&self, report: &mut ScanReport) {
        self.transition(report, ScanPhase::ParamDiscovery, PhaseStatus::Started, Value::Null);
        report.parameterized_urls = extract_parameterized_urls(&report.urls);
        report.api_endpoints = classify_api_endpoints(&report.urls);
        let payload = json!({
            "urls": report.parameterized_urls.len(),
            "parameters": report.parameterized_urls.iter().map(|p| p.parameters.len()).sum::<usize>(),
            "api_endpoints": report.api_endpoints.len(),
        });
        self.transition(report, ScanPhase::ParamDiscovery, PhaseStatus::Completed, payload);
    }

    async fn fuzz(&self, report: &mut ScanReport) -> Result<(), ScanError> {
        self.transition(report, ScanPhase::Fuzzing, PhaseStatus::Started, Value::Null);

        let tasks: Vec<(String, String)> = report
            .parameterized_urls
            .iter()
            .flat_map(|p| p.parameters.iter().map(move |name| (p.url.clone(), name.clone())))
            .collect();
        let total = tasks.len();
        let scan_id = report.scan_id.clone();

        self.guarded(async {
            let mut outcomes = stream::iter(tasks)
                .map(|(url, parameter)| async move { self.fuzz_both_methods(&url, &parameter).await })
                .buffer_unordered(self.config.fuzz.parameter_concurrency.max(1));

            let mut processed = 0;
            while let Some(results) = outcomes.next().await {
                processed += 1;
                for result in results {
                    self.record_result(&scan_id, &result, &mut report.failures).await;
                    report.fuzz_results.push(result);
                }
                self.emit(&ScanEvent::Progress { processed, total });
                let progress = json!({ "processed": processed, "total": total });
                report.set_phase(ScanPhase::Fuzzing, PhaseStatus::InProgress, Some(format_progress(processed, total)));
                self.emit(&ScanEvent::Phase { phase: ScanPhase::Fuzzing, status: PhaseStatus::InProgress, payload: progress });
            }
        })
        .await?;

        let payload = json!({ "parameters": total, "vulnerabilities": report.fuzz_results.len() });
        self.transition(report, ScanPhase::Fuzzing, PhaseStatus::Completed, payload);
        Ok(())
    }

    /// GET pass, plus a POST pass when the GET baseline answers 405.
    async fn fuzz_both_methods(&self, url: &str, parameter: &str) -> Vec<FuzzResult> {
        let mut outcome = self.fuzzer.fuzz_parameter(url, parameter, HttpMethod::Get).await;
        if outcome.baseline_status == Some(405) {
            info!(url, parameter, "GET not allowed, fuzzing with POST");
            let post = self.fuzzer.fuzz_parameter(url, parameter, HttpMethod::Post).await;
            outcome.results.extend(post.results);
        }
        outcome.results
    }

    async fn record_result(&self, scan_id: &str, result: &FuzzResult, failures: &mut Vec<SubtaskFailure>) {
        self.emit(&ScanEvent::VulnerabilityFound {
            url: result.url.clone(),
            parameter: result.parameter.clone(),
            method: result.method,
            signals: result.signals.clone(),
        });
        if let Err(e) = self.sink.record_fuzz_result(scan_id, result).await {
            warn!(url = %result.url, error = %e, "Failed to record fuzz result");
            failures.push(SubtaskFailure::new("record fuzz result", &e));
        }
    }

    async fn vulnerability_scan(&self, report: &mut ScanReport) -> Result<(), ScanError> {
        self.transition(report, ScanPhase::VulnerabilityScan, PhaseStatus::Started, Value::Null);

        let hosts: Vec<String> = report.subdomains.iter().cloned().collect();
        let concurrency = self.config.tools.max_concurrent.max(1);
        let scans: Vec<(String, Result<TemplateScanReport, ScanError>)> = self
            .guarded(
                stream::iter(hosts)
                    .map(|host| async move {
                        let outcome = self.templates.scan(&host).await;
                        (host, outcome)
                    })
                    .buffer_unordered(concurrency)
                    .collect::<Vec<_>>(),
            )
            .await?;

        let mut merged = TemplateScanReport::new(Vec::new());
        for (host, outcome) in scans {
            match outcome {
                Ok(found) => {
                    if let Err(e) = self.sink.record_template_findings(&report.scan_id, &host, &found.findings).await {
                        warn!(host = %host, error = %e, "Failed to record template findings");
                        report.failures.push(SubtaskFailure::new("record template findings", &e));
                    }
                    merged.merge(found);
                }
                Err(e) => {
                    warn!(host = %host, error = %e, "Template scan failed");
                    report.failures.push(SubtaskFailure::new(format!("nuclei {}", host), &e));
                }
            }
        }

        let by_severity: serde_json::Map<String, Value> =
            merged.by_severity.iter().map(|(s, n)| (s.to_string(), json!(n))).collect();
        let payload = json!({ "findings": merged.total(), "by_severity": by_severity });
        report.template_report = merged;
        self.transition(report, ScanPhase::VulnerabilityScan, PhaseStatus::Completed, payload);
        Ok(())
    }

    /// Tokens from every response seen so far plus the collected URLs.
    async fn jwt_analysis(&self, report: &mut ScanReport) -> Result<(), ScanError> {
        self.transition(report, ScanPhase::JwtAnalysis, PhaseStatus::Started, Value::Null);
        for url in &report.urls {
            self.tokens.observe(url, url);
        }
        let seen = self.tokens.len();
        let mut tokens = self.tokens.tokens();
        let limit = self.config.tools.jwt_max_tokens.max(1);
        if tokens.len() > limit {
            warn!(seen, limit, "Too many tokens, analyzing the first ones only");
            tokens.truncate(limit);
        }

        let concurrency = self.config.tools.max_concurrent.max(1);
        let outcomes: Vec<_> = self
            .guarded(
                stream::iter(tokens)
                    .map(|(token, source)| async move {
                        let outcome = self.jwt.analyze(&token, &source).await;
                        (source, outcome)
                    })
                    .buffer_unordered(concurrency)
                    .collect::<Vec<_>>(),
            )
            .await?;

        let mut findings: Vec<JwtFinding> = Vec::new();
        for (source, outcome) in outcomes {
            match outcome {
                Ok(Some(finding)) => findings.push(finding),
                Ok(None) => {}
                Err(e) => {
                    warn!(source = %source, error = %e, "JWT analysis failed");
                    report.failures.push(SubtaskFailure::new(format!("jwt_tool {}", source), &e));
                }
            }
        }
        findings.sort_by(|a, b| (a.severity, &a.source).cmp(&(b.severity, &b.source)));

        if let Err(e) = self.sink.record_jwt_findings(&report.scan_id, &findings).await {
            warn!(error = %e, "Failed to record JWT findings");
            report.failures.push(SubtaskFailure::new("record jwt findings", &e));
        }
        let payload = json!({ "tokens": seen, "findings": findings.len() });
        report.jwt_findings = findings;
        self.transition(report, ScanPhase::JwtAnalysis, PhaseStatus::Completed, payload);
        Ok(())
    }

    async fn reporting(&self, report: &mut ScanReport) {
        self.transition(report, ScanPhase::Reporting, PhaseStatus::Started, Value::Null);
        report.end_time = Some(Utc::now());
        report.status = completion_status(report);

        let metadata = compute_metadata(report);
        match self.sink.record_scan_metadata(&metadata).await {
            Ok(()) => {
                let payload = serde_json::to_value(&metadata).unwrap_or(Value::Null);
                self.transition(report, ScanPhase::Reporting, PhaseStatus::Completed, payload);
            }
            Err(e) => {
                error!(error = %e, "Failed to record scan metadata");
                report.failures.push(SubtaskFailure::new("record scan metadata", &e));
                self.transition(report, ScanPhase::Reporting, PhaseStatus::Error, json!(e.to_string()));
                report.status = ScanStatus::CompletedWithErrors;
            }
        }
    }

    async fn finish_cancelled(&self, report: &mut ScanReport) {
        let killed = self.runner.executor().cleanup();
        self.http.shutdown();
        warn!(scan_id = %report.scan_id, killed_processes = killed, "Scan cancelled");

        if let Some(phase) = report.current_phase() {
            let unfinished = report.phase(phase).map_or(false, |r| r.finished_at.is_none());
            if unfinished {
                self.transition(report, phase, PhaseStatus::Error, json!("cancelled"));
            }
        }
        report.status = ScanStatus::Cancelled;
        report.error = Some(ScanError::Cancelled.to_string());
        report.end_time = Some(Utc::now());

        // The partial record still reaches the sink.
        if let Err(e) = self.sink.record_scan_metadata(&compute_metadata(report)).await {
            warn!(error = %e, "Failed to record metadata of cancelled scan");
        }
    }

    /// Race `work` against cancellation. A cancelled scan drops the work,
    /// which kills its subprocesses and aborts its requests.
    async fn guarded<F: Future>(&self, work: F) -> Result<F::Output, ScanError> {
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(ScanError::Cancelled),
            output = work => Ok(output),
        }
    }

    fn check_cancelled(&self) -> Result<(), ScanError> {
        if self.cancel_token.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn transition(&self, report: &mut ScanReport, phase: ScanPhase, status: PhaseStatus, payload: Value) {
        let detail = payload.as_str().map(str::to_string);
        report.set_phase(phase, status, detail);
        match status {
            PhaseStatus::Error => warn!(phase = %phase, name = display_name(phase), payload = %payload, "Phase failed"),
            _ => info!(phase = %phase, name = display_name(phase), status = %status, "Phase transition"),
        }
        self.emit(&ScanEvent::Phase { phase, status, payload });
    }

    fn emit(&self, event: &ScanEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }

    fn emit_finished(&self, report: &ScanReport) {
        self.emit(&ScanEvent::ScanFinished {
            scan_id: report.scan_id.clone(),
            status: report.status,
            vulnerabilities: report.fuzz_results.len(),
        });
    }
}

/// Every binary the configured phases will invoke.
pub fn required_tools(config: &ReconConfig) -> Vec<Tool> {
    let mut tools: BTreeSet<Tool> = BTreeSet::new();
    tools.extend(config.tools.subdomain_sources.iter().map(|s| s.tool()));
    tools.extend(config.tools.url_sources.iter().map(|s| s.tool()));
    if config.scan.enable_port_scan {
        tools.insert(Tool::Nmap);
    }
    if config.scan.enable_tech_detection {
        tools.insert(Tool::Wappalyzer);
    }
    if config.scan.enable_vulnerability_scan || config.fuzz.corroborate {
        tools.insert(Tool::Nuclei);
    }
    if config.fuzz.corroborate {
        tools.insert(Tool::Gf);
    }
    if config.scan.enable_content_discovery {
        tools.extend(config.tools.content_sources.iter().map(|s| s.tool()));
    }
    if config.scan.enable_jwt_analysis {
        tools.insert(Tool::JwtTool);
    }
    tools.into_iter().collect()
}

fn completion_status(report: &ScanReport) -> ScanStatus {
    if report.has_phase_errors() || !report.failures.is_empty() {
        ScanStatus::CompletedWithErrors
    } else {
        ScanStatus::Completed
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use super::analyzer::{analyze, AnalysisSettings, Baseline};
use super::corroborate::Corroborator;
use super::payloads::PayloadCatalog;
use super::signatures::ErrorSignatures;
use crate::config::ReconConfig;
use crate::errors::{BackoffStrategy, RetryPolicy, ScanError};
use crate::http::{HttpClient, HttpResponse};
use crate::models::{FuzzResult, HttpMethod};

#[derive(Debug, Clone, Copy)]
pub struct FuzzSettings {
    pub similarity_threshold: f64,
    /// Payload trials in flight per parameter.
    pub concurrency: usize,
    pub similarity_timeout: Duration,
}

impl FuzzSettings {
    pub fn from_config(config: &ReconConfig) -> Self {
        Self {
            similarity_threshold: config.fuzz.similarity_threshold,
            concurrency: config.fuzz.concurrency,
            similarity_timeout: Duration::from_millis(config.fuzz.similarity_timeout_ms),
        }
    }

    fn analysis(&self) -> AnalysisSettings {
        AnalysisSettings {
            similarity_threshold: self.similarity_threshold,
            similarity_timeout: self.similarity_timeout,
        }
    }
}

impl Default for FuzzSettings {
    fn default() -> Self {
        Self { similarity_threshold: 0.8, concurrency: 10, similarity_timeout: Duration::from_millis(500) }
    }
}

/// Outcome of one parameter's fuzzing pass.
#[derive(Debug, Clone, Default)]
pub struct ParameterOutcome {
    pub results: Vec<FuzzResult>,
    /// `None` when the baseline could not be captured.
    pub baseline_status: Option<u16>,
    /// Payload trials that were sent.
    pub attempted: usize,
}

pub struct Fuzzer {
    http: HttpClient,
    retry: RetryPolicy,
    strategy: BackoffStrategy,
    payloads: Arc<PayloadCatalog>,
    signatures: Arc<ErrorSignatures>,
    corroborator: Option<Arc<dyn Corroborator>>,
    settings: FuzzSettings,
}

impl Fuzzer {
    pub fn new(
        http: HttpClient,
        retry: RetryPolicy,
        strategy: BackoffStrategy,
        payloads: Arc<PayloadCatalog>,
        signatures: Arc<ErrorSignatures>,
        settings: FuzzSettings,
    ) -> Self {
        Self { http, retry, strategy, payloads, signatures, corroborator: None, settings }
    }

    pub fn from_config(http: HttpClient, config: &ReconConfig, payloads: Arc<PayloadCatalog>) -> Self {
        let signatures = match &config.fuzz.error_signatures {
            Some(map) => ErrorSignatures::from_map(map.clone()),
            None => ErrorSignatures::builtin(),
        };
        Self::new(
            http,
            config.retry_policy(),
            config.resilience.backoff_strategy,
            payloads,
            Arc::new(signatures),
            FuzzSettings::from_config(config),
        )
    }

    pub fn with_corroborator(mut self, corroborator: Arc<dyn Corroborator>) -> Self {
        self.corroborator = Some(corroborator);
        self
    }

    /// Capture a baseline for `parameter`, then send every selected payload
    /// and keep the trials judged vulnerable. Never fails: a missing baseline
    /// or a failed trial only shrinks the result.
    pub async fn fuzz_parameter(&self, url: &str, parameter: &str, method: HttpMethod) -> ParameterOutcome {
        let baseline = match self.baseline(url, parameter, method).await {
            Ok(baseline) => baseline,
            Err(e) => {
                warn!(url, parameter, method = %method, error = %e, "Baseline failed, skipping parameter");
                return ParameterOutcome::default();
            }
        };
        debug!(
            url,
            parameter,
            method = %method,
            status = baseline.status,
            bytes = baseline.content_length,
            "Baseline captured"
        );

        let payloads = self.payloads.select_payloads(parameter);
        if payloads.is_empty() {
            warn!(parameter, "No payloads selected");
            return ParameterOutcome { baseline_status: Some(baseline.status), ..Default::default() };
        }

        let attempted = payloads.len();
        let baseline = &baseline;
        let results: Vec<FuzzResult> = stream::iter(payloads)
            .map(|payload| async move {
                match self.trial(url, parameter, method, &payload, baseline).await {
                    Ok(result) => result,
                    Err(e) => {
                        debug!(url, parameter, payload = %payload, error = %e, "Payload trial failed");
                        None
                    }
                }
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .filter_map(|result| async move { result })
            .collect()
            .await;

        if !results.is_empty() {
            info!(url, parameter, method = %method, findings = results.len(), "Parameter flagged");
        }
        ParameterOutcome { results, baseline_status: Some(baseline.status), attempted }
    }

    async fn baseline(&self, url: &str, parameter: &str, method: HttpMethod) -> Result<Baseline, ScanError> {
        let response = self
            .retry
            .retry_status("baseline", self.strategy, || self.send(url, parameter, "", method))
            .await
            .map_err(|e| match e {
                ScanError::Cancelled => e,
                other => ScanError::MissingBaseline(format!("{} [{}]: {}", url, parameter, other)),
            })?;
        Ok(Baseline::from(response))
    }

    async fn trial(
        &self,
        url: &str,
        parameter: &str,
        method: HttpMethod,
        payload: &str,
        baseline: &Baseline,
    ) -> Result<Option<FuzzResult>, ScanError> {
        // Error statuses are evidence here, so only transport failures are retried.
        let response = self
            .retry
            .retry("payload trial", self.strategy, || self.send(url, parameter, payload, method))
            .await?;

        let analysis = analyze(baseline, &response, payload, &self.signatures, self.settings.analysis());
        if !analysis.is_vulnerable() {
            return Ok(None);
        }

        let target = match method {
            HttpMethod::Get => build_request_url(url, parameter, payload)?,
            HttpMethod::Post => url.to_string(),
        };
        info!(
            url = %target,
            parameter,
            method = %method,
            similarity = analysis.similarity,
            signals = ?analysis.signals,
            "Potential vulnerability"
        );

        let evidence = match &self.corroborator {
            Some(corroborator) => Some(corroborator.corroborate(&target).await),
            None => None,
        };

        Ok(Some(FuzzResult {
            url: target,
            parameter: parameter.to_string(),
            payload: payload.to_string(),
            method,
            similarity: analysis.similarity,
            response_time_ms: response.elapsed.as_millis() as u64,
            status_code: response.status,
            content_length: response.content_length,
            reflection_count: analysis.reflection_count,
            error_patterns: analysis.error_patterns,
            signals: analysis.signals,
            evidence,
            timestamp: Utc::now(),
        }))
    }

    async fn send(&self, url: &str, parameter: &str, value: &str, method: HttpMethod) -> Result<HttpResponse, ScanError> {
        match method {
            HttpMethod::Get => self.http.get(&build_request_url(url, parameter, value)?).await,
            HttpMethod::Post => self.http.post_json(url, &json!({ parameter: value })).await,
        }
    }
}

/// `url` with `parameter` set to `value`. The first occurrence is replaced,
/// later duplicates are dropped, and the parameter is appended when absent.
pub fn build_request_url(url: &str, parameter: &str, value: &str) -> Result<String, ScanError> {
    let mut parsed = Url::parse(url)?;
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut replaced = false;

    for (key, existing) in parsed.query_pairs() {
        if key == parameter {
            if replaced {
                continue;
            }
            pairs.push((key.into_owned(), value.to_string()));
            replaced = true;
        } else {
            pairs.push((key.into_owned(), existing.into_owned()));
        }
    }
    if !replaced {
        pairs.push((parameter.to_string(), value.to_string()));
    }

    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    Ok(parsed.to_string())
}

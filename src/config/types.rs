use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::retry::{default_retryable_kinds, BackoffStrategy, RetryPolicy};
use crate::errors::CircuitBreakerConfig;
use crate::tools::registry::{ContentSource, SubdomainSource, UrlSource};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ReconConfig {
    pub scan: ScanConfig,
    pub proxy: ProxyConfig,
    pub resilience: ResilienceConfig,
    pub tools: ToolsConfig,
    pub fuzz: FuzzConfig,
    pub output: OutputConfig,
}

impl ReconConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let r = &self.resilience;
        RetryPolicy {
            max_retries: r.max_retries,
            initial_delay: delay_from_secs(r.retry_delay_secs),
            max_delay: delay_from_secs(r.max_delay_secs),
            backoff_factor: r.backoff_factor,
            jitter: r.jitter,
            retryable_kinds: default_retryable_kinds(),
            retryable_statuses: r.retryable_statuses.iter().copied().collect(),
        }
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.resilience.breaker_failure_threshold,
            reset_timeout: Duration::from_secs(self.resilience.breaker_reset_timeout_secs),
        }
    }
}

/// Longest retry delay a config may ask for.
pub const MAX_RETRY_DELAY_SECS: f64 = 86_400.0;

/// Out-of-range or non-finite values clamp instead of panicking; semantic
/// validation rejects them first.
fn delay_from_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_RETRY_DELAY_SECS)).unwrap_or_default()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    pub max_concurrent_requests: usize,
    pub request_timeout_secs: u64,
    pub follow_redirects: bool,
    pub verify_tls: bool,
    pub user_agent: String,
    /// Per-probe timeout for subdomain liveness checks.
    pub probe_timeout_secs: u64,
    pub probe_concurrency: usize,
    pub enable_port_scan: bool,
    pub enable_tech_detection: bool,
    /// Crawl and brute-force paths on live hosts before URL collection.
    pub enable_content_discovery: bool,
    pub enable_vulnerability_scan: bool,
    /// Analyze JSON Web Tokens seen in responses and collected URLs.
    pub enable_jwt_analysis: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 50,
            request_timeout_secs: 30,
            follow_redirects: true,
            verify_tls: true,
            user_agent: "ReconPro Scanner/1.0".to_string(),
            probe_timeout_secs: 5,
            probe_concurrency: 20,
            enable_port_scan: false,
            enable_tech_detection: false,
            enable_content_discovery: false,
            enable_vulnerability_scan: true,
            enable_jwt_analysis: false,
        }
    }
}

impl ScanConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub max_delay_secs: f64,
    pub backoff_factor: f64,
    pub backoff_strategy: BackoffStrategy,
    pub jitter: bool,
    pub retryable_statuses: Vec<u16>,
    pub breaker_failure_threshold: u32,
    pub breaker_reset_timeout_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 1.0,
            max_delay_secs: 60.0,
            backoff_factor: 2.0,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter: true,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            breaker_failure_threshold: 5,
            breaker_reset_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory searched for tool binaries before `PATH`.
    pub bin_dir: Option<PathBuf>,
    /// Fall back to `PATH` for binaries missing from `bin_dir`.
    pub search_path: bool,
    pub max_concurrent: usize,
    pub timeout_secs: u64,
    pub subdomain_sources: Vec<SubdomainSource>,
    pub url_sources: Vec<UrlSource>,
    pub content_sources: Vec<ContentSource>,
    /// Wordlist handed to the path brute-forcers.
    pub wordlist: Option<PathBuf>,
    pub crawl_depth: u32,
    /// Tokens handed to jwt_tool per scan.
    pub jwt_max_tokens: usize,
    pub nuclei_templates: Vec<String>,
    pub nuclei_severity: Vec<String>,
    pub gf_patterns: Vec<String>,
    pub nmap_top_ports: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bin_dir: None,
            search_path: true,
            max_concurrent: 5,
            timeout_secs: 300,
            subdomain_sources: SubdomainSource::ALL.to_vec(),
            url_sources: UrlSource::ALL.to_vec(),
            content_sources: vec![ContentSource::Katana, ContentSource::Hakrawler],
            wordlist: None,
            crawl_depth: 3,
            jwt_max_tokens: 20,
            nuclei_templates: vec!["cves".to_string(), "vulnerabilities".to_string()],
            nuclei_severity: vec!["critical".to_string(), "high".to_string(), "medium".to_string()],
            gf_patterns: vec![
                "debug-pages".to_string(),
                "takeovers".to_string(),
                "php-errors".to_string(),
            ],
            nmap_top_ports: 1000,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FuzzConfig {
    pub similarity_threshold: f64,
    /// Concurrent payload trials per parameter.
    pub concurrency: usize,
    /// Parameters fuzzed at once.
    pub parameter_concurrency: usize,
    /// Upper bound on one similarity computation before it falls back to an approximation.
    pub similarity_timeout_ms: u64,
    pub payload_dir: Option<PathBuf>,
    /// Replaces the built-in error signatures when set.
    pub error_signatures: Option<BTreeMap<String, Vec<String>>>,
    pub corroborate: bool,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            concurrency: 10,
            parameter_concurrency: 4,
            similarity_timeout_ms: 500,
            payload_dir: None,
            error_signatures: None,
            corroborate: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { directory: PathBuf::from("results") }
    }
}

pub mod content;
pub mod params;
pub mod services;
pub mod subdomains;
pub mod urls;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ReconConfig;
use crate::http::HttpClient;
use crate::tools::{ContentSource, SubdomainSource, ToolRunner, UrlSource};

pub use params::{classify_api_endpoints, extract_parameterized_urls, NOISE_PARAMETERS};
pub use subdomains::{is_within_domain, normalize_hostname};
pub use urls::extract_url;

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub subdomain_sources: Vec<SubdomainSource>,
    pub url_sources: Vec<UrlSource>,
    pub content_sources: Vec<ContentSource>,
    pub wordlist: Option<PathBuf>,
    pub crawl_depth: u32,
    /// Tool invocations in flight at once.
    pub tool_concurrency: usize,
    pub probe_timeout: Duration,
    pub probe_concurrency: usize,
    pub nmap_top_ports: u32,
}

impl DiscoverySettings {
    pub fn from_config(config: &ReconConfig) -> Self {
        Self {
            subdomain_sources: config.tools.subdomain_sources.clone(),
            url_sources: config.tools.url_sources.clone(),
            content_sources: config.tools.content_sources.clone(),
            wordlist: config.tools.wordlist.clone(),
            crawl_depth: config.tools.crawl_depth.max(1),
            tool_concurrency: config.tools.max_concurrent.max(1),
            probe_timeout: config.scan.probe_timeout(),
            probe_concurrency: config.scan.probe_concurrency.max(1),
            nmap_top_ports: config.tools.nmap_top_ports,
        }
    }
}

/// Subdomain enumeration, service fingerprinting, content discovery and URL collection.
pub struct DiscoveryEngine {
    runner: Arc<ToolRunner>,
    http: HttpClient,
    settings: DiscoverySettings,
}

impl DiscoveryEngine {
    pub fn new(runner: Arc<ToolRunner>, http: HttpClient, settings: DiscoverySettings) -> Self {
        Self { runner, http, settings }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }
}

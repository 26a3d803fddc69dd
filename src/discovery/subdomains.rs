use std::collections::BTreeSet;
use std::sync::LazyLock;

use futures::stream::{self, StreamExt};
use regex::Regex;
use tracing::{debug, info, warn};

use super::urls::extract_url;
use super::DiscoveryEngine;
use crate::errors::ScanError;
use crate::models::{PartialResult, SubdomainSet};
use crate::tools::{SourceOutput, ToolOutput};

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)*[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").unwrap()
});

/// Lowercase, strip a wildcard prefix and trailing dot, then validate.
pub fn normalize_hostname(raw: &str) -> Option<String> {
    let mut host = raw.trim().to_ascii_lowercase();
    if let Some(stripped) = host.strip_prefix("*.") {
        host = stripped.to_string();
    }
    let host = host.trim_end_matches('.');
    if host.is_empty() || host.len() > 253 {
        return None;
    }
    HOSTNAME.is_match(host).then(|| host.to_string())
}

/// True when `host` is `root` or one of its subdomains.
pub fn is_within_domain(host: &str, root: &str) -> bool {
    host == root || host.strip_suffix(root).map_or(false, |prefix| prefix.ends_with('.'))
}

/// Hostnames under `root` found in one tool's output.
pub fn harvest_hostnames(kind: SourceOutput, output: &ToolOutput, root: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter_map(|line| match kind {
            SourceOutput::Hostnames => normalize_hostname(line),
            SourceOutput::Urls => extract_url(line)
                .and_then(|u| u.host_str().map(str::to_string))
                .and_then(|h| normalize_hostname(&h)),
        })
        .filter(|host| is_within_domain(host, root))
        .collect()
}

impl DiscoveryEngine {
    /// Run every configured subdomain source, then keep the names that answer
    /// an HTTP probe. Individual tool and probe failures are reported, never raised.
    pub async fn enumerate_subdomains(&self, domain: &str) -> PartialResult<SubdomainSet> {
        let candidates = self.gather_candidates(domain).await;
        let mut live = self.validate_live(&candidates.value).await;

        let mut failures = candidates.failures;
        failures.append(&mut live.failures);
        live.failures = failures;

        info!(
            domain,
            candidates = candidates.value.len(),
            live = live.value.len(),
            failed = live.failures.len(),
            "Subdomain enumeration finished"
        );
        live
    }

    /// Union of all source outputs plus the root domain itself.
    pub async fn gather_candidates(&self, domain: &str) -> PartialResult<SubdomainSet> {
        let root = normalize_hostname(domain).unwrap_or_else(|| domain.trim().to_ascii_lowercase());
        let mut result = PartialResult::new(BTreeSet::from([root.clone()]));

        let root_ref = root.as_str();
        let runner = &self.runner;
        let outcomes: Vec<_> = stream::iter(self.settings.subdomain_sources.iter().copied())
            .map(|source| async move {
                let outcome = runner.run(source.tool(), &source.command(root_ref), false).await;
                (source, outcome)
            })
            .buffer_unordered(self.settings.tool_concurrency)
            .collect()
            .await;

        for (source, outcome) in outcomes {
            let tool = source.tool();
            match outcome {
                Ok(output) => {
                    let found = harvest_hostnames(source.output(), &output, root_ref);
                    debug!(tool = %tool, count = found.len(), "Subdomain source finished");
                    result.value.extend(found);
                }
                Err(e) => {
                    warn!(tool = %tool, error = %e, "Subdomain source failed");
                    result.record(tool.binary(), &e);
                }
            }
        }
        result
    }

    /// Keep hosts answering HEAD with a status below 500.
    pub async fn validate_live(&self, candidates: &SubdomainSet) -> PartialResult<SubdomainSet> {
        let probes: Vec<_> = stream::iter(candidates.iter())
            .map(|host| async move { (host, self.probe(host).await) })
            .buffer_unordered(self.settings.probe_concurrency)
            .collect()
            .await;

        let mut result = PartialResult::new(BTreeSet::new());
        for (host, outcome) in probes {
            match outcome {
                Ok(true) => {
                    result.value.insert(host.clone());
                }
                Ok(false) => debug!(host = %host, "Host answered with a server error"),
                Err(e) => {
                    debug!(host = %host, error = %e, "Host did not respond");
                    result.record(format!("probe {}", host), &e);
                }
            }
        }
        result
    }

    /// HEAD over HTTPS, falling back to HTTP only when HTTPS gets no response.
    /// `Ok(alive)` once either scheme answers.
    pub async fn probe(&self, host: &str) -> Result<bool, ScanError> {
        let timeout = self.settings.probe_timeout;
        match self.http.head_status(&format!("https://{}", host), timeout).await {
            Ok(status) => return Ok(status < 500),
            Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
            Err(e) => debug!(host, error = %e, "HTTPS probe failed, trying HTTP"),
        }
        let status = self.http.head_status(&format!("http://{}", host), timeout).await?;
        Ok(status < 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn output(stdout: &str) -> ToolOutput {
        ToolOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::ZERO,
            json: None,
        }
    }

    #[test]
    fn test_normalize_hostname() {
        assert_eq!(normalize_hostname("  API.Example.COM "), Some("api.example.com".into()));
        assert_eq!(normalize_hostname("*.dev.example.com"), Some("dev.example.com".into()));
        assert_eq!(normalize_hostname("www.example.com."), Some("www.example.com".into()));
        assert_eq!(normalize_hostname("not a host"), None);
        assert_eq!(normalize_hostname("-bad-.example.com"), None);
        assert_eq!(normalize_hostname(""), None);
    }

    #[test]
    fn test_hostname_pattern_compiles() {
        assert!(HOSTNAME.is_match("a-b.example.com"));
    }

    #[test]
    fn test_is_within_domain() {
        assert!(is_within_domain("example.com", "example.com"));
        assert!(is_within_domain("a.b.example.com", "example.com"));
        assert!(!is_within_domain("badexample.com", "example.com"));
        assert!(!is_within_domain("example.com.evil.net", "example.com"));
    }

    #[test]
    fn test_harvest_hostnames_from_names() {
        let out = output("www.example.com\n*.cdn.example.com\nother.net\n[INF] banner\n");
        let found = harvest_hostnames(SourceOutput::Hostnames, &out, "example.com");
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["cdn.example.com".to_string(), "www.example.com".to_string()]
        );
    }

    #[test]
    fn test_harvest_hostnames_from_urls() {
        let out = output("https://Shop.example.com/cart?id=1\nhttp://tracker.net/x\nnot-a-url\n");
        let found = harvest_hostnames(SourceOutput::Urls, &out, "example.com");
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec!["shop.example.com".to_string()]);
    }
}

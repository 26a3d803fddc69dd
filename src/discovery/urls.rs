use std::collections::BTreeSet;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use url::Url;

use super::DiscoveryEngine;
use crate::models::{PartialResult, SubdomainSet, UrlSet};
use crate::tools::ToolOutput;

/// First whitespace-separated token that parses as an http(s) URL with a host.
pub fn extract_url(line: &str) -> Option<Url> {
    line.split_whitespace()
        .map(|token| token.trim_matches(|c: char| matches!(c, '"' | '\'' | '<' | '>' | '[' | ']' | ',')))
        .filter_map(|token| Url::parse(token).ok())
        .find(|url| matches!(url.scheme(), "http" | "https") && url.host_str().map_or(false, |h| !h.is_empty()))
}

pub fn harvest_urls(output: &ToolOutput) -> BTreeSet<String> {
    output.lines().filter_map(extract_url).map(String::from).collect()
}

impl DiscoveryEngine {
    /// Run every URL source against every subdomain and union the results.
    pub async fn collect_urls(&self, subdomains: &SubdomainSet) -> PartialResult<UrlSet> {
        let sources = &self.settings.url_sources;
        let jobs = subdomains
            .iter()
            .flat_map(|host| sources.iter().map(move |source| (host.as_str(), *source)));

        let runner = &self.runner;
        let outcomes: Vec<_> = stream::iter(jobs)
            .map(|(host, source)| async move {
                let outcome = runner.run(source.tool(), &source.command(host), false).await;
                (host, source, outcome)
            })
            .buffer_unordered(self.settings.tool_concurrency)
            .collect()
            .await;

        let mut result = PartialResult::new(BTreeSet::new());
        for (host, source, outcome) in outcomes {
            let tool = source.tool();
            match outcome {
                Ok(output) => {
                    let found = harvest_urls(&output);
                    debug!(tool = %tool, host, count = found.len(), "URL source finished");
                    result.value.extend(found);
                }
                Err(e) => {
                    warn!(tool = %tool, host, error = %e, "URL source failed");
                    result.record(format!("{} {}", tool, host), &e);
                }
            }
        }

        info!(
            subdomains = subdomains.len(),
            urls = result.value.len(),
            failed = result.failures.len(),
            "URL collection finished"
        );
        result
    }
}

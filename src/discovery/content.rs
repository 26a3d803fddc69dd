use std::collections::BTreeSet;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use url::Url;

use super::urls::harvest_urls;
use super::{is_within_domain, DiscoveryEngine};
use crate::errors::ScanError;
use crate::models::{PartialResult, SubdomainSet, UrlSet};
use crate::tools::parsers::parse_status_paths;
use crate::tools::{ContentOutput, ContentSource, ToolOutput};

/// URLs one content source reported for `base`, restricted to hosts under `domain`.
pub fn harvest_content(source: ContentSource, output: &ToolOutput, base: &Url, domain: &str) -> BTreeSet<String> {
    let found = match source.output() {
        ContentOutput::Urls => harvest_urls(output),
        ContentOutput::StatusPaths => parse_status_paths(&output.stdout, base),
    };
    found
        .into_iter()
        .filter(|url| {
            Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(|h| is_within_domain(&h.to_ascii_lowercase(), domain)))
                .unwrap_or(false)
        })
        .collect()
}

impl DiscoveryEngine {
    /// Crawl and brute-force `https://<host>` with every content source.
    pub async fn discover_content(&self, domain: &str, subdomains: &SubdomainSet) -> PartialResult<UrlSet> {
        let settings = &self.settings;
        let jobs = subdomains
            .iter()
            .flat_map(|host| settings.content_sources.iter().map(move |source| (host.as_str(), *source)));

        let runner = &self.runner;
        let outcomes: Vec<_> = stream::iter(jobs)
            .map(|(host, source)| async move {
                let base = format!("https://{}", host);
                let command = source.command(&base, settings.crawl_depth, settings.wordlist.as_deref());
                let outcome = runner.run(source.tool(), &command, false).await;
                (host, source, base, outcome)
            })
            .buffer_unordered(settings.tool_concurrency)
            .collect()
            .await;

        let mut result = PartialResult::new(BTreeSet::new());
        for (host, source, base, outcome) in outcomes {
            let tool = source.tool();
            let output = match outcome {
                Ok(output) => output,
                Err(e) => {
                    warn!(tool = %tool, host, error = %e, "Content source failed");
                    result.record(format!("{} {}", tool, host), &e);
                    continue;
                }
            };
            match Url::parse(&base) {
                Ok(base) => {
                    let found = harvest_content(source, &output, &base, domain);
                    debug!(tool = %tool, host, count = found.len(), "Content source finished");
                    result.value.extend(found);
                }
                Err(e) => result.record(format!("{} {}", tool, host), &ScanError::from(e)),
            }
        }

        info!(
            subdomains = subdomains.len(),
            urls = result.value.len(),
            failed = result.failures.len(),
            "Content discovery finished"
        );
        result
    }
}

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::DiscoveryEngine;
use crate::models::{OpenPort, PartialResult, SubdomainSet, Technology};
use crate::tools::parsers::{parse_nmap_grepable, parse_wappalyzer};
use crate::tools::registry::{nmap_command, wappalyzer_command};
use crate::tools::Tool;

impl DiscoveryEngine {
    /// nmap service scan of every host, ordered by host then port.
    pub async fn scan_ports(&self, hosts: &SubdomainSet) -> PartialResult<Vec<OpenPort>> {
        let runner = &self.runner;
        let top_ports = self.settings.nmap_top_ports;
        let outcomes: Vec<_> = stream::iter(hosts.iter())
            .map(|host| async move { (host, runner.run(Tool::Nmap, &nmap_command(host, top_ports), false).await) })
            .buffer_unordered(self.settings.tool_concurrency)
            .collect()
            .await;

        let mut result = PartialResult::new(Vec::new());
        for (host, outcome) in outcomes {
            match outcome {
                Ok(output) => {
                    let ports = parse_nmap_grepable(&output.stdout);
                    debug!(host = %host, open = ports.len(), "Port scan finished");
                    result.value.extend(ports);
                }
                Err(e) => {
                    warn!(host = %host, error = %e, "Port scan failed");
                    result.record(format!("nmap {}", host), &e);
                }
            }
        }
        result.value.sort_by(|a, b| (&a.host, a.port).cmp(&(&b.host, b.port)));
        result.value.dedup();
        info!(hosts = hosts.len(), open_ports = result.value.len(), "Port scan phase finished");
        result
    }

    /// Fingerprint `https://<host>` for every host.
    pub async fn detect_technologies(&self, hosts: &SubdomainSet) -> PartialResult<Vec<Technology>> {
        let runner = &self.runner;
        let outcomes: Vec<_> = stream::iter(hosts.iter())
            .map(|host| async move {
                let url = format!("https://{}", host);
                let outcome = runner.run(Tool::Wappalyzer, &wappalyzer_command(&url), true).await;
                (host, url, outcome)
            })
            .buffer_unordered(self.settings.tool_concurrency)
            .collect()
            .await;

        let mut result = PartialResult::new(Vec::new());
        for (host, url, outcome) in outcomes {
            match outcome {
                Ok(output) => match output.json {
                    Some(json) => result.value.extend(parse_wappalyzer(&json, &url)),
                    None => warn!(host = %host, "Fingerprinter produced no JSON"),
                },
                Err(e) => {
                    warn!(host = %host, error = %e, "Technology detection failed");
                    result.record(format!("wappalyzer {}", host), &e);
                }
            }
        }
        result.value.sort_by(|a, b| (&a.url, &a.name).cmp(&(&b.url, &b.name)));
        info!(hosts = hosts.len(), technologies = result.value.len(), "Technology detection finished");
        result
    }
}

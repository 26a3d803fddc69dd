use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::models::{OpenPort, Severity, TemplateFinding, TemplateScanReport, Technology};

static NMAP_HOST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Host:\s+(\S+)\s+\(([^)]*)\)").unwrap());
static GOBUSTER_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(/\S*)\s+\(Status:\s*(\d{3})\)").unwrap());

/// Paths a brute-forcer reported with a 2xx status, joined onto `base`.
pub fn parse_status_paths(stdout: &str, base: &Url) -> BTreeSet<String> {
    stdout
        .lines()
        .filter_map(|line| GOBUSTER_PATH.captures(line.trim()))
        .filter(|caps| caps[2].parse::<u16>().map_or(false, |status| (200..300).contains(&status)))
        .filter_map(|caps| base.join(&caps[1]).ok())
        .map(String::from)
        .collect()
}

/// Parse nuclei JSON-lines output. Lines that are not JSON objects are skipped.
pub fn parse_nuclei_jsonl(stdout: &str) -> TemplateScanReport {
    let findings = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<Value>(line) {
            Ok(value) => template_finding(&value),
            Err(e) => {
                debug!(error = %e, "Skipping non-JSON nuclei line");
                None
            }
        })
        .collect();
    TemplateScanReport::new(findings)
}

fn template_finding(value: &Value) -> Option<TemplateFinding> {
    let info = value.get("info");
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

    let template = text(value.get("template-id"))?;
    let tags = match info.and_then(|i| i.get("tags")) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        Some(Value::String(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    Some(TemplateFinding {
        name: text(info.and_then(|i| i.get("name"))).unwrap_or_else(|| template.clone()),
        severity: info
            .and_then(|i| i.get("severity"))
            .and_then(Value::as_str)
            .map(Severity::from_label)
            .unwrap_or(Severity::Unknown),
        matched: text(value.get("matched-at"))
            .or_else(|| text(value.get("host")))
            .unwrap_or_default(),
        description: text(info.and_then(|i| i.get("description"))),
        tags,
        template,
    })
}

/// Parse nmap grepable (`-oG -`) output into open ports.
pub fn parse_nmap_grepable(stdout: &str) -> Vec<OpenPort> {
    let host_re = &*NMAP_HOST;
    let mut ports = Vec::new();
    for line in stdout.lines() {
        let Some((head, ports_field)) = line.split_once("Ports:") else {
            continue;
        };
        let Some(caps) = host_re.captures(head.trim()) else {
            continue;
        };
        let host = match caps.get(2).map(|m| m.as_str()).filter(|h| !h.is_empty()) {
            Some(name) => name.to_string(),
            None => caps[1].to_string(),
        };

        // Ports field ends at the next tab-separated section.
        let ports_field = ports_field.split('\t').next().unwrap_or_default();
        for entry in ports_field.split(',') {
            let fields: Vec<&str> = entry.trim().split('/').collect();
            if fields.len() < 5 || fields[1] != "open" {
                continue;
            }
            let Ok(port) = fields[0].parse::<u16>() else {
                continue;
            };
            ports.push(OpenPort {
                host: host.clone(),
                port,
                protocol: fields[2].to_string(),
                service: fields[4].to_string(),
            });
        }
    }
    ports
}

/// Parse wappalyzer JSON output for `url`.
pub fn parse_wappalyzer(json: &Value, url: &str) -> Vec<Technology> {
    let Some(technologies) = json.get("technologies").and_then(Value::as_array) else {
        return Vec::new();
    };

    technologies
        .iter()
        .filter_map(|tech| {
            let name = tech.get("name")?.as_str()?.to_string();
            let version = tech
                .get("version")
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let categories = tech
                .get("categories")
                .and_then(Value::as_array)
                .map(|cats| {
                    cats.iter()
                        .filter_map(|c| c.get("name").and_then(Value::as_str).or_else(|| c.as_str()))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(Technology { url: url.to_string(), name, version, categories })
        })
        .collect()
}

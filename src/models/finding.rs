use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Severity level reported by the template scanner, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    Unknown,
}

impl Severity {
    pub const REPORTED: [Severity; 5] =
        [Severity::Critical, Severity::High, Severity::Medium, Severity::Low, Severity::Info];

    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            "info" => Severity::Info,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
            Severity::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One match emitted by the template scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFinding {
    pub template: String,
    pub severity: Severity,
    pub name: String,
    /// URL or host the template matched against.
    pub matched: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Findings of one scanner run plus a per-severity tally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateScanReport {
    pub findings: Vec<TemplateFinding>,
    pub by_severity: BTreeMap<Severity, usize>,
}

impl TemplateScanReport {
    pub fn new(findings: Vec<TemplateFinding>) -> Self {
        let mut by_severity: BTreeMap<Severity, usize> =
            Severity::REPORTED.iter().map(|s| (*s, 0)).collect();
        for finding in &findings {
            *by_severity.entry(finding.severity).or_insert(0) += 1;
        }
        Self { findings, by_severity }
    }

    pub fn total(&self) -> usize {
        self.findings.len()
    }

    pub fn merge(&mut self, other: TemplateScanReport) {
        for (severity, count) in other.by_severity {
            *self.by_severity.entry(severity).or_insert(0) += count;
        }
        self.findings.extend(other.findings);
    }
}

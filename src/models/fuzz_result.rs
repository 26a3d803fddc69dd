use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::finding::TemplateScanReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reason a fuzzed response diverged from its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Body similarity fell below the configured threshold.
    LowSimilarity,
    /// The payload appears literally in the body.
    Reflection,
    /// Body length moved by more than 100 bytes.
    LengthDelta,
    /// Response time moved by more than 2 seconds.
    TimingDelta,
    /// A known error signature appeared in the body.
    ErrorPattern,
    /// Status code differs from the baseline.
    StatusChange,
}

/// Output of the secondary scanners run against a flagged URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecondaryEvidence {
    /// Pattern name to matching lines.
    pub gf_matches: BTreeMap<String, Vec<String>>,
    pub nuclei: Option<TemplateScanReport>,
}

impl SecondaryEvidence {
    pub fn is_empty(&self) -> bool {
        self.gf_matches.is_empty() && self.nuclei.as_ref().map_or(true, |n| n.total() == 0)
    }
}

/// A payload trial that was judged likely vulnerable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzResult {
    /// Request target; for GET this is the URL carrying the payload.
    pub url: String,
    pub parameter: String,
    pub payload: String,
    pub method: HttpMethod,
    pub similarity: f64,
    pub response_time_ms: u64,
    pub status_code: u16,
    pub content_length: usize,
    pub reflection_count: usize,
    /// `"category: pattern"` labels.
    pub error_patterns: Vec<String>,
    pub signals: Vec<Signal>,
    pub evidence: Option<SecondaryEvidence>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&HttpMethod::Post).unwrap(), "\"POST\"");
        assert_eq!(HttpMethod::Get.to_string(), "GET");
    }

    #[test]
    fn test_signal_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Signal::LowSimilarity).unwrap(), "\"low_similarity\"");
    }

    #[test]
    fn test_empty_evidence() {
        assert!(SecondaryEvidence::default().is_empty());
        let mut evidence = SecondaryEvidence::default();
        evidence.gf_matches.insert("debug-pages".into(), vec!["http://a.test/?debug=1".into()]);
        assert!(!evidence.is_empty());
    }
}

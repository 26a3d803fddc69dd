use std::time::Duration;

use super::signatures::ErrorSignatures;
use crate::http::HttpResponse;
use crate::models::Signal;
use crate::utils::similarity::similarity_ratio;

pub const LENGTH_DELTA_THRESHOLD: usize = 100;
pub const TIME_DELTA_THRESHOLD: Duration = Duration::from_secs(2);

/// Reference response for one (URL, parameter, method).
#[derive(Debug, Clone)]
pub struct Baseline {
    pub body: String,
    pub status: u16,
    pub elapsed: Duration,
    pub content_length: usize,
}

impl From<HttpResponse> for Baseline {
    fn from(r: HttpResponse) -> Self {
        Self { body: r.body, status: r.status, elapsed: r.elapsed, content_length: r.content_length }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnalysisSettings {
    pub similarity_threshold: f64,
    pub similarity_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub similarity: f64,
    pub reflection_count: usize,
    pub error_patterns: Vec<String>,
    pub signals: Vec<Signal>,
}

impl Analysis {
    pub fn is_vulnerable(&self) -> bool {
        !self.signals.is_empty()
    }
}

/// Compare a fuzzed response against its baseline. Any single signal flags it.
pub fn analyze(
    baseline: &Baseline,
    response: &HttpResponse,
    payload: &str,
    signatures: &ErrorSignatures,
    settings: AnalysisSettings,
) -> Analysis {
    let similarity = similarity_ratio(&baseline.body, &response.body, settings.similarity_timeout);
    let reflection_count = if payload.is_empty() { 0 } else { response.body.matches(payload).count() };
    let error_patterns = signatures.scan(&response.body);

    let mut signals = Vec::new();
    if similarity < settings.similarity_threshold {
        signals.push(Signal::LowSimilarity);
    }
    if reflection_count > 0 {
        signals.push(Signal::Reflection);
    }
    if response.content_length.abs_diff(baseline.content_length) > LENGTH_DELTA_THRESHOLD {
        signals.push(Signal::LengthDelta);
    }
    if duration_delta(response.elapsed, baseline.elapsed) > TIME_DELTA_THRESHOLD {
        signals.push(Signal::TimingDelta);
    }
    if !error_patterns.is_empty() {
        signals.push(Signal::ErrorPattern);
    }
    if response.status != baseline.status {
        signals.push(Signal::StatusChange);
    }

    Analysis { similarity, reflection_count, error_patterns, signals }
}

fn duration_delta(a: Duration, b: Duration) -> Duration {
    if a > b { a - b } else { b - a }
}

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ScanError;
use crate::pipeline::state::ScanStatus;

/// A URL with at least one non-noise query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterizedUrl {
    pub url: String,
    /// Ordered, unique, non-empty.
    pub parameters: Vec<String>,
}

/// A collected URL whose path looks like an API route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub url: String,
    /// The path marker that matched, e.g. `/api/`.
    pub marker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPort {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technology {
    pub url: String,
    pub name: String,
    pub version: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// A sub-task that failed without aborting its phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskFailure {
    pub task: String,
    pub error_type: String,
    pub error: String,
}

impl SubtaskFailure {
    pub fn new(task: impl Into<String>, error: &ScanError) -> Self {
        Self {
            task: task.into(),
            error_type: error.classify().error_type.to_string(),
            error: error.to_string(),
        }
    }
}

/// A phase outcome together with the sub-tasks that failed while producing it.
#[derive(Debug, Clone, Default)]
pub struct PartialResult<T> {
    pub value: T,
    pub failures: Vec<SubtaskFailure>,
}

impl<T> PartialResult<T> {
    pub fn new(value: T) -> Self {
        Self { value, failures: Vec::new() }
    }

    pub fn record(&mut self, task: impl Into<String>, error: &ScanError) {
        self.failures.push(SubtaskFailure::new(task, error));
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub type SubdomainSet = BTreeSet<String>;
pub type UrlSet = BTreeSet<String>;

/// Summary record of one scan cycle handed to the result sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMetadata {
    pub scan_id: String,
    pub domain: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ScanStatus,
    pub subdomain_count: usize,
    pub url_count: usize,
    pub parameter_count: usize,
    pub api_endpoint_count: usize,
    pub vulnerability_count: usize,
    pub template_finding_count: usize,
    /// URLs found by crawlers and path brute-forcers.
    #[serde(default)]
    pub content_url_count: usize,
    #[serde(default)]
    pub jwt_finding_count: usize,
    pub failed_subtasks: usize,
}

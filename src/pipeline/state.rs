use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ApiEndpoint, FuzzResult, JwtFinding, OpenPort, ParameterizedUrl, SubdomainSet, SubtaskFailure, TemplateScanReport,
    Technology, UrlSet,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanPhase {
    Init,
    SubdomainEnum,
    PortScan,
    TechDetection,
    ContentDiscovery,
    UrlCollection,
    ParamDiscovery,
    Fuzzing,
    VulnerabilityScan,
    JwtAnalysis,
    Reporting,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::SubdomainEnum => "SUBDOMAIN_ENUM",
            Self::PortScan => "PORT_SCAN",
            Self::TechDetection => "TECH_DETECTION",
            Self::ContentDiscovery => "CONTENT_DISCOVERY",
            Self::UrlCollection => "URL_COLLECTION",
            Self::ParamDiscovery => "PARAM_DISCOVERY",
            Self::Fuzzing => "FUZZING",
            Self::VulnerabilityScan => "VULNERABILITY_SCAN",
            Self::JwtAnalysis => "JWT_ANALYSIS",
            Self::Reporting => "REPORTING",
        }
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Started,
    InProgress,
    Completed,
    Error,
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Queued,
    Running,
    Completed,
    CompletedWithErrors,
    Cancelled,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed_with_errors"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Last known status of one phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseRecord {
    pub phase: ScanPhase,
    pub status: PhaseStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub detail: Option<String>,
}

/// Everything one scan cycle produced, owned by the orchestrator while it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub domain: String,
    pub status: ScanStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub phases: Vec<PhaseRecord>,
    pub subdomains: SubdomainSet,
    pub open_ports: Vec<OpenPort>,
    pub technologies: Vec<Technology>,
    pub content_urls: UrlSet,
    pub urls: UrlSet,
    pub parameterized_urls: Vec<ParameterizedUrl>,
    pub api_endpoints: Vec<ApiEndpoint>,
    pub fuzz_results: Vec<FuzzResult>,
    pub template_report: TemplateScanReport,
    pub jwt_findings: Vec<JwtFinding>,
    pub failures: Vec<SubtaskFailure>,
    pub error: Option<String>,
}

impl ScanReport {
    pub fn new(scan_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            domain: domain.into(),
            status: ScanStatus::Queued,
            start_time: Utc::now(),
            end_time: None,
            phases: Vec::new(),
            subdomains: SubdomainSet::new(),
            open_ports: Vec::new(),
            technologies: Vec::new(),
            content_urls: UrlSet::new(),
            urls: UrlSet::new(),
            parameterized_urls: Vec::new(),
            api_endpoints: Vec::new(),
            fuzz_results: Vec::new(),
            template_report: TemplateScanReport::default(),
            jwt_findings: Vec::new(),
            failures: Vec::new(),
            error: None,
        }
    }

    pub fn phase(&self, phase: ScanPhase) -> Option<&PhaseRecord> {
        self.phases.iter().find(|r| r.phase == phase)
    }

    pub fn current_phase(&self) -> Option<ScanPhase> {
        self.phases.last().map(|r| r.phase)
    }

    /// Record a status change. A phase keeps one record; re-entering it updates
    /// the existing entry.
    pub fn set_phase(&mut self, phase: ScanPhase, status: PhaseStatus, detail: Option<String>) {
        let now = Utc::now();
        let finished = matches!(status, PhaseStatus::Completed | PhaseStatus::Error).then_some(now);
        match self.phases.iter_mut().find(|r| r.phase == phase) {
            Some(record) => {
                record.status = status;
                record.finished_at = finished;
                if detail.is_some() {
                    record.detail = detail;
                }
            }
            None => self.phases.push(PhaseRecord { phase, status, started_at: now, finished_at: finished, detail }),
        }
    }

    pub fn has_phase_errors(&self) -> bool {
        self.phases.iter().any(|r| r.status == PhaseStatus::Error)
    }

    pub fn absorb(&mut self, failures: Vec<SubtaskFailure>) {
        self.failures.extend(failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serializes_screaming_snake() {
        assert_eq!(serde_json::to_string(&ScanPhase::SubdomainEnum).unwrap(), "\"SUBDOMAIN_ENUM\"");
        assert_eq!(ScanPhase::VulnerabilityScan.to_string(), "VULNERABILITY_SCAN");
    }

    #[test]
    fn test_phases_are_ordered() {
        assert!(ScanPhase::Init < ScanPhase::SubdomainEnum);
        assert!(ScanPhase::Fuzzing < ScanPhase::Reporting);
        assert!(ScanPhase::TechDetection < ScanPhase::ContentDiscovery);
        assert!(ScanPhase::ContentDiscovery < ScanPhase::UrlCollection);
        assert!(ScanPhase::VulnerabilityScan < ScanPhase::JwtAnalysis);
    }

    #[test]
    fn test_set_phase_updates_single_record() {
        let mut report = ScanReport::new("id", "a.test");
        report.set_phase(ScanPhase::Fuzzing, PhaseStatus::Started, None);
        report.set_phase(ScanPhase::Fuzzing, PhaseStatus::InProgress, Some("1/2".into()));
        report.set_phase(ScanPhase::Fuzzing, PhaseStatus::Completed, None);
        assert_eq!(report.phases.len(), 1);
        let record = report.phase(ScanPhase::Fuzzing).unwrap();
        assert_eq!(record.status, PhaseStatus::Completed);
        assert_eq!(record.detail.as_deref(), Some("1/2"));
        assert!(record.finished_at.is_some());
        assert!(!report.has_phase_errors());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ScanStatus::Running.is_terminal());
        assert!(ScanStatus::Cancelled.is_terminal());
        assert_eq!(ScanStatus::CompletedWithErrors.to_string(), "completed_with_errors");
    }
}

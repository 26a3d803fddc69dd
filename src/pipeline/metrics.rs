use chrono::Utc;

use super::state::ScanReport;
use crate::models::ScanMetadata;

pub fn compute_metadata(report: &ScanReport) -> ScanMetadata {
    ScanMetadata {
        scan_id: report.scan_id.clone(),
        domain: report.domain.clone(),
        start_time: report.start_time,
        end_time: report.end_time.unwrap_or_else(Utc::now),
        status: report.status,
        subdomain_count: report.subdomains.len(),
        url_count: report.urls.len(),
        parameter_count: report.parameterized_urls.iter().map(|p| p.parameters.len()).sum(),
        api_endpoint_count: report.api_endpoints.len(),
        vulnerability_count: report.fuzz_results.len(),
        template_finding_count: report.template_report.total(),
        content_url_count: report.content_urls.len(),
        jwt_finding_count: report.jwt_findings.len(),
        failed_subtasks: report.failures.len(),
    }
}

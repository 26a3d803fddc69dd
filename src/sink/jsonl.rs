use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::ResultSink;
use crate::errors::ScanError;
use crate::models::{FuzzResult, JwtFinding, ScanMetadata, TemplateFinding};

const FINDINGS_FILE: &str = "findings.jsonl";
const TEMPLATE_FINDINGS_FILE: &str = "template_findings.jsonl";
const JWT_FINDINGS_FILE: &str = "jwt_findings.jsonl";
const METADATA_FILE: &str = "scan_metadata.json";

/// Writes one directory per scan under `base_dir`: fuzz results, template and
/// token findings as JSON lines, and the metadata record as a single JSON document.
pub struct JsonlSink {
    base_dir: PathBuf,
    // Serializes appends so concurrent records never interleave within a line.
    write_lock: Mutex<()>,
}

#[derive(Serialize)]
struct Entry<'a, T: Serialize> {
    scan_id: &'a str,
    recorded_at: String,
    #[serde(flatten)]
    record: &'a T,
}

impl JsonlSink {
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self, ScanError> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Self { base_dir, write_lock: Mutex::new(()) })
    }

    pub fn scan_dir(&self, scan_id: &str) -> PathBuf {
        self.base_dir.join(scan_id)
    }

    async fn append<T: Serialize>(&self, scan_id: &str, file: &str, record: &T) -> Result<(), ScanError> {
        let entry = Entry { scan_id, recorded_at: Utc::now().to_rfc3339(), record };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let dir = self.scan_dir(scan_id);
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&dir).await?;
        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(file))
            .await?;
        handle.write_all(line.as_bytes()).await?;
        handle.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ResultSink for JsonlSink {
    async fn record_fuzz_result(&self, scan_id: &str, result: &FuzzResult) -> Result<(), ScanError> {
        self.append(scan_id, FINDINGS_FILE, result).await?;
        debug!(scan_id, url = %result.url, parameter = %result.parameter, "Recorded fuzz result");
        Ok(())
    }

    async fn record_template_findings(
        &self,
        scan_id: &str,
        host: &str,
        findings: &[TemplateFinding],
    ) -> Result<(), ScanError> {
        for finding in findings {
            self.append(scan_id, TEMPLATE_FINDINGS_FILE, finding).await?;
        }
        debug!(scan_id, host, count = findings.len(), "Recorded template findings");
        Ok(())
    }

    async fn record_jwt_findings(&self, scan_id: &str, findings: &[JwtFinding]) -> Result<(), ScanError> {
        for finding in findings {
            self.append(scan_id, JWT_FINDINGS_FILE, finding).await?;
        }
        debug!(scan_id, count = findings.len(), "Recorded JWT findings");
        Ok(())
    }

    async fn record_scan_metadata(&self, metadata: &ScanMetadata) -> Result<(), ScanError> {
        let dir = self.scan_dir(&metadata.scan_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(METADATA_FILE);
        tokio::fs::write(&path, serde_json::to_string_pretty(metadata)?).await?;
        info!(path = %path.display(), "Scan metadata written");
        Ok(())
    }
}

/// Read back a JSON-lines file written by [`JsonlSink`].
pub fn read_jsonl(path: &Path) -> Result<Vec<serde_json::Value>, ScanError> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(ScanError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, Severity, Signal};
    use crate::pipeline::ScanStatus;

    fn result(parameter: &str) -> FuzzResult {
        FuzzResult {
            url: format!("http://a.test/?{}=%27", parameter),
            parameter: parameter.to_string(),
            payload: "'".into(),
            method: HttpMethod::Get,
            similarity: 0.42,
            response_time_ms: 120,
            status_code: 500,
            content_length: 2048,
            reflection_count: 0,
            error_patterns: vec!["database: SQL syntax".into()],
            signals: vec![Signal::LowSimilarity, Signal::StatusChange],
            evidence: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_fuzz_results_append_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path()).await.unwrap();
        sink.record_fuzz_result("scan-1", &result("id")).await.unwrap();
        sink.record_fuzz_result("scan-1", &result("q")).await.unwrap();

        let lines = read_jsonl(&dir.path().join("scan-1").join(FINDINGS_FILE)).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["scan_id"], "scan-1");
        assert_eq!(lines[0]["parameter"], "id");
        assert_eq!(lines[1]["method"], "GET");
        assert_eq!(lines[1]["signals"][1], "status_change");
    }

    #[tokio::test]
    async fn test_template_findings_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path()).await.unwrap();
        let finding = TemplateFinding {
            template: "exposed-panel".into(),
            severity: Severity::Medium,
            name: "Exposed panel".into(),
            matched: "https://a.test/admin".into(),
            description: None,
            tags: vec!["panel".into()],
        };
        sink.record_template_findings("scan-2", "a.test", &[finding]).await.unwrap();

        let now = Utc::now();
        let metadata = ScanMetadata {
            scan_id: "scan-2".into(),
            domain: "a.test".into(),
            start_time: now,
            end_time: now,
            status: ScanStatus::Completed,
            subdomain_count: 1,
            url_count: 3,
            parameter_count: 1,
            api_endpoint_count: 0,
            vulnerability_count: 0,
            template_finding_count: 1,
            content_url_count: 0,
            jwt_finding_count: 0,
            failed_subtasks: 0,
        };
        sink.record_scan_metadata(&metadata).await.unwrap();

        let lines = read_jsonl(&dir.path().join("scan-2").join(TEMPLATE_FINDINGS_FILE)).unwrap();
        assert_eq!(lines[0]["template"], "exposed-panel");
        let written = std::fs::read_to_string(dir.path().join("scan-2").join(METADATA_FILE)).unwrap();
        let parsed: ScanMetadata = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, metadata);
    }
}

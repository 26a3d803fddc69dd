pub mod jsonl;

use async_trait::async_trait;

use crate::errors::ScanError;
use crate::models::{FuzzResult, JwtFinding, ScanMetadata, TemplateFinding};

pub use jsonl::JsonlSink;

/// Persistence boundary. The engine only writes through it, never reads back.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record_fuzz_result(&self, scan_id: &str, result: &FuzzResult) -> Result<(), ScanError>;

    async fn record_template_findings(
        &self,
        scan_id: &str,
        host: &str,
        findings: &[TemplateFinding],
    ) -> Result<(), ScanError>;

    async fn record_jwt_findings(&self, scan_id: &str, findings: &[JwtFinding]) -> Result<(), ScanError>;

    async fn record_scan_metadata(&self, metadata: &ScanMetadata) -> Result<(), ScanError>;
}

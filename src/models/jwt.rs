use serde::{Deserialize, Serialize};

use super::finding::Severity;

/// One weakness found in a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtIssue {
    /// `alg_none`, `empty_signature`, `missing_expiry` or `jwt_tool`.
    pub check: String,
    pub severity: Severity,
    pub detail: String,
}

impl JwtIssue {
    pub fn new(check: &str, severity: Severity, detail: impl Into<String>) -> Self {
        Self { check: check.to_string(), severity, detail: detail.into() }
    }
}

/// A token with at least one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtFinding {
    /// Leading characters only; the full token is not persisted.
    pub token_preview: String,
    /// URL whose response or query carried the token.
    pub source: String,
    pub algorithm: Option<String>,
    /// Most severe issue.
    pub severity: Severity,
    pub issues: Vec<JwtIssue>,
}

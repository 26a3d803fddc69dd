use std::sync::Arc;

use data_encoding::BASE64URL_NOPAD;
use serde_json::Value;
use tracing::debug;

use crate::errors::ScanError;
use crate::models::{JwtFinding, JwtIssue, Severity};
use crate::tools::registry::jwt_tool_command;
use crate::tools::{Tool, ToolRunner};

const PREVIEW_CHARS: usize = 24;

/// Header and claims of a token, or `None` when it does not decode as a JWT.
pub fn decode_token(token: &str) -> Option<(Value, Value)> {
    let mut segments = token.split('.');
    let header = decode_segment(segments.next()?)?;
    let claims = decode_segment(segments.next()?)?;
    Some((header, claims))
}

fn decode_segment(segment: &str) -> Option<Value> {
    let bytes = BASE64URL_NOPAD.decode(segment.trim_end_matches('=').as_bytes()).ok()?;
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    value.is_object().then_some(value)
}

/// Checks that need no network access.
pub fn inspect_token(token: &str) -> Option<(Option<String>, Vec<JwtIssue>)> {
    let (header, claims) = decode_token(token)?;
    let algorithm = header.get("alg").and_then(Value::as_str).map(str::to_string);
    let signature = token.splitn(3, '.').nth(2).unwrap_or("");

    let mut issues = Vec::new();
    if algorithm.as_deref().map_or(false, |alg| alg.eq_ignore_ascii_case("none")) {
        issues.push(JwtIssue::new("alg_none", Severity::High, "token declares alg none"));
    } else if signature.is_empty() {
        issues.push(JwtIssue::new("empty_signature", Severity::High, "signed algorithm with an empty signature"));
    }
    if claims.get("exp").is_none() {
        issues.push(JwtIssue::new("missing_expiry", Severity::Low, "no exp claim"));
    }
    Some((algorithm, issues))
}

/// Lines of jwt_tool output that report a vulnerable result.
pub fn jwt_tool_issues(stdout: &str) -> Vec<JwtIssue> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.to_ascii_lowercase().contains("vulnerab"))
        .map(|line| JwtIssue::new("jwt_tool", Severity::High, line))
        .collect()
}

/// Offline token checks plus a jwt_tool playbook run against the source URL.
pub struct JwtAnalyzer {
    runner: Arc<ToolRunner>,
}

impl JwtAnalyzer {
    pub fn new(runner: Arc<ToolRunner>) -> Self {
        Self { runner }
    }

    /// `Ok(None)` when the candidate is not a JWT or shows no issue.
    pub async fn analyze(&self, token: &str, source: &str) -> Result<Option<JwtFinding>, ScanError> {
        let Some((algorithm, mut issues)) = inspect_token(token) else {
            debug!(source, "Skipping undecodable token candidate");
            return Ok(None);
        };

        let output = self.runner.run_lenient(Tool::JwtTool, &jwt_tool_command(token, source), false).await?;
        issues.extend(jwt_tool_issues(&output.stdout));

        let Some(severity) = issues.iter().map(|i| i.severity).min() else {
            return Ok(None);
        };
        Ok(Some(JwtFinding {
            token_preview: token.chars().take(PREVIEW_CHARS).collect(),
            source: source.to_string(),
            algorithm,
            severity,
            issues,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(header: &str, claims: &str, signature: &str) -> String {
        format!(
            "{}.{}.{}",
            BASE64URL_NOPAD.encode(header.as_bytes()),
            BASE64URL_NOPAD.encode(claims.as_bytes()),
            signature
        )
    }

    #[test]
    fn test_alg_none_and_missing_expiry() {
        let (alg, issues) = inspect_token(&token(r#"{"alg":"None"}"#, r#"{"sub":"1"}"#, "")).unwrap();
        assert_eq!(alg.as_deref(), Some("None"));
        let checks: Vec<_> = issues.iter().map(|i| i.check.as_str()).collect();
        assert_eq!(checks, vec!["alg_none", "missing_expiry"]);
    }

    #[test]
    fn test_well_formed_token_has_no_offline_issues() {
        let (alg, issues) = inspect_token(&token(r#"{"alg":"RS256"}"#, r#"{"exp":1900000000}"#, "c2ln")).unwrap();
        assert_eq!(alg.as_deref(), Some("RS256"));
        assert!(issues.is_empty());
    }

    #[test]
    fn test_empty_signature_on_signed_algorithm() {
        let (_, issues) = inspect_token(&token(r#"{"alg":"HS256"}"#, r#"{"exp":1}"#, "")).unwrap();
        assert_eq!(issues[0].check, "empty_signature");
    }

    #[test]
    fn test_undecodable_candidates_are_ignored() {
        assert!(inspect_token("eyJnotbase64!.eyJx.y").is_none());
        assert!(decode_token("eyJhbGciOiJIUzI1NiJ9").is_none());
    }

    #[test]
    fn test_jwt_tool_vulnerable_lines() {
        let stdout = "Decoded token values:\n[+] EXPLOIT: \"alg\":\"none\" - VULNERABLE!\n  exp = 1900000000\n";
        let issues = jwt_tool_issues(stdout);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::High);
        assert!(issues[0].detail.contains("VULNERABLE"));
    }
}

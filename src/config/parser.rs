use std::path::Path;

use tracing::warn;

use super::schema::CONFIG_SCHEMA;
use super::types::{ReconConfig, MAX_RETRY_DELAY_SECS};
use crate::errors::ScanError;

const MAX_CONFIG_BYTES: u64 = 1_048_576;
const MAX_BACKOFF_FACTOR: f64 = 100.0;

pub async fn parse_config(path: &Path) -> Result<ReconConfig, ScanError> {
    if !path.exists() {
        return Err(ScanError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(ScanError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<ReconConfig, ScanError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    // An empty document parses to null; treat it as all defaults.
    if yaml.is_null() {
        return Ok(ReconConfig::default());
    }

    validate_schema(&yaml)?;

    let config: ReconConfig = serde_yaml::from_value(yaml)?;
    validate_semantics(&config)?;
    Ok(config)
}

/// Validate config against the JSON schema. Violations are logged, not fatal.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), ScanError> {
    let json_value = serde_json::to_value(yaml)
        .map_err(|e| ScanError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| ScanError::Config(format!("Schema compilation error: {}", e)))?;

    if let Err(errors) = compiled.validate(&json_value) {
        for e in errors {
            warn!(validation_error = %e, path = %e.instance_path, "Config schema warning");
        }
    }

    Ok(())
}

/// Reject configurations the engine cannot run with.
pub fn validate_semantics(config: &ReconConfig) -> Result<(), ScanError> {
    let scan = &config.scan;
    if scan.max_concurrent_requests == 0 {
        return Err(ScanError::Config("scan.max_concurrent_requests must be at least 1".into()));
    }
    if scan.request_timeout_secs == 0 || scan.probe_timeout_secs == 0 {
        return Err(ScanError::Config("scan timeouts must be greater than zero".into()));
    }
    if scan.probe_concurrency == 0 {
        return Err(ScanError::Config("scan.probe_concurrency must be at least 1".into()));
    }

    let fuzz = &config.fuzz;
    if !(0.0..=1.0).contains(&fuzz.similarity_threshold) {
        return Err(ScanError::Config(format!(
            "fuzz.similarity_threshold must be within [0, 1], got {}",
            fuzz.similarity_threshold
        )));
    }
    if fuzz.concurrency == 0 || fuzz.parameter_concurrency == 0 {
        return Err(ScanError::Config("fuzz concurrency settings must be at least 1".into()));
    }

    let resilience = &config.resilience;
    for (field, value) in [
        ("resilience.retry_delay_secs", resilience.retry_delay_secs),
        ("resilience.max_delay_secs", resilience.max_delay_secs),
        ("resilience.backoff_factor", resilience.backoff_factor),
    ] {
        if !value.is_finite() {
            return Err(ScanError::Config(format!("{} must be a finite number, got {}", field, value)));
        }
    }
    if resilience.max_delay_secs > MAX_RETRY_DELAY_SECS {
        return Err(ScanError::Config(format!(
            "resilience.max_delay_secs must be at most {}, got {}",
            MAX_RETRY_DELAY_SECS, resilience.max_delay_secs
        )));
    }
    if !(1.0..=MAX_BACKOFF_FACTOR).contains(&resilience.backoff_factor) {
        return Err(ScanError::Config(format!(
            "resilience.backoff_factor must be within [1, {}]",
            MAX_BACKOFF_FACTOR
        )));
    }
    if resilience.retry_delay_secs < 0.0 || resilience.retry_delay_secs > resilience.max_delay_secs {
        return Err(ScanError::Config(
            "resilience.retry_delay_secs must be between 0 and max_delay_secs".into(),
        ));
    }
    if resilience.breaker_failure_threshold == 0 {
        return Err(ScanError::Config("resilience.breaker_failure_threshold must be at least 1".into()));
    }

    let tools = &config.tools;
    if tools.timeout_secs == 0 {
        return Err(ScanError::Config("tools.timeout_secs must be greater than zero".into()));
    }
    if tools.max_concurrent == 0 {
        return Err(ScanError::Config("tools.max_concurrent must be at least 1".into()));
    }
    if tools.subdomain_sources.is_empty() {
        return Err(ScanError::Config("tools.subdomain_sources must not be empty".into()));
    }
    if tools.url_sources.is_empty() {
        return Err(ScanError::Config("tools.url_sources must not be empty".into()));
    }
    if config.scan.enable_content_discovery {
        if tools.content_sources.is_empty() {
            return Err(ScanError::Config("tools.content_sources must not be empty".into()));
        }
        if tools.crawl_depth == 0 {
            return Err(ScanError::Config("tools.crawl_depth must be at least 1".into()));
        }
        if let Some(source) = tools.content_sources.iter().find(|s| s.needs_wordlist()) {
            if tools.wordlist.is_none() {
                return Err(ScanError::Config(format!("{} needs tools.wordlist", source.tool())));
            }
        }
    }
    if config.scan.enable_jwt_analysis && tools.jwt_max_tokens == 0 {
        return Err(ScanError::Config("tools.jwt_max_tokens must be at least 1".into()));
    }

    if let Some(proxy) = &config.proxy.url {
        let parsed = url::Url::parse(proxy)
            .map_err(|e| ScanError::Config(format!("Invalid proxy URL '{}': {}", proxy, e)))?;
        if parsed.host_str().is_none() {
            return Err(ScanError::Config(format!("Proxy URL '{}' has no host", proxy)));
        }
    }

    if tools.nuclei_templates.is_empty() && config.scan.enable_vulnerability_scan {
        warn!("Vulnerability scan enabled but no nuclei templates configured");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ContentSource;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_config_str("").unwrap();
        assert_eq!(config.scan.max_concurrent_requests, 50);
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let err = parse_config_str("fuzz:\n  similarity_threshold: 1.5\n").unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = parse_config_str("scan:\n  max_concurrent_requests: 0\n").unwrap_err();
        assert!(err.to_string().contains("max_concurrent_requests"));
    }

    #[test]
    fn test_rejects_bad_proxy() {
        let err = parse_config_str("proxy:\n  url: \"not a url\"\n").unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_rejects_initial_delay_above_max() {
        let err = parse_config_str("resilience:\n  retry_delay_secs: 90\n  max_delay_secs: 10\n").unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_rejects_empty_sources() {
        assert!(parse_config_str("tools:\n  url_sources: []\n").is_err());
    }

    #[test]
    fn test_gobuster_requires_wordlist_when_enabled() {
        let doc = "scan:\n  enable_content_discovery: true\ntools:\n  content_sources: [katana, gobuster]\n";
        let err = parse_config_str(doc).unwrap_err();
        assert!(err.to_string().contains("gobuster needs tools.wordlist"), "{}", err);

        let with_list = format!("{}  wordlist: /usr/share/wordlists/common.txt\n", doc);
        let config = parse_config_str(&with_list).unwrap();
        assert_eq!(config.tools.content_sources, vec![ContentSource::Katana, ContentSource::Gobuster]);

        // Disabled phases are not held to their settings.
        assert!(parse_config_str("tools:\n  content_sources: [gobuster]\n").is_ok());
    }

    #[test]
    fn test_accepts_proxy_and_overrides() {
        let config = parse_config_str(
            "proxy:\n  url: http://127.0.0.1:8080\nresilience:\n  backoff_strategy: fibonacci\n",
        )
        .unwrap();
        assert_eq!(config.proxy.url.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(config.resilience.backoff_strategy, crate::errors::BackoffStrategy::Fibonacci);
    }

    #[test]
    fn test_malformed_yaml_is_config_class_error() {
        let err = parse_config_str("scan: [unclosed").unwrap_err();
        assert!(err.classify().is_fatal());
    }

    #[tokio::test]
    async fn test_parse_config_missing_file() {
        let err = parse_config(Path::new("/nonexistent/reconpro.yaml")).await.unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[tokio::test]
    async fn test_parse_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output:\n  directory: /tmp/recon-out").unwrap();
        let config = parse_config(file.path()).await.unwrap();
        assert_eq!(config.output.directory, std::path::PathBuf::from("/tmp/recon-out"));
    }

    #[test]
    fn test_non_finite_and_huge_delays_rejected() {
        for doc in [
            "resilience:\n  max_delay_secs: .inf\n",
            "resilience:\n  max_delay_secs: 1.0e300\n",
            "resilience:\n  retry_delay_secs: .nan\n",
            "resilience:\n  backoff_factor: .nan\n",
            "resilience:\n  backoff_factor: 1.0e300\n",
        ] {
            let err = parse_config_str(doc).unwrap_err();
            assert!(matches!(err, ScanError::Config(_)), "{} gave {:?}", doc, err);
        }
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let err = parse_config_str("fuzz:\n  similarity_threshold: .nan\n").unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_retry_policy_never_panics_on_unvalidated_values() {
        let mut config = ReconConfig::default();
        config.resilience.max_delay_secs = 1.0e300;
        config.resilience.retry_delay_secs = f64::NAN;
        let policy = config.retry_policy();
        assert_eq!(policy.max_delay, std::time::Duration::from_secs(86_400));
        assert_eq!(policy.initial_delay, std::time::Duration::ZERO);
    }
}

use reconpro::config::{parse_config, parse_config_str, validate_semantics, ReconConfig};
use reconpro::errors::{BackoffStrategy, ScanError};
use reconpro::tools::{SubdomainSource, UrlSource};

#[tokio::test]
async fn test_parse_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recon.yaml");
    std::fs::write(
        &path,
        r#"
scan:
  max_concurrent_requests: 25
  enable_port_scan: true
proxy:
  url: http://127.0.0.1:8080
resilience:
  max_retries: 5
  backoff_strategy: linear
tools:
  subdomain_sources: [subfinder, amass]
  url_sources: [waybackurls]
fuzz:
  similarity_threshold: 0.7
output:
  directory: ./out
"#,
    )
    .unwrap();

    let config = parse_config(&path).await.unwrap();
    assert_eq!(config.scan.max_concurrent_requests, 25);
    assert!(config.scan.enable_port_scan);
    assert_eq!(config.proxy.url.as_deref(), Some("http://127.0.0.1:8080"));
    assert_eq!(config.resilience.max_retries, 5);
    assert_eq!(config.resilience.backoff_strategy, BackoffStrategy::Linear);
    assert_eq!(config.tools.subdomain_sources, vec![SubdomainSource::Subfinder, SubdomainSource::Amass]);
    assert_eq!(config.tools.url_sources, vec![UrlSource::Waybackurls]);
    assert_eq!(config.fuzz.similarity_threshold, 0.7);
    // Untouched sections keep their defaults.
    assert_eq!(config.fuzz.concurrency, 10);
    assert_eq!(config.retry_policy().max_retries, 5);
}

#[tokio::test]
async fn test_missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = parse_config(&dir.path().join("absent.yaml")).await.unwrap_err();
    assert!(matches!(err, ScanError::Config(_)));
}

#[test]
fn test_out_of_range_threshold_rejected() {
    let err = parse_config_str("fuzz:\n  similarity_threshold: 1.5\n").unwrap_err();
    assert!(matches!(err, ScanError::Config(msg) if msg.contains("similarity_threshold")));
}

#[test]
fn test_empty_document_is_default() {
    let config = parse_config_str("").unwrap();
    assert_eq!(config.scan.max_concurrent_requests, ReconConfig::default().scan.max_concurrent_requests);
    assert!(validate_semantics(&config).is_ok());
}

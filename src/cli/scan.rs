use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::progress::ScanProgress;
use crate::cli::commands::ScanArgs;
use crate::config::{self, ReconConfig};
use crate::errors::ScanError;
use crate::pipeline::{ScanEvent, ScanOrchestrator, ScanReport, ScanStatus};
use crate::sink::{JsonlSink, ResultSink};

pub async fn handle_scan(args: ScanArgs, quiet: bool) -> Result<(), ScanError> {
    let mut config = match &args.config {
        Some(path) => config::parse_config(&PathBuf::from(path)).await?,
        None => ReconConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config::validate_semantics(&config)?;

    let sink: Arc<dyn ResultSink> = Arc::new(JsonlSink::new(&config.output.directory).await?);

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling scan");
            ctrl_c.cancel();
        }
    });

    let mut cycle = 1u64;
    loop {
        info!(domain = %args.domain, cycle, "Starting scan cycle");
        let report = run_cycle(&config, &args.domain, sink.clone(), shutdown.child_token(), quiet).await?;
        if !quiet {
            print_summary(&report, &config.output.directory);
        }

        let Some(interval) = args.interval else { break };
        if report.status == ScanStatus::Cancelled || shutdown.is_cancelled() {
            break;
        }
        info!(seconds = interval, "Waiting for next scan cycle");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
            _ = shutdown.cancelled() => break,
        }
        cycle += 1;
    }
    Ok(())
}

fn apply_overrides(config: &mut ReconConfig, args: &ScanArgs) {
    if let Some(output) = &args.output {
        config.output.directory = PathBuf::from(output);
    }
    if let Some(concurrency) = args.concurrency {
        config.scan.max_concurrent_requests = concurrency;
    }
    if let Some(proxy) = &args.proxy {
        config.proxy.url = Some(proxy.clone());
    }
    if args.insecure {
        config.scan.verify_tls = false;
    }
    if args.port_scan {
        config.scan.enable_port_scan = true;
    }
    if args.tech_detect {
        config.scan.enable_tech_detection = true;
    }
    if args.content_discovery {
        config.scan.enable_content_discovery = true;
    }
    if args.jwt {
        config.scan.enable_jwt_analysis = true;
    }
}

async fn run_cycle(
    config: &ReconConfig,
    domain: &str,
    sink: Arc<dyn ResultSink>,
    cancel: CancellationToken,
    quiet: bool,
) -> Result<ScanReport, ScanError> {
    // Each cycle gets fresh engines: a finished scan closes its HTTP gate.
    let mut orchestrator = ScanOrchestrator::new(config.clone(), sink, cancel).await?;

    let progress_task = if quiet {
        None
    } else {
        let (tx, mut rx) = mpsc::unbounded_channel::<ScanEvent>();
        orchestrator = orchestrator.with_observer(Arc::new(tx));
        let mut progress = ScanProgress::new(&config.scan);
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                progress.handle_event(&event);
            }
        }))
    };

    let result = orchestrator.run(domain).await;
    // Dropping the orchestrator drops the sender and ends the progress task.
    drop(orchestrator);
    if let Some(task) = progress_task {
        let _ = task.await;
    }
    result
}

fn print_summary(report: &ScanReport, output_dir: &std::path::Path) {
    let status = match report.status {
        ScanStatus::Completed => style(report.status.to_string()).green(),
        ScanStatus::Cancelled | ScanStatus::Failed => style(report.status.to_string()).red(),
        _ => style(report.status.to_string()).yellow(),
    };
    println!();
    println!("  {} {}", style("Scan").bold(), report.scan_id);
    println!("  status             {}", status);
    println!("  subdomains         {}", report.subdomains.len());
    println!("  urls               {}", report.urls.len());
    println!("  parameterized urls {}", report.parameterized_urls.len());
    println!("  api endpoints      {}", report.api_endpoints.len());
    println!("  vulnerabilities    {}", report.fuzz_results.len());
    println!("  template findings  {}", report.template_report.total());
    if !report.jwt_findings.is_empty() {
        println!("  jwt findings       {}", report.jwt_findings.len());
    }
    if !report.failures.is_empty() {
        println!("  failed subtasks    {}", report.failures.len());
    }
    println!("  results            {}", output_dir.join(&report.scan_id).display());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ScanArgs {
        ScanArgs {
            domain: "example.com".into(),
            config: None,
            output: Some("/tmp/out".into()),
            concurrency: Some(7),
            proxy: Some("http://127.0.0.1:8080".into()),
            insecure: true,
            port_scan: true,
            tech_detect: false,
            content_discovery: false,
            jwt: true,
            interval: None,
        }
    }

    #[test]
    fn test_cli_flags_override_config() {
        let mut config = ReconConfig::default();
        apply_overrides(&mut config, &args());
        assert_eq!(config.output.directory, PathBuf::from("/tmp/out"));
        assert_eq!(config.scan.max_concurrent_requests, 7);
        assert_eq!(config.proxy.url.as_deref(), Some("http://127.0.0.1:8080"));
        assert!(!config.scan.verify_tls);
        assert!(config.scan.enable_port_scan);
        assert!(!config.scan.enable_tech_detection);
        assert!(!config.scan.enable_content_discovery);
        assert!(config.scan.enable_jwt_analysis);
        assert!(config::validate_semantics(&config).is_ok());
    }

    #[test]
    fn test_absent_flags_keep_file_values() {
        let mut config = ReconConfig::default();
        config.scan.enable_tech_detection = true;
        let mut bare = args();
        bare.output = None;
        bare.concurrency = None;
        bare.proxy = None;
        bare.insecure = false;
        bare.port_scan = false;
        apply_overrides(&mut config, &bare);
        assert!(config.scan.verify_tls);
        assert!(config.scan.enable_tech_detection);
        assert_eq!(config.scan.max_concurrent_requests, 50);
    }
}

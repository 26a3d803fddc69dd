use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reconpro", version, about = "Web reconnaissance and parameter fuzzing engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a domain: discovery, fuzzing and template scanning
    Scan(ScanArgs),
    /// Report which external tools are installed
    CheckTools(CheckToolsArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    /// Root domain to scan
    #[arg(short, long)]
    pub domain: String,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output directory for results
    #[arg(short, long)]
    pub output: Option<String>,

    /// Max concurrent HTTP requests
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Proxy URL for HTTP requests and template scans
    #[arg(long)]
    pub proxy: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Run the port scan phase
    #[arg(long)]
    pub port_scan: bool,

    /// Run the technology detection phase
    #[arg(long)]
    pub tech_detect: bool,

    /// Crawl and brute-force paths before URL collection
    #[arg(long)]
    pub content_discovery: bool,

    /// Analyze JSON Web Tokens seen during the scan
    #[arg(long)]
    pub jwt: bool,

    /// Repeat the scan every N seconds until interrupted
    #[arg(long)]
    pub interval: Option<u64>,
}

#[derive(Args, Clone)]
pub struct CheckToolsArgs {
    /// YAML configuration file (for bin_dir and enabled phases)
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan_flags() {
        let cli = Cli::parse_from([
            "reconpro", "-vv", "scan", "-d", "example.com", "--concurrency", "20", "--insecure", "--interval", "3600",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.domain, "example.com");
                assert_eq!(args.concurrency, Some(20));
                assert!(args.insecure);
                assert!(!args.port_scan);
                assert_eq!(args.interval, Some(3600));
            }
            _ => panic!("expected scan"),
        }
    }
}

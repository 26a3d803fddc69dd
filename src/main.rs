use clap::Parser;
use tracing_subscriber::EnvFilter;

use reconpro::cli::{self, Commands};
use reconpro::config;
use reconpro::errors::ScanError;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(!cli.no_color)
            .with_writer(std::io::stderr)
            .init();
    }
    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let result = match cli.command {
        Commands::Scan(args) => cli::scan::handle_scan(args, cli.quiet).await,
        Commands::CheckTools(args) => cli::tools::handle_check_tools(args).await,
        Commands::Validate(args) => handle_validate(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let exit_code = match &e {
            ScanError::Config(_) | ScanError::InvalidArgument(_) => 2,
            ScanError::ToolNotFound(_) => 3,
            _ => 1,
        };
        std::process::exit(exit_code);
    }
}

async fn handle_validate(args: cli::commands::ValidateArgs) -> Result<(), ScanError> {
    let path = std::path::PathBuf::from(&args.config);
    let parsed = config::parse_config(&path).await?;
    config::validate_semantics(&parsed)?;
    println!("Configuration is valid: {}", args.config);
    Ok(())
}

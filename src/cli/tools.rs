use std::path::PathBuf;

use console::style;

use crate::cli::commands::CheckToolsArgs;
use crate::config::{self, ReconConfig};
use crate::errors::ScanError;
use crate::pipeline::required_tools;
use crate::tools::{Tool, ToolRunner};

/// Print every known tool with its resolved path. Fails only when a tool the
/// configured phases need is missing.
pub async fn handle_check_tools(args: CheckToolsArgs) -> Result<(), ScanError> {
    let config = match &args.config {
        Some(path) => config::parse_config(&PathBuf::from(path)).await?,
        None => ReconConfig::default(),
    };
    let runner = ToolRunner::from_config(&config);
    let required = required_tools(&config);

    println!();
    println!("  {}", style("External tools").bold());
    let mut missing_required = Vec::new();
    for (tool, path) in runner.availability(&Tool::ALL) {
        let needed = required.contains(&tool);
        let marker = if needed { style("required").cyan() } else { style("optional").dim() };
        match path {
            Some(path) => println!("  {} {:<12} {:<9} {}", style("✓").green(), tool, marker, path.display()),
            None => {
                println!("  {} {:<12} {:<9} {}", style("✗").red(), tool, marker, style("not found").red());
                if needed {
                    missing_required.push(tool.binary());
                }
            }
        }
    }
    println!();

    if missing_required.is_empty() {
        Ok(())
    } else {
        Err(ScanError::ToolNotFound(missing_required.join(", ")))
    }
}

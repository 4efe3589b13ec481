//! Describe command implementation
//!
//! Prints a sorter's summary and parameter defaults.

use anyhow::{Context, Result};
use colored::Colorize;
use std::process::ExitCode;

use sortkit_launch::Registry;

/// Run the describe command
///
/// # Arguments
/// * `registry` - Registry to look the sorter up in
/// * `name` - Sorter identifier
/// * `json_output` - Print the descriptor summary as JSON
pub fn run(registry: &Registry, name: &str, json_output: bool) -> Result<ExitCode> {
    let info = registry.describe(name)?;
    if json_output {
        let json = serde_json::to_string_pretty(&info).context("serializing descriptor")?;
        println!("{}", json);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} {}", "Sorter:".cyan().bold(), info.name);
    if !info.description.is_empty() {
        println!("{}", info.description);
    }
    println!();
    let installed = if info.installed {
        "yes".green()
    } else {
        "no".yellow()
    };
    println!("{} {}", "Installed:".bold(), installed);
    if !info.installed && !info.installation_message.is_empty() {
        println!("  {}", info.installation_message.dimmed());
    }
    if let Some(image) = &info.container_image {
        println!("{} {}", "Image:".bold(), image);
    }
    let pools: Vec<&str> = info
        .compatibility
        .supported()
        .iter()
        .map(|p| p.as_str())
        .collect();
    println!("{} {}", "Parallel pools:".bold(), pools.join(", "));
    println!();

    println!("{}", "Parameters:".bold());
    for spec in info.params.iter() {
        println!(
            "  {} = {}  {}",
            spec.name().green(),
            spec.default_value(),
            spec.description().dimmed()
        );
    }
    Ok(ExitCode::SUCCESS)
}

//! Listing commands: available, installed and versions.

use anyhow::Result;
use colored::Colorize;
use std::process::ExitCode;

use sortkit_launch::Registry;

/// Prints every registered sorter, marking installed ones.
pub fn run_available(registry: &Registry) -> Result<ExitCode> {
    println!("{}", "Available sorters:".cyan().bold());
    for descriptor in registry.iter() {
        let marker = if descriptor.is_installed() {
            "ok".green()
        } else {
            "--".dimmed()
        };
        println!("  {} {}", marker, descriptor.name());
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints installed sorters, one per line.
pub fn run_installed(registry: &Registry) -> Result<ExitCode> {
    let installed = registry.list_installed();
    if installed.is_empty() {
        println!("{}", "No sorters installed.".yellow());
        return Ok(ExitCode::SUCCESS);
    }
    for name in installed {
        println!("{}", name);
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints the version of each installed sorter.
pub fn run_versions(registry: &Registry) -> Result<ExitCode> {
    for (name, version) in registry.versions() {
        println!("{}: {}", name.bold(), version);
    }
    Ok(ExitCode::SUCCESS)
}

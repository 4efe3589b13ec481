//! sortkit CLI - Command-line interface for running spike sorters
//!
//! This binary lists and describes the built-in sorters, runs them on
//! recordings, and acts as the job worker inside containers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use sortkit_cli::commands;
use sortkit_cli::commands::run::RunArgs;
use sortkit_cli::logging;
use sortkit_launch::default_dispatcher;

/// sortkit - Spike sorter orchestration
#[derive(Parser)]
#[command(name = "sortkit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log debug events (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every built-in sorter
    Available,

    /// List sorters installed on this host
    Installed,

    /// Print the version of each installed sorter
    Versions,

    /// Show a sorter's description and parameters
    Describe {
        /// Sorter identifier
        sorter: String,

        /// Output the descriptor as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a sorter on a recording
    Run {
        /// Sorter identifier
        sorter: String,

        /// Recording description (JSON recording dump)
        #[arg(short, long)]
        recording: PathBuf,

        /// Output folder (default: <sorter>_output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Parameter override as name=value (repeatable)
        #[arg(short, long = "param")]
        param: Vec<String>,

        /// Channel property to partition the recording by
        #[arg(long)]
        grouping: Option<String>,

        /// Run partitions in parallel
        #[arg(long)]
        parallel: bool,

        /// Number of parallel workers (default: all cores)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Worker pool for parallel partitions
        #[arg(long, value_parser = ["threads", "tokio", "processes"])]
        pool: Option<String>,

        /// Run inside the sorter's docker image
        #[arg(long)]
        docker: bool,

        /// Record failures instead of aborting
        #[arg(long)]
        keep_going: bool,

        /// Delete the output folder after a successful run
        #[arg(long)]
        delete_output: bool,
    },

    /// Execute a job file (worker entry point)
    RunJob {
        /// Path to job.json
        job: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let dispatcher = default_dispatcher();
    let registry = dispatcher.registry();

    let result = match cli.command {
        Commands::Available => commands::list::run_available(registry),
        Commands::Installed => commands::list::run_installed(registry),
        Commands::Versions => commands::list::run_versions(registry),
        Commands::Describe { sorter, json } => commands::describe::run(registry, &sorter, json),
        Commands::Run {
            sorter,
            recording,
            output,
            param,
            grouping,
            parallel,
            jobs,
            pool,
            docker,
            keep_going,
            delete_output,
        } => commands::run::run(
            dispatcher,
            &RunArgs {
                sorter,
                recording,
                output,
                params: param,
                grouping,
                parallel,
                jobs,
                pool,
                docker,
                keep_going,
                delete_output,
            },
        ),
        Commands::RunJob { job } => commands::run_job::run(dispatcher, &job),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "sortkit",
            "run",
            "mountainsort4",
            "--recording",
            "rec.json",
            "-p",
            "detect_threshold=4",
            "-p",
            "curation=true",
            "--grouping",
            "group",
            "--parallel",
            "--pool",
            "threads",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                sorter,
                param,
                pool,
                parallel,
                ..
            } => {
                assert_eq!(sorter, "mountainsort4");
                assert_eq!(param, vec!["detect_threshold=4", "curation=true"]);
                assert_eq!(pool.as_deref(), Some("threads"));
                assert!(parallel);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_pool() {
        assert!(Cli::try_parse_from([
            "sortkit",
            "run",
            "klusta",
            "--recording",
            "r.json",
            "--pool",
            "gpu"
        ])
        .is_err());
    }

    #[test]
    fn test_cli_parses_run_job() {
        let cli = Cli::try_parse_from(["sortkit", "run-job", "/input/job.json"]).unwrap();
        match cli.command {
            Commands::RunJob { job } => assert_eq!(job, PathBuf::from("/input/job.json")),
            _ => panic!("expected run-job command"),
        }
    }
}

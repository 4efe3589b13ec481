//! Run-job command implementation
//!
//! Worker entry point: executes a `job.json` written by a launcher.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitCode;

use sortkit_launch::{run_job_file, Dispatcher};
use sortkit_spec::ExecutionResult;

use super::reporting;

/// Run the run-job command
///
/// # Returns
/// Exit code: 0 if the archive was written, 1 otherwise. Failures are
/// printed to stderr so the launcher can surface them as diagnostics.
pub fn run(dispatcher: &Dispatcher, job_file: &Path) -> Result<ExitCode> {
    let result = run_job_file(job_file, dispatcher.registry(), dispatcher.local())
        .with_context(|| format!("running job {}", job_file.display()))?;
    match result {
        ExecutionResult::Completed(report) => {
            tracing::info!(units = report.sorting.num_units(), "job completed");
            Ok(ExitCode::SUCCESS)
        }
        ExecutionResult::Failed(failure) => {
            reporting::print_failure(&failure);
            Ok(ExitCode::from(1))
        }
    }
}

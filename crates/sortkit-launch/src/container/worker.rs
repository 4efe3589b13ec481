//! Job worker: the receiving side of a [`ContainerJob`].

use std::path::Path;

use sortkit_spec::bridge::write_job_archive;
use sortkit_spec::job::WORKING_DIR;
use sortkit_spec::{ContainerJob, ExecutionRequest, ExecutionResult, SortResult};

use crate::local::LocalLauncher;
use crate::registry::{BackendRef, Registry};

/// Runs a job locally and writes its archive into the job output path.
///
/// The sorter itself runs in `<output_path>/working`. The archive lists any
/// partitions dropped from the result. No archive is written for a failed run.
pub fn execute_job(
    job: &ContainerJob,
    registry: &Registry,
    launcher: &LocalLauncher,
) -> SortResult<ExecutionResult> {
    if !job.verify() {
        tracing::warn!(job = job.short_id(), "job id does not match its content");
    }
    let body = &job.body;
    let descriptor = registry.resolve(BackendRef::Name(&body.backend))?;
    let params = descriptor
        .schema()
        .merge(descriptor.name(), &body.params.to_overrides())?;
    let recording = body.recording.load()?;

    tracing::info!(
        job = job.short_id(),
        backend = %body.backend,
        output = %body.output_path.display(),
        "executing job"
    );
    let request = ExecutionRequest::from_parts(
        body.backend.clone(),
        recording,
        body.output_path.join(WORKING_DIR),
        params,
        body.raise_on_error,
        body.grouping_property.clone(),
        body.parallel,
        body.worker_count,
        body.pool,
    );
    let result = launcher.launch(descriptor, &request)?;

    if let ExecutionResult::Completed(report) = &result {
        write_job_archive(&report.sorting, &report.dropped, &body.output_path)?;
    }
    Ok(result)
}

/// Reads `job.json` from `path` and executes it.
pub fn run_job_file(
    path: &Path,
    registry: &Registry,
    launcher: &LocalLauncher,
) -> SortResult<ExecutionResult> {
    let job = ContainerJob::read_from(path)?;
    execute_job(&job, registry, launcher)
}

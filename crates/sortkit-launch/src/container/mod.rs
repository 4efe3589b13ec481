//! Container execution.
//!
//! The [`ContainerLauncher`] ships a request to a [`JobRuntime`] as a
//! [`ContainerJob`]: the recording's data files are staged into a temporary
//! input folder mounted read-only, the output folder is mounted read-write,
//! and the worker ([`execute_job`]) writes the sorting archive back into the
//! output folder.

mod runtime;
mod worker;

pub use runtime::{
    DockerConfig, DockerRuntime, JobHandle, JobOutcome, JobRuntime, JobSubmission, ProcessConfig,
    ProcessRuntime,
};
pub use worker::{execute_job, run_job_file};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sortkit_spec::bridge::read_job_archive;
use sortkit_spec::{
    BackendDescriptor, BindMount, ContainerJob, ExecutionRequest, ExecutionResult, JobBody,
    PartitionFailure, RecordingDump, SortError, SortResult, Sorting, SortingReport,
};

use crate::lifecycle::prepare_output_folder;
use crate::local::{finish_output, partition_plan, record_failure};

/// Runs requests through a job runtime.
#[derive(Debug, Clone)]
pub struct ContainerLauncher {
    runtime: Arc<dyn JobRuntime>,
}

impl Default for ContainerLauncher {
    fn default() -> Self {
        Self::new(Arc::new(DockerRuntime::default()))
    }
}

impl ContainerLauncher {
    pub fn new(runtime: Arc<dyn JobRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<dyn JobRuntime> {
        &self.runtime
    }

    /// Runs one request in the runtime and blocks until it finishes.
    ///
    /// Fails with `NotTransportable` before touching the filesystem if the
    /// recording has no dump. Grouping and pool selection are checked here
    /// too, so the worker never sees a request it would reject.
    pub fn launch(
        &self,
        descriptor: &BackendDescriptor,
        request: &ExecutionRequest,
    ) -> SortResult<ExecutionResult> {
        let name = descriptor.name();
        let dump = request.recording().dump().ok_or_else(|| {
            SortError::not_transportable(format!(
                "recording for '{}' cannot be serialized into a job",
                name
            ))
        })?;
        let image = descriptor.container_image().ok_or_else(|| {
            SortError::backend_unavailable(name, "no container image for this sorter")
        })?;
        partition_plan(descriptor, request)?;

        let outcome = self.run_job(name, image, dump, request);
        match outcome {
            Ok((sorting, dropped)) => {
                let report = SortingReport {
                    dropped,
                    ..SortingReport::new(sorting, request.output_folder())
                };
                finish_output(request);
                Ok(ExecutionResult::Completed(report))
            }
            Err(err) => record_failure(request, err),
        }
    }

    fn run_job(
        &self,
        name: &str,
        image: &str,
        dump: RecordingDump,
        request: &ExecutionRequest,
    ) -> SortResult<(Sorting, Vec<PartitionFailure>)> {
        prepare_output_folder(request.output_folder())?;
        let output = fs::canonicalize(request.output_folder())
            .map_err(|e| SortError::io(request.output_folder(), e))?;
        let input = job_input_dir()?;

        let (input_alias, output_alias) = self.runtime.path_aliases(input.path(), &output);
        let recording = stage_dump(&dump, input.path(), &input_alias)?;

        let job = ContainerJob::new(JobBody {
            recording,
            backend: name.to_string(),
            input_path: input_alias.clone(),
            output_path: output_alias.clone(),
            params: request.params().clone(),
            grouping_property: request.grouping_property().map(str::to_string),
            parallel: request.parallel(),
            worker_count: request.worker_count(),
            pool: request.pool(),
            raise_on_error: request.raise_on_error(),
        })?;
        let job_file = job.write_to(input.path())?;

        let submission = JobSubmission {
            job,
            job_file,
            image: Some(image.to_string()),
            mounts: vec![
                BindMount::read_only(input.path(), &input_alias),
                BindMount::read_write(&output, &output_alias),
            ],
        };
        let collected = submit_and_collect(self.runtime.as_ref(), submission, &output);

        if let Err(e) = input.close() {
            tracing::warn!(error = %e, "failed to remove job input folder");
        }
        collected
    }
}

/// Creates a temporary job input folder.
pub(crate) fn job_input_dir() -> SortResult<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix("sortkit_job_")
        .tempdir()
        .map_err(|e| SortError::io(std::env::temp_dir(), e))
}

/// Submits a job, waits for it and reads the archive it leaves in `output`.
pub(crate) fn submit_and_collect(
    runtime: &dyn JobRuntime,
    submission: JobSubmission,
    output: &Path,
) -> SortResult<(Sorting, Vec<PartitionFailure>)> {
    let backend = submission.job.body.backend.clone();
    let handle = runtime.submit(submission)?;
    let job_id = handle.job_id().to_string();

    match handle.wait()? {
        JobOutcome::Succeeded => {
            tracing::info!(job = %job_id, runtime = runtime.name(), "job finished");
            read_job_archive(output)
        }
        JobOutcome::Failed {
            message,
            diagnostic,
        } => Err(match diagnostic {
            Some(diagnostic) => SortError::execution_with_diagnostic(backend, message, diagnostic),
            None => SortError::execution(backend, message),
        }),
    }
}

/// Links or copies every data file of `dump` into `input` and returns the
/// dump rewritten to paths under `alias`.
fn stage_dump(dump: &RecordingDump, input: &Path, alias: &Path) -> SortResult<RecordingDump> {
    let mut staged: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
    for (index, source) in dump.data_files().into_iter().enumerate() {
        if staged.contains_key(source) {
            continue;
        }
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording.dat".to_string());
        let staged_name = format!("{}_{}", index, file_name);
        let target = input.join(&staged_name);
        if fs::hard_link(source, &target).is_err() {
            fs::copy(source, &target).map_err(|e| SortError::io(source, e))?;
        }
        tracing::debug!(
            source = %source.display(),
            target = %target.display(),
            "staged recording file"
        );
        staged.insert(source.to_path_buf(), alias.join(staged_name));
    }

    Ok(dump.relocated(&mut |path: &Path| {
        staged
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_path_buf())
    }))
}

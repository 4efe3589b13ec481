//! Local execution, with optional partitioning.

use std::fs;
use std::path::{Component, Path};
use std::sync::Arc;

use sortkit_spec::{
    split_by_property, BackendDescriptor, ContainerJob, ExecutionRequest, ExecutionResult,
    FailureRecord, JobBody, PartitionFailure, Recording, SortError, SortResult, Sorting,
    SortingReport, WorkerPoolKind,
};

use crate::container::{job_input_dir, submit_and_collect, JobRuntime, JobSubmission, ProcessRuntime};
use crate::lifecycle::{prepare_output_folder, run_lifecycle};
use crate::pool::{self, PartitionExecutor, PartitionOutcome, PartitionTask};

/// Runs requests on this host.
///
/// The process runtime carries partitions for the `processes` pool.
#[derive(Debug, Clone)]
pub struct LocalLauncher {
    process_runtime: Arc<dyn JobRuntime>,
}

impl Default for LocalLauncher {
    fn default() -> Self {
        Self::new(Arc::new(ProcessRuntime::default()))
    }
}

impl LocalLauncher {
    pub fn new(process_runtime: Arc<dyn JobRuntime>) -> Self {
        Self { process_runtime }
    }

    pub fn process_runtime(&self) -> &Arc<dyn JobRuntime> {
        &self.process_runtime
    }

    /// Runs a request to an [`ExecutionResult`].
    ///
    /// Grouping and pool selection are validated before anything is written.
    pub fn launch(
        &self,
        descriptor: &BackendDescriptor,
        request: &ExecutionRequest,
    ) -> SortResult<ExecutionResult> {
        tracing::info!(
            backend = descriptor.name(),
            output = %request.output_folder().display(),
            "launching sorter"
        );
        match self.plan(descriptor, request)? {
            None => match run_lifecycle(descriptor, request) {
                Ok(sorting) => {
                    let report = SortingReport::new(sorting, request.output_folder());
                    finish_output(request);
                    Ok(ExecutionResult::Completed(report))
                }
                Err(err) => record_failure(request, err),
            },
            Some(groups) => self.run_partitioned(descriptor, request, groups),
        }
    }

    fn plan(
        &self,
        descriptor: &BackendDescriptor,
        request: &ExecutionRequest,
    ) -> SortResult<Option<Vec<(String, Arc<dyn Recording>)>>> {
        let groups = partition_plan(descriptor, request)?;
        if groups.is_some()
            && request.parallel()
            && request.pool() == WorkerPoolKind::Processes
            && !self.process_runtime.is_available()
        {
            return Err(SortError::backend_unavailable(
                descriptor.name(),
                format!("{} runtime is not available", self.process_runtime.name()),
            ));
        }
        Ok(groups)
    }

    fn run_partitioned(
        &self,
        descriptor: &BackendDescriptor,
        request: &ExecutionRequest,
        groups: Vec<(String, Arc<dyn Recording>)>,
    ) -> SortResult<ExecutionResult> {
        prepare_output_folder(request.output_folder())?;
        let tasks: Vec<PartitionTask> = groups
            .into_iter()
            .map(|(key, recording)| PartitionTask {
                request: request.for_partition(&key, recording),
                key,
            })
            .collect();

        tracing::info!(
            backend = descriptor.name(),
            partitions = tasks.len(),
            parallel = request.parallel(),
            pool = request.pool().as_str(),
            "running partitions"
        );

        let abort = request.raise_on_error();
        let outcomes = if request.parallel() {
            let workers = request.worker_count().resolve(tasks.len());
            let executor = match request.pool() {
                WorkerPoolKind::Processes => process_executor(Arc::clone(&self.process_runtime)),
                WorkerPoolKind::Threads | WorkerPoolKind::Tokio => {
                    lifecycle_executor(descriptor.clone())
                }
            };
            pool::run_partitions(request.pool(), workers, tasks, executor, abort)?
        } else {
            pool::run_sequential(tasks, lifecycle_executor(descriptor.clone()), abort)
        };

        let result = merge_outcomes(request, outcomes)?;
        if result.is_completed() {
            finish_output(request);
        }
        Ok(result)
    }
}

/// Splits the request's recording by its grouping property.
///
/// Checks the property, the partition keys and the pool selection without
/// touching the filesystem. Returns `None` for an unpartitioned request.
pub(crate) fn partition_plan(
    descriptor: &BackendDescriptor,
    request: &ExecutionRequest,
) -> SortResult<Option<Vec<(String, Arc<dyn Recording>)>>> {
    let Some(property) = request.grouping_property() else {
        return Ok(None);
    };
    let groups = split_by_property(request.recording(), property)?.ok_or_else(|| {
        SortError::invalid_parameter(
            descriptor.name(),
            "grouping_property",
            format!("recording has no channel property '{}'", property),
        )
    })?;
    if let Some((key, _)) = groups.iter().find(|(key, _)| !is_folder_name(key)) {
        return Err(SortError::invalid_parameter(
            descriptor.name(),
            "grouping_property",
            format!("group '{}' of '{}' is not a valid folder name", key, property),
        ));
    }

    if request.parallel() {
        let pool = request.pool();
        if !descriptor.compatibility().supports(pool) {
            return Err(SortError::UnsupportedConcurrencyModel {
                backend: descriptor.name().to_string(),
                pool,
            });
        }
        if pool == WorkerPoolKind::Processes && !request.recording().is_dumpable() {
            return Err(SortError::not_transportable(
                "the processes pool needs a recording that can be serialized",
            ));
        }
    }
    Ok(Some(groups))
}

/// A partition key must name exactly one folder directly under the output.
fn is_folder_name(key: &str) -> bool {
    let mut components = Path::new(key).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == key
    )
}

fn lifecycle_executor(descriptor: BackendDescriptor) -> PartitionExecutor {
    Arc::new(move |task: &PartitionTask| {
        tracing::info!(partition = %task.key, "partition started");
        let result = run_lifecycle(&descriptor, &task.request);
        tracing::info!(partition = %task.key, ok = result.is_ok(), "partition finished");
        result
    })
}

fn process_executor(runtime: Arc<dyn JobRuntime>) -> PartitionExecutor {
    Arc::new(move |task: &PartitionTask| {
        tracing::info!(partition = %task.key, "partition submitted");
        let result = run_in_worker(runtime.as_ref(), &task.request);
        tracing::info!(partition = %task.key, ok = result.is_ok(), "partition finished");
        result
    })
}

/// Ships one partition to a worker process. The recording is read in place.
fn run_in_worker(runtime: &dyn JobRuntime, request: &ExecutionRequest) -> SortResult<Sorting> {
    let recording = request.recording().dump().ok_or_else(|| {
        SortError::not_transportable("partition recording cannot be serialized")
    })?;
    prepare_output_folder(request.output_folder())?;
    let output = fs::canonicalize(request.output_folder())
        .map_err(|e| SortError::io(request.output_folder(), e))?;
    let input = job_input_dir()?;

    let job = ContainerJob::new(JobBody {
        recording,
        backend: request.backend().to_string(),
        input_path: input.path().to_path_buf(),
        output_path: output.clone(),
        params: request.params().clone(),
        grouping_property: None,
        parallel: false,
        worker_count: request.worker_count(),
        pool: request.pool(),
        raise_on_error: true,
    })?;
    let job_file = job.write_to(input.path())?;

    let collected = submit_and_collect(
        runtime,
        JobSubmission {
            job,
            job_file,
            image: None,
            mounts: Vec::new(),
        },
        &output,
    );
    if let Err(e) = input.close() {
        tracing::warn!(error = %e, "failed to remove job input folder");
    }
    collected.map(|(sorting, _)| sorting)
}

/// Folds partition outcomes into one result.
///
/// With raise-on-error the first failure in partition order is returned.
/// Otherwise failed partitions are dropped and recorded; a run in which
/// every partition failed is itself a failure.
fn merge_outcomes(
    request: &ExecutionRequest,
    outcomes: Vec<PartitionOutcome>,
) -> SortResult<ExecutionResult> {
    let mut parts = Vec::with_capacity(outcomes.len());
    let mut dropped = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(sorting) => parts.push((outcome.key, sorting)),
            Err(err) if request.raise_on_error() || !err.kind().is_run_failure() => return Err(err),
            Err(err) => {
                tracing::warn!(
                    backend = request.backend(),
                    partition = %outcome.key,
                    error = %err,
                    "partition failed, dropping it from the result"
                );
                dropped.push(PartitionFailure {
                    partition: outcome.key,
                    failure: FailureRecord::from_error(request.backend(), &err),
                });
            }
        }
    }

    if parts.is_empty() && !dropped.is_empty() {
        return Ok(ExecutionResult::Failed(dropped.remove(0).failure));
    }

    let sorting = Sorting::merge_partitions(request.recording().sampling_frequency(), parts)?;
    tracing::info!(
        backend = request.backend(),
        units = sorting.num_units(),
        dropped = dropped.len(),
        "merged partitions"
    );
    Ok(ExecutionResult::Completed(SortingReport {
        sorting,
        output_folder: request.output_folder().to_path_buf(),
        dropped,
    }))
}

/// Raises or records a failed run according to the request policy.
///
/// Only run failures are recorded; anything else always propagates.
pub(crate) fn record_failure(
    request: &ExecutionRequest,
    err: SortError,
) -> SortResult<ExecutionResult> {
    if request.raise_on_error() || !err.kind().is_run_failure() {
        return Err(err);
    }
    tracing::warn!(backend = request.backend(), error = %err, "sorter failed");
    Ok(ExecutionResult::Failed(FailureRecord::from_error(
        request.backend(),
        &err,
    )))
}

/// Deletes the output folder of a completed run if requested.
pub(crate) fn finish_output(request: &ExecutionRequest) {
    if !request.delete_output_folder() {
        return;
    }
    let path: &Path = request.output_folder();
    if let Err(e) = fs::remove_dir_all(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to delete output folder");
    }
}

#[cfg(test)]
mod tests;

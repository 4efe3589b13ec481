//! Run options, execution requests and execution results.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::descriptor::{BackendDescriptor, WorkerPoolKind};
use crate::error::{ErrorKind, SortError, SortResult};
use crate::params::{ParamOverrides, ParamValue, Params};
use crate::recording::Recording;
use crate::sorting::Sorting;

/// Number of workers for parallel partition fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerCount {
    /// One worker per available compute unit.
    #[default]
    All,
    /// A fixed number of workers.
    Fixed(NonZeroUsize),
}

impl WorkerCount {
    /// Creates a fixed count; zero means [`WorkerCount::All`].
    pub fn fixed(n: usize) -> Self {
        NonZeroUsize::new(n).map_or(WorkerCount::All, WorkerCount::Fixed)
    }

    /// Resolves to a concrete worker count, never more than `jobs`.
    pub fn resolve(&self, jobs: usize) -> usize {
        let n = match self {
            WorkerCount::All => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            WorkerCount::Fixed(n) => n.get(),
        };
        n.min(jobs.max(1))
    }
}

/// Caller-facing options of one sorter run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    output_folder: Option<PathBuf>,
    delete_output_folder: bool,
    raise_on_error: bool,
    use_container: bool,
    grouping_property: Option<String>,
    parallel: bool,
    worker_count: WorkerCount,
    pool: WorkerPoolKind,
    params: ParamOverrides,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_folder: None,
            delete_output_folder: false,
            raise_on_error: true,
            use_container: false,
            grouping_property: None,
            parallel: false,
            worker_count: WorkerCount::All,
            pool: WorkerPoolKind::Processes,
            params: ParamOverrides::new(),
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output folder. Defaults to `./<backend>_output`.
    pub fn output_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_folder = Some(path.into());
        self
    }

    /// Deletes the output folder once the result is in memory.
    pub fn delete_output_folder(mut self, delete: bool) -> Self {
        self.delete_output_folder = delete;
        self
    }

    /// If false, run failures are recorded instead of returned as errors.
    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }

    /// Runs the sorter inside its container image.
    pub fn use_container(mut self, container: bool) -> Self {
        self.use_container = container;
        self
    }

    /// Sorts each group of channels sharing this property value separately.
    pub fn grouping_property(mut self, property: impl Into<String>) -> Self {
        self.grouping_property = Some(property.into());
        self
    }

    /// Runs partitions concurrently.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn worker_count(mut self, count: WorkerCount) -> Self {
        self.worker_count = count;
        self
    }

    pub fn pool(mut self, pool: WorkerPoolKind) -> Self {
        self.pool = pool;
        self
    }

    /// Overrides one sorter parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Overrides several sorter parameters.
    pub fn params(mut self, overrides: ParamOverrides) -> Self {
        self.params.extend(overrides);
        self
    }

    pub fn overrides(&self) -> &ParamOverrides {
        &self.params
    }

    pub fn is_container(&self) -> bool {
        self.use_container
    }

    pub fn get_output_folder(&self) -> Option<&Path> {
        self.output_folder.as_deref()
    }
}

/// Default output folder of a backend.
pub fn default_output_folder(backend: &str) -> PathBuf {
    PathBuf::from(format!("{}_output", backend))
}

/// One resolved invocation of a sorter.
///
/// Built once from a descriptor and [`RunOptions`]; immutable afterwards.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    backend: String,
    recording: Arc<dyn Recording>,
    output_folder: PathBuf,
    params: Params,
    delete_output_folder: bool,
    raise_on_error: bool,
    use_container: bool,
    grouping_property: Option<String>,
    parallel: bool,
    worker_count: WorkerCount,
    pool: WorkerPoolKind,
}

impl ExecutionRequest {
    /// Merges the options over the descriptor defaults.
    ///
    /// Fails with `InvalidParameter` on unknown or invalid overrides.
    pub fn new(
        descriptor: &BackendDescriptor,
        recording: Arc<dyn Recording>,
        options: &RunOptions,
    ) -> SortResult<Self> {
        let params = descriptor
            .schema()
            .merge(descriptor.name(), &options.params)?;
        Ok(Self {
            backend: descriptor.name().to_string(),
            recording,
            output_folder: options
                .output_folder
                .clone()
                .unwrap_or_else(|| default_output_folder(descriptor.name())),
            params,
            delete_output_folder: options.delete_output_folder,
            raise_on_error: options.raise_on_error,
            use_container: options.use_container,
            grouping_property: options.grouping_property.clone(),
            parallel: options.parallel,
            worker_count: options.worker_count,
            pool: options.pool,
        })
    }

    /// Builds a request from already resolved parts, as received in a job.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        backend: impl Into<String>,
        recording: Arc<dyn Recording>,
        output_folder: impl Into<PathBuf>,
        params: Params,
        raise_on_error: bool,
        grouping_property: Option<String>,
        parallel: bool,
        worker_count: WorkerCount,
        pool: WorkerPoolKind,
    ) -> Self {
        Self {
            backend: backend.into(),
            recording,
            output_folder: output_folder.into(),
            params,
            delete_output_folder: false,
            raise_on_error,
            use_container: false,
            grouping_property,
            parallel,
            worker_count,
            pool,
        }
    }

    /// Request for one partition: output under `<output>/<group>`, no
    /// further partitioning, never deleted on its own.
    pub fn for_partition(&self, group: &str, recording: Arc<dyn Recording>) -> Self {
        Self {
            backend: self.backend.clone(),
            recording,
            output_folder: self.output_folder.join(group),
            params: self.params.clone(),
            delete_output_folder: false,
            raise_on_error: self.raise_on_error,
            use_container: false,
            grouping_property: None,
            parallel: false,
            worker_count: self.worker_count,
            pool: self.pool,
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn recording(&self) -> &Arc<dyn Recording> {
        &self.recording
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn delete_output_folder(&self) -> bool {
        self.delete_output_folder
    }

    pub fn raise_on_error(&self) -> bool {
        self.raise_on_error
    }

    pub fn use_container(&self) -> bool {
        self.use_container
    }

    pub fn grouping_property(&self) -> Option<&str> {
        self.grouping_property.as_deref()
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }

    pub fn worker_count(&self) -> WorkerCount {
        self.worker_count
    }

    pub fn pool(&self) -> WorkerPoolKind {
        self.pool
    }
}

/// A run failure recorded instead of raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub backend: String,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl FailureRecord {
    pub fn from_error(backend: &str, err: &SortError) -> Self {
        Self {
            backend: backend.to_string(),
            kind: err.kind(),
            message: err.to_string(),
            diagnostic: err.diagnostic().map(str::to_string),
        }
    }
}

/// Failure of one partition dropped from a merged result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionFailure {
    pub partition: String,
    pub failure: FailureRecord,
}

/// A completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct SortingReport {
    pub sorting: Sorting,
    pub output_folder: PathBuf,
    /// Partitions that failed and were left out of `sorting`.
    pub dropped: Vec<PartitionFailure>,
}

impl SortingReport {
    pub fn new(sorting: Sorting, output_folder: impl Into<PathBuf>) -> Self {
        Self {
            sorting,
            output_folder: output_folder.into(),
            dropped: Vec::new(),
        }
    }

    pub fn sampling_frequency(&self) -> f64 {
        self.sorting.sampling_frequency()
    }

    pub fn is_partial(&self) -> bool {
        !self.dropped.is_empty()
    }
}

/// Outcome of a run: a report or a failure, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Completed(SortingReport),
    Failed(FailureRecord),
}

impl ExecutionResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionResult::Completed(_))
    }

    pub fn sorting(&self) -> Option<&Sorting> {
        match self {
            ExecutionResult::Completed(report) => Some(&report.sorting),
            ExecutionResult::Failed(_) => None,
        }
    }

    pub fn report(&self) -> Option<&SortingReport> {
        match self {
            ExecutionResult::Completed(report) => Some(report),
            ExecutionResult::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        match self {
            ExecutionResult::Completed(_) => None,
            ExecutionResult::Failed(failure) => Some(failure),
        }
    }

    /// Returns the sorting, or `None` for a recorded failure.
    pub fn into_sorting(self) -> Option<Sorting> {
        match self {
            ExecutionResult::Completed(report) => Some(report.sorting),
            ExecutionResult::Failed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SorterBackend;
    use crate::params::{ParamSchema, ParamSpec};
    use crate::recording::InMemoryRecording;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct Nop;

    impl SorterBackend for Nop {
        fn is_installed(&self) -> bool {
            true
        }
        fn version(&self) -> Option<String> {
            None
        }
        fn run(&self, _: &dyn Recording, _: &Params, _: &Path) -> SortResult<()> {
            Ok(())
        }
    }

    fn descriptor() -> BackendDescriptor {
        BackendDescriptor::builder("nop", Arc::new(Nop))
            .schema(ParamSchema::new(vec![
                ParamSpec::float("detect_threshold", 3.0, "threshold"),
                ParamSpec::bool("filter", true, "filter"),
            ]))
            .build()
    }

    fn recording() -> Arc<dyn Recording> {
        Arc::new(InMemoryRecording::new(1000.0, 1, vec![0.0; 10]).unwrap())
    }

    #[test]
    fn test_request_defaults() {
        let req = ExecutionRequest::new(&descriptor(), recording(), &RunOptions::new()).unwrap();
        assert_eq!(req.output_folder(), Path::new("nop_output"));
        assert!(req.raise_on_error());
        assert_eq!(req.pool(), WorkerPoolKind::Processes);
        assert_eq!(req.params().get_f64("detect_threshold"), Some(3.0));
    }

    #[test]
    fn test_request_merges_overrides() {
        let options = RunOptions::new()
            .output_folder("/tmp/x")
            .param("detect_threshold", 5i64)
            .param("filter", false);
        let req = ExecutionRequest::new(&descriptor(), recording(), &options).unwrap();
        assert_eq!(req.params().get_f64("detect_threshold"), Some(5.0));
        assert_eq!(req.params().get_bool("filter"), Some(false));

        let part = req.for_partition("A", recording());
        assert_eq!(part.output_folder(), Path::new("/tmp/x/A"));
        assert_eq!(part.grouping_property(), None);
    }

    #[test]
    fn test_request_rejects_unknown() {
        let options = RunOptions::new().param("bogus", 1i64);
        let err = ExecutionRequest::new(&descriptor(), recording(), &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(WorkerCount::fixed(0), WorkerCount::All);
        assert_eq!(WorkerCount::fixed(8).resolve(3), 3);
        assert!(WorkerCount::All.resolve(100) >= 1);
    }

    #[test]
    fn test_failure_record() {
        let err = SortError::execution_with_diagnostic("nop", "exit 2", "boom");
        let record = FailureRecord::from_error("nop", &err);
        assert_eq!(record.kind, ErrorKind::ExecutionError);
        assert_eq!(record.diagnostic.as_deref(), Some("boom"));

        let result = ExecutionResult::Failed(record);
        assert!(!result.is_completed());
        assert!(result.into_sorting().is_none());
    }
}

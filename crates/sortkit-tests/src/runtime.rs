//! A job runtime that executes jobs in the calling process.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sortkit_launch::{
    execute_job, JobHandle, JobOutcome, JobRuntime, JobSubmission, LocalLauncher, Registry,
};
use sortkit_spec::{ContainerJob, ExecutionResult, SortResult};

/// Runs submitted jobs through [`execute_job`] on `wait`.
///
/// Jobs see host paths, like the worker process runtime.
#[derive(Debug)]
pub struct InProcessRuntime {
    registry: Arc<Registry>,
    available: bool,
    submitted: AtomicUsize,
}

impl InProcessRuntime {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            available: true,
            submitted: AtomicUsize::new(0),
        }
    }

    /// A runtime that reports itself unavailable.
    pub fn unavailable(registry: Arc<Registry>) -> Self {
        Self {
            available: false,
            ..Self::new(registry)
        }
    }

    /// Number of jobs submitted so far.
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

impl JobRuntime for InProcessRuntime {
    fn name(&self) -> &str {
        "in-process"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn path_aliases(&self, input: &Path, output: &Path) -> (PathBuf, PathBuf) {
        (input.to_path_buf(), output.to_path_buf())
    }

    fn submit(&self, submission: JobSubmission) -> SortResult<Box<dyn JobHandle>> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        // Jobs only ever see what was written to disk.
        let job = ContainerJob::read_from(&submission.job_file)?;
        Ok(Box::new(InProcessHandle {
            job,
            registry: Arc::clone(&self.registry),
        }))
    }
}

struct InProcessHandle {
    job: ContainerJob,
    registry: Arc<Registry>,
}

impl JobHandle for InProcessHandle {
    fn job_id(&self) -> &str {
        &self.job.job_id
    }

    fn wait(self: Box<Self>) -> SortResult<JobOutcome> {
        let launcher = LocalLauncher::default();
        Ok(match execute_job(&self.job, &self.registry, &launcher) {
            Ok(ExecutionResult::Completed(_)) => JobOutcome::Succeeded,
            Ok(ExecutionResult::Failed(failure)) => JobOutcome::Failed {
                message: failure.message,
                diagnostic: failure.diagnostic,
            },
            Err(err) => JobOutcome::Failed {
                message: err.to_string(),
                diagnostic: err.diagnostic().map(str::to_string),
            },
        })
    }
}

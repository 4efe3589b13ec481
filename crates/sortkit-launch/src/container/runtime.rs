//! Job runtimes: where a [`ContainerJob`] actually runs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use sortkit_spec::job::{CONTAINER_INPUT, CONTAINER_OUTPUT, JOB_FILE};
use sortkit_spec::{BindMount, ContainerJob, SortError, SortResult};

use crate::capability::Capabilities;

/// A job ready for submission.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub job: ContainerJob,
    /// Host path of the written `job.json`.
    pub job_file: PathBuf,
    /// Image to run the job in, for runtimes that use one.
    pub image: Option<String>,
    pub mounts: Vec<BindMount>,
}

/// Terminal state of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed {
        message: String,
        diagnostic: Option<String>,
    },
}

/// Executes jobs somewhere other than the calling thread.
pub trait JobRuntime: Send + Sync + fmt::Debug {
    /// Runtime name for logs and errors.
    fn name(&self) -> &str;

    /// Whether jobs can be submitted on this host.
    fn is_available(&self) -> bool;

    /// Paths under which the job sees its host input and output folders.
    fn path_aliases(&self, input: &Path, output: &Path) -> (PathBuf, PathBuf);

    /// Starts a job.
    fn submit(&self, submission: JobSubmission) -> SortResult<Box<dyn JobHandle>>;
}

/// A running job.
pub trait JobHandle: Send {
    fn job_id(&self) -> &str;

    /// Blocks until the job finishes.
    fn wait(self: Box<Self>) -> SortResult<JobOutcome>;
}

/// Handle on a spawned child process.
#[derive(Debug)]
struct ChildHandle {
    job_id: String,
    program: PathBuf,
    child: Child,
}

impl JobHandle for ChildHandle {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn wait(self: Box<Self>) -> SortResult<JobOutcome> {
        let output = self
            .child
            .wait_with_output()
            .map_err(|e| SortError::io(&self.program, e))?;
        if output.status.success() {
            return Ok(JobOutcome::Succeeded);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Ok(JobOutcome::Failed {
            message: match output.status.code() {
                Some(code) => format!("job {} exited with code {}", self.job_id, code),
                None => format!("job {} terminated by signal", self.job_id),
            },
            diagnostic: (!stderr.is_empty()).then_some(stderr),
        })
    }
}

fn spawn(program: &Path, command: &mut Command, job_id: &str) -> SortResult<Box<dyn JobHandle>> {
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SortError::io(program, e))?;
    Ok(Box::new(ChildHandle {
        job_id: job_id.to_string(),
        program: program.to_path_buf(),
        child,
    }))
}

/// Configuration for [`DockerRuntime`].
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Docker executable. Probed from `SORTKIT_DOCKER_PATH` and `PATH` when unset.
    pub docker_path: Option<PathBuf>,
    /// Worker command inside the image. The job file path is appended.
    pub worker_command: Vec<String>,
    /// Extra arguments for `docker run`, placed before the image.
    pub extra_args: Vec<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            docker_path: None,
            worker_command: vec!["sortkit".to_string(), "run-job".to_string()],
            extra_args: Vec::new(),
        }
    }
}

impl DockerConfig {
    /// Sets the docker executable path.
    pub fn docker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.docker_path = Some(path.into());
        self
    }

    /// Sets the worker command run inside the image.
    pub fn worker_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.worker_command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Appends an extra `docker run` argument.
    pub fn extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }
}

/// Runs jobs in docker containers.
#[derive(Debug, Clone, Default)]
pub struct DockerRuntime {
    config: DockerConfig,
}

impl DockerRuntime {
    pub fn new(config: DockerConfig) -> Self {
        Self { config }
    }

    fn docker(&self) -> Option<PathBuf> {
        self.config
            .docker_path
            .clone()
            .or_else(|| Capabilities::global().docker.clone())
    }

    /// Arguments of the `docker run` invocation for a submission.
    pub fn run_args(&self, submission: &JobSubmission, image: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            format!("sortkit-{}", submission.job.short_id()),
        ];
        for mount in &submission.mounts {
            args.push("-v".to_string());
            args.push(mount.volume_arg());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args.push(image.to_string());
        args.extend(self.config.worker_command.iter().cloned());
        args.push(
            Path::new(CONTAINER_INPUT)
                .join(JOB_FILE)
                .to_string_lossy()
                .into_owned(),
        );
        args
    }
}

impl JobRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    fn is_available(&self) -> bool {
        self.docker().is_some()
    }

    fn path_aliases(&self, _input: &Path, _output: &Path) -> (PathBuf, PathBuf) {
        (PathBuf::from(CONTAINER_INPUT), PathBuf::from(CONTAINER_OUTPUT))
    }

    fn submit(&self, submission: JobSubmission) -> SortResult<Box<dyn JobHandle>> {
        let backend = submission.job.body.backend.as_str();
        let docker = self
            .docker()
            .ok_or_else(|| SortError::backend_unavailable(backend, "docker executable not found"))?;
        let image = submission.image.as_deref().ok_or_else(|| {
            SortError::backend_unavailable(backend, "no container image for this sorter")
        })?;
        let args = self.run_args(&submission, image);
        tracing::info!(
            job = submission.job.short_id(),
            image,
            "submitting container job"
        );
        tracing::debug!(docker = %docker.display(), ?args, "docker invocation");
        spawn(&docker, Command::new(&docker).args(&args), &submission.job.job_id)
    }
}

/// Configuration for [`ProcessRuntime`].
#[derive(Debug, Clone, Default)]
pub struct ProcessConfig {
    /// Worker executable. Probed from `SORTKIT_WORKER_PATH` and `PATH` when unset.
    pub worker_path: Option<PathBuf>,
}

impl ProcessConfig {
    /// Sets the worker executable path.
    pub fn worker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_path = Some(path.into());
        self
    }
}

/// Runs jobs as `sortkit run-job` processes on the host.
#[derive(Debug, Clone, Default)]
pub struct ProcessRuntime {
    config: ProcessConfig,
}

impl ProcessRuntime {
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }

    fn worker(&self) -> Option<PathBuf> {
        self.config
            .worker_path
            .clone()
            .or_else(|| Capabilities::global().worker.clone())
    }
}

impl JobRuntime for ProcessRuntime {
    fn name(&self) -> &str {
        "process"
    }

    fn is_available(&self) -> bool {
        self.worker().is_some()
    }

    fn path_aliases(&self, input: &Path, output: &Path) -> (PathBuf, PathBuf) {
        (input.to_path_buf(), output.to_path_buf())
    }

    fn submit(&self, submission: JobSubmission) -> SortResult<Box<dyn JobHandle>> {
        let worker = self.worker().ok_or_else(|| {
            SortError::backend_unavailable(
                submission.job.body.backend.as_str(),
                "sortkit worker executable not found",
            )
        })?;
        tracing::info!(
            job = submission.job.short_id(),
            worker = %worker.display(),
            "submitting worker job"
        );
        spawn(
            &worker,
            Command::new(&worker).arg("run-job").arg(&submission.job_file),
            &submission.job.job_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sortkit_spec::{
        BinaryRecordingInfo, JobBody, Params, RecordingDump, SampleType, WorkerCount,
        WorkerPoolKind,
    };

    fn submission() -> JobSubmission {
        let body = JobBody {
            recording: RecordingDump::Binary(BinaryRecordingInfo {
                path: PathBuf::from("/input/0_rec.dat"),
                sampling_frequency: 30000.0,
                num_channels: 4,
                sample_type: SampleType::Float32,
                header_bytes: 0,
                is_filtered: false,
                channel_ids: vec![0, 1, 2, 3],
                properties: Default::default(),
            }),
            backend: "mountainsort4".to_string(),
            input_path: PathBuf::from(CONTAINER_INPUT),
            output_path: PathBuf::from(CONTAINER_OUTPUT),
            params: Params::default(),
            grouping_property: None,
            parallel: false,
            worker_count: WorkerCount::All,
            pool: WorkerPoolKind::Processes,
            raise_on_error: true,
        };
        let job = ContainerJob::new(body).unwrap();
        JobSubmission {
            job,
            job_file: PathBuf::from("/tmp/in/job.json"),
            image: Some("sortkit/mountainsort4:0.1.0".to_string()),
            mounts: vec![
                BindMount::read_only("/tmp/in", CONTAINER_INPUT),
                BindMount::read_write("/tmp/out", CONTAINER_OUTPUT),
            ],
        }
    }

    #[test]
    fn test_docker_run_args() {
        let runtime = DockerRuntime::new(DockerConfig::default().extra_arg("--network=none"));
        let submission = submission();
        let args = runtime.run_args(&submission, "img:1");
        assert_eq!(&args[..2], &["run", "--rm"]);
        assert_eq!(args[3], format!("sortkit-{}", submission.job.short_id()));
        assert_eq!(
            &args[4..8],
            &["-v", "/tmp/in:/input:ro", "-v", "/tmp/out:/output"]
        );
        assert_eq!(
            &args[8..],
            &["--network=none", "img:1", "sortkit", "run-job", "/input/job.json"]
        );
    }

    #[test]
    fn test_path_aliases() {
        let input = Path::new("/tmp/in");
        let output = Path::new("/tmp/out");
        assert_eq!(
            DockerRuntime::default().path_aliases(input, output),
            (PathBuf::from("/input"), PathBuf::from("/output"))
        );
        assert_eq!(
            ProcessRuntime::default().path_aliases(input, output),
            (input.to_path_buf(), output.to_path_buf())
        );
    }

    #[test]
    fn test_missing_worker_fails_submission() {
        let runtime = ProcessRuntime::new(
            ProcessConfig::default().worker_path("/nonexistent/sortkit-worker"),
        );
        assert!(runtime.is_available());
        let err = runtime.submit(submission()).err().unwrap();
        assert_eq!(err.kind(), sortkit_spec::ErrorKind::Io);
    }
}

//! Container job message.
//!
//! A [`ContainerJob`] is the transport form of an execution request. It is
//! written as `job.json` into the job's input directory and read back by the
//! worker (`sortkit run-job`) inside the container or worker process.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::descriptor::WorkerPoolKind;
use crate::error::{SortError, SortResult};
use crate::params::Params;
use crate::recording::RecordingDump;
use crate::request::WorkerCount;

/// Mount point of the job input directory inside a container.
pub const CONTAINER_INPUT: &str = "/input";

/// Mount point of the job output directory inside a container.
pub const CONTAINER_OUTPUT: &str = "/output";

/// Job message file name inside the input directory.
pub const JOB_FILE: &str = "job.json";

/// Folder under the job output where the sorter itself runs.
pub const WORKING_DIR: &str = "working";

/// A host directory exposed at a fixed path inside the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: PathBuf,
    pub read_only: bool,
}

impl BindMount {
    pub fn read_only(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: true,
        }
    }

    pub fn read_write(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// Docker `-v` argument for this mount.
    pub fn volume_arg(&self) -> String {
        let mut arg = format!("{}:{}", self.source.display(), self.target.display());
        if self.read_only {
            arg.push_str(":ro");
        }
        arg
    }
}

/// Fields of a job that determine its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobBody {
    pub recording: RecordingDump,
    pub backend: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub params: Params,
    #[serde(default)]
    pub grouping_property: Option<String>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub worker_count: WorkerCount,
    pub pool: WorkerPoolKind,
    pub raise_on_error: bool,
}

/// Serialized execution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerJob {
    pub job_id: String,
    #[serde(flatten)]
    pub body: JobBody,
}

impl ContainerJob {
    /// Wraps a body, deriving the job id from its content.
    pub fn new(body: JobBody) -> SortResult<Self> {
        let job_id = job_hash(&body)?;
        Ok(Self { job_id, body })
    }

    /// Short id for container names and log lines.
    pub fn short_id(&self) -> &str {
        self.job_id.get(..12).unwrap_or(&self.job_id)
    }

    pub fn to_json(&self) -> SortResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> SortResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the job to `<dir>/job.json`.
    pub fn write_to(&self, dir: &Path) -> SortResult<PathBuf> {
        let path = dir.join(JOB_FILE);
        fs::write(&path, self.to_json()?).map_err(|e| SortError::io(&path, e))?;
        Ok(path)
    }

    pub fn read_from(path: &Path) -> SortResult<Self> {
        let json = fs::read_to_string(path).map_err(|e| SortError::io(path, e))?;
        Self::from_json(&json)
    }

    /// Returns true if `job_id` matches the content.
    pub fn verify(&self) -> bool {
        job_hash(&self.body).is_ok_and(|h| h == self.job_id)
    }
}

/// BLAKE3 hex digest of the canonical JSON of a job body.
///
/// The body is routed through `serde_json::Value`, whose object keys are
/// sorted, and rendered without whitespace.
pub fn job_hash(body: &JobBody) -> SortResult<String> {
    let value = serde_json::to_value(body)?;
    let canonical = serde_json::to_string(&value)?;
    Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{BinaryRecordingInfo, SampleType};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn body() -> JobBody {
        JobBody {
            recording: RecordingDump::Binary(BinaryRecordingInfo {
                path: PathBuf::from("/input/0_traces.raw"),
                sampling_frequency: 30000.0,
                num_channels: 4,
                sample_type: SampleType::Float32,
                header_bytes: 0,
                is_filtered: false,
                channel_ids: vec![0, 1, 2, 3],
                properties: BTreeMap::new(),
            }),
            backend: "mountainsort4".into(),
            input_path: PathBuf::from(CONTAINER_INPUT),
            output_path: PathBuf::from(CONTAINER_OUTPUT),
            params: Params::default(),
            grouping_property: None,
            parallel: false,
            worker_count: WorkerCount::All,
            pool: WorkerPoolKind::Processes,
            raise_on_error: true,
        }
    }

    #[test]
    fn test_short_id_of_foreign_job_id() {
        let mut job = ContainerJob::new(body()).unwrap();
        assert_eq!(job.short_id(), &job.job_id[..12]);

        job.job_id = "éééééééééé".to_string();
        assert_eq!(job.short_id(), "éééééé");
        job.job_id = "abc".to_string();
        assert_eq!(job.short_id(), "abc");
        job.job_id = "aéééééééé".to_string();
        assert_eq!(job.short_id(), job.job_id);
    }

    #[test]
    fn test_job_id_is_stable() {
        let a = ContainerJob::new(body()).unwrap();
        let b = ContainerJob::new(body()).unwrap();
        assert_eq!(a.job_id, b.job_id);
        assert_eq!(a.job_id.len(), 64);
        assert!(a.verify());

        let mut other = body();
        other.backend = "kilosort2".into();
        assert_ne!(ContainerJob::new(other).unwrap().job_id, a.job_id);
    }

    #[test]
    fn test_job_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let job = ContainerJob::new(body()).unwrap();
        let path = job.write_to(dir.path()).unwrap();
        assert_eq!(path, dir.path().join(JOB_FILE));
        let back = ContainerJob::read_from(&path).unwrap();
        assert_eq!(back, job);
        assert!(back.verify());
    }

    #[test]
    fn test_volume_arg() {
        assert_eq!(
            BindMount::read_only("/tmp/in", CONTAINER_INPUT).volume_arg(),
            "/tmp/in:/input:ro"
        );
        assert_eq!(
            BindMount::read_write("/tmp/out", CONTAINER_OUTPUT).volume_arg(),
            "/tmp/out:/output"
        );
    }
}

//! Generic backend body for sorters shipped as external executables.
//!
//! The sorter is invoked as
//!
//! ```text
//! <exe> --recording recording.dat --info recording.json --params params.json --output <dir>
//! ```
//!
//! `recording.dat` holds the traces as little-endian f32, frame-major. A zero
//! exit status means the sorter left `firings.mda` and `samplerate.txt` in the
//! output folder.

use byteorder::{LittleEndian, WriteBytesExt};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use sortkit_spec::{Params, Recording, SortResult, SorterBackend};

use crate::error::{ExternalError, ExternalResult};

/// Staged traces file name.
pub const RECORDING_DAT: &str = "recording.dat";

/// Staged recording metadata file name.
pub const RECORDING_INFO: &str = "recording.json";

/// Staged parameters file name.
pub const PARAMS_FILE: &str = "params.json";

/// Frames written per chunk while staging traces.
const STAGE_CHUNK_FRAMES: usize = 65_536;

/// Returns the environment variable overriding a sorter's executable.
pub fn executable_env_var(name: &str) -> String {
    let upper: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("SORTKIT_{}_PATH", upper)
}

/// Configuration for an external sorter.
#[derive(Debug, Clone)]
pub struct ExternalSorterConfig {
    /// Sorter identifier.
    pub name: String,
    /// Executable name looked up on PATH.
    pub executable: String,
    /// Explicit executable path, checked first.
    pub executable_path: Option<PathBuf>,
    /// Environment variable holding an executable path.
    pub env_var: String,
    /// Warn when the recording is pre-filtered and the `filter` parameter is on.
    pub warn_prefiltered: bool,
}

impl ExternalSorterConfig {
    /// Config for `name`, executable `sortkit-<name>`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            executable: format!("sortkit-{}", name),
            env_var: executable_env_var(&name),
            executable_path: None,
            warn_prefiltered: true,
            name,
        }
    }

    /// Sets the executable name.
    pub fn executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Sets the executable path.
    pub fn executable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    /// Sets the pre-filtered warning.
    pub fn warn_prefiltered(mut self, warn: bool) -> Self {
        self.warn_prefiltered = warn;
        self
    }
}

/// Recording metadata staged next to the traces.
#[derive(Debug, Serialize)]
struct StagedInfo {
    sampling_frequency: f64,
    num_channels: usize,
    num_frames: usize,
    dtype: &'static str,
    channel_ids: Vec<u32>,
    is_filtered: bool,
}

/// A sorter run through an external executable.
#[derive(Debug, Clone)]
pub struct ExternalSorter {
    config: ExternalSorterConfig,
}

impl ExternalSorter {
    pub fn new(config: ExternalSorterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExternalSorterConfig {
        &self.config
    }

    /// Finds the sorter executable.
    pub fn find_executable(&self) -> ExternalResult<PathBuf> {
        // Check config override first
        if let Some(ref path) = self.config.executable_path {
            if path.exists() {
                return Ok(path.clone());
            }
        }

        if let Ok(path) = std::env::var(&self.config.env_var) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }

        if let Ok(path) = which::which(&self.config.executable) {
            return Ok(path);
        }

        Err(ExternalError::ExecutableNotFound {
            name: self.config.executable.clone(),
            env_var: self.config.env_var.clone(),
        })
    }

    fn stage(&self, recording: &dyn Recording, params: &Params, dir: &Path) -> ExternalResult<()> {
        let dat = dir.join(RECORDING_DAT);
        write_traces(recording, &dat)?;

        let info = StagedInfo {
            sampling_frequency: recording.sampling_frequency(),
            num_channels: recording.num_channels(),
            num_frames: recording.num_frames(),
            dtype: "float32",
            channel_ids: recording.channel_ids(),
            is_filtered: recording.is_filtered(),
        };
        write_json(&dir.join(RECORDING_INFO), &info)?;
        write_json(&dir.join(PARAMS_FILE), params)?;

        tracing::debug!(sorter = %self.config.name, dir = %dir.display(), "staged sorter input");
        Ok(())
    }

    fn invoke(&self, dir: &Path) -> ExternalResult<()> {
        let exe = self.find_executable()?;

        let mut cmd = Command::new(&exe);
        cmd.arg("--recording")
            .arg(dir.join(RECORDING_DAT))
            .arg("--info")
            .arg(dir.join(RECORDING_INFO))
            .arg("--params")
            .arg(dir.join(PARAMS_FILE))
            .arg("--output")
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        tracing::info!(sorter = %self.config.name, exe = %exe.display(), "running sorter");
        let output = cmd.output().map_err(ExternalError::SpawnFailed)?;

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(ExternalError::process_failed(exit_code, stderr));
        }
        Ok(())
    }
}

impl SorterBackend for ExternalSorter {
    fn is_installed(&self) -> bool {
        self.find_executable().is_ok()
    }

    fn version(&self) -> Option<String> {
        let exe = self.find_executable().ok()?;
        let output = Command::new(exe)
            .arg("--version")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return Some("unknown".to_string());
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Some(if text.is_empty() {
            "unknown".to_string()
        } else {
            text
        })
    }

    fn setup(
        &self,
        recording: &dyn Recording,
        params: &Params,
        output_folder: &Path,
    ) -> SortResult<()> {
        let filter_on = params.get_bool("filter") == Some(true);
        if self.config.warn_prefiltered && recording.is_filtered() && filter_on {
            tracing::warn!(
                sorter = %self.config.name,
                "recording is already filtered but the sorter filter is enabled; set 'filter' to false to disable it"
            );
        }
        self.stage(recording, params, output_folder)
            .map_err(|e| e.into_sort_error(&self.config.name))
    }

    fn run(
        &self,
        _recording: &dyn Recording,
        _params: &Params,
        output_folder: &Path,
    ) -> SortResult<()> {
        self.invoke(output_folder)
            .map_err(|e| e.into_sort_error(&self.config.name))
    }
}

/// Writes all traces as little-endian f32, frame-major.
pub fn write_traces(recording: &dyn Recording, path: &Path) -> ExternalResult<()> {
    let stage_err = |source| ExternalError::StageFailed {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(stage_err)?;
    let mut writer = BufWriter::new(file);

    let num_frames = recording.num_frames();
    let mut start = 0;
    while start < num_frames {
        let end = (start + STAGE_CHUNK_FRAMES).min(num_frames);
        let chunk = recording.traces(start, end).map_err(ExternalError::Recording)?;
        for sample in chunk {
            writer.write_f32::<LittleEndian>(sample).map_err(stage_err)?;
        }
        start = end;
    }
    writer.flush().map_err(stage_err)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> ExternalResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(ExternalError::SerializeFailed)?;
    fs::write(path, json).map_err(|source| ExternalError::StageFailed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sortkit_spec::{ErrorKind, InMemoryRecording, ParamSchema, ParamSpec};

    #[test]
    fn test_env_var_name() {
        assert_eq!(executable_env_var("mountainsort4"), "SORTKIT_MOUNTAINSORT4_PATH");
        assert_eq!(executable_env_var("kilosort2_5"), "SORTKIT_KILOSORT2_5_PATH");
    }

    #[test]
    fn test_config_builder() {
        let config = ExternalSorterConfig::new("klusta")
            .executable("klusta-bridge")
            .executable_path("/opt/klusta/bin/klusta-bridge")
            .warn_prefiltered(false);
        assert_eq!(config.executable, "klusta-bridge");
        assert_eq!(config.env_var, "SORTKIT_KLUSTA_PATH");
        assert_eq!(
            config.executable_path,
            Some(PathBuf::from("/opt/klusta/bin/klusta-bridge"))
        );
        assert!(!config.warn_prefiltered);
    }

    #[test]
    fn test_missing_executable_is_not_installed() {
        let sorter = ExternalSorter::new(
            ExternalSorterConfig::new("nonexistent").executable("sortkit-definitely-not-installed"),
        );
        assert!(!sorter.is_installed());
        assert_eq!(sorter.version(), None);
    }

    #[test]
    fn test_setup_stages_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let recording =
            InMemoryRecording::new(1000.0, 2, vec![1.0, -1.0, 0.5, -0.5, 0.0, 2.0]).unwrap();
        let params = ParamSchema::new(vec![ParamSpec::bool("filter", true, "filter")]).defaults();
        let sorter = ExternalSorter::new(ExternalSorterConfig::new("stage"));

        sorter.setup(&recording, &params, dir.path()).unwrap();

        let bytes = fs::read(dir.path().join(RECORDING_DAT)).unwrap();
        assert_eq!(bytes.len(), 6 * 4);
        assert_eq!(&bytes[4..8], &(-1.0f32).to_le_bytes());

        let info: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(RECORDING_INFO)).unwrap())
                .unwrap();
        assert_eq!(info["num_frames"], 3);
        assert_eq!(info["num_channels"], 2);

        let staged: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(PARAMS_FILE)).unwrap())
                .unwrap();
        assert_eq!(staged["filter"], true);
    }

    #[test]
    fn test_run_without_executable_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let recording = InMemoryRecording::new(1000.0, 1, vec![0.0; 4]).unwrap();
        let sorter = ExternalSorter::new(
            ExternalSorterConfig::new("nonexistent").executable("sortkit-definitely-not-installed"),
        );
        let err = sorter
            .run(&recording, &Params::default(), dir.path())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }
}

//! Error types for external sorter executables.

use sortkit_spec::{BackendError, SortError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for external sorter operations.
pub type ExternalResult<T> = Result<T, ExternalError>;

/// Errors raised while staging or running an external sorter.
#[derive(Debug, Error)]
pub enum ExternalError {
    /// Executable not found.
    #[error("Executable '{name}' not found. Install it on PATH, or set the {env_var} environment variable")]
    ExecutableNotFound { name: String, env_var: String },

    /// Failed to spawn the sorter process.
    #[error("Failed to spawn sorter process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// Sorter process exited with non-zero status.
    #[error("Sorter process exited with status {exit_code}")]
    ProcessFailed { exit_code: i32, stderr: String },

    /// Failed to write a staged input file.
    #[error("Failed to stage {path}: {source}")]
    StageFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to encode a staged JSON document.
    #[error("Failed to serialize sorter input: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// Reading the recording for staging failed.
    #[error("Failed to read recording: {0}")]
    Recording(#[source] SortError),
}

impl ExternalError {
    /// Creates a process failed error.
    pub fn process_failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::ProcessFailed {
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Converts into the shared error type, attributed to `backend`.
    pub fn into_sort_error(self, backend: &str) -> SortError {
        match self {
            ExternalError::ExecutableNotFound { .. } => {
                SortError::backend_unavailable(backend, self.to_string())
            }
            ExternalError::ProcessFailed { exit_code, stderr } => {
                SortError::execution_with_diagnostic(
                    backend,
                    format!("process exited with status {}", exit_code),
                    stderr,
                )
            }
            ExternalError::StageFailed { path, source } => SortError::io(path, source),
            ExternalError::SerializeFailed(e) => SortError::from(e),
            ExternalError::Recording(e) => e,
            ExternalError::SpawnFailed(_) => SortError::execution(backend, self.to_string()),
        }
    }
}

impl BackendError for ExternalError {
    fn code(&self) -> &'static str {
        match self {
            ExternalError::ExecutableNotFound { .. } => "EXTERNAL_001",
            ExternalError::SpawnFailed(_) => "EXTERNAL_002",
            ExternalError::ProcessFailed { .. } => "EXTERNAL_003",
            ExternalError::StageFailed { .. } => "EXTERNAL_004",
            ExternalError::SerializeFailed(_) => "EXTERNAL_005",
            ExternalError::Recording(_) => "EXTERNAL_006",
        }
    }

    fn category(&self) -> &'static str {
        "external"
    }
}

//! Error types shared by every sortkit crate.

use std::path::PathBuf;
use thiserror::Error;

use crate::descriptor::WorkerPoolKind;

/// Result type for sortkit operations.
pub type SortResult<T> = Result<T, SortError>;

/// Coarse classification of a [`SortError`].
///
/// The first five kinds are dispatch-time failures and are always raised
/// before an output folder exists. `ExecutionError` and `ResultMissing` are
/// run-time failures governed by the `raise_on_error` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownBackend,
    InvalidParameter,
    BackendUnavailable,
    UnsupportedConcurrencyModel,
    NotTransportable,
    ExecutionError,
    ResultMissing,
    InvalidTransition,
    Io,
    Serialization,
}

impl ErrorKind {
    /// Returns the snake_case name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownBackend => "unknown_backend",
            ErrorKind::InvalidParameter => "invalid_parameter",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::UnsupportedConcurrencyModel => "unsupported_concurrency_model",
            ErrorKind::NotTransportable => "not_transportable",
            ErrorKind::ExecutionError => "execution_error",
            ErrorKind::ResultMissing => "result_missing",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Io => "io",
            ErrorKind::Serialization => "serialization",
        }
    }

    /// Returns true for failures that happen while a backend runs and that
    /// `raise_on_error = false` turns into recorded failures.
    pub fn is_run_failure(&self) -> bool {
        matches!(self, ErrorKind::ExecutionError | ErrorKind::ResultMissing)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while resolving, launching or collecting a sort.
#[derive(Debug, Error)]
pub enum SortError {
    /// No registered backend matches the identifier.
    #[error("Unknown sorter '{name}'")]
    UnknownBackend { name: String },

    /// A descriptor reference names a registered backend but is not the
    /// registered descriptor.
    #[error("Sorter reference '{name}' does not match the registered descriptor of the same name")]
    AmbiguousBackend { name: String },

    /// A parameter override could not be merged over the defaults.
    #[error("Invalid parameter '{name}' for sorter '{backend}': {reason}")]
    InvalidParameter {
        backend: String,
        name: String,
        reason: String,
    },

    /// The runtime dependency of the requested execution mode is missing.
    #[error("Sorter '{backend}' is unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// The selected worker pool is not safe for this backend.
    #[error("Sorter '{backend}' cannot run under the '{pool}' worker pool")]
    UnsupportedConcurrencyModel {
        backend: String,
        pool: WorkerPoolKind,
    },

    /// The recording cannot be serialized for transport.
    #[error("Recording is not transportable: {reason}")]
    NotTransportable { reason: String },

    /// The backend failed while running.
    #[error("Sorter '{backend}' failed: {message}")]
    ExecutionError {
        backend: String,
        message: String,
        diagnostic: Option<String>,
    },

    /// The backend claimed success but its artifacts are absent or corrupt.
    #[error("Result missing in {path}: {reason}")]
    ResultMissing { path: PathBuf, reason: String },

    /// A lifecycle was driven out of order.
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Filesystem or process error while preparing a run.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl SortError {
    /// Creates a new unknown backend error.
    pub fn unknown_backend(name: impl Into<String>) -> Self {
        Self::UnknownBackend { name: name.into() }
    }

    /// Creates a new invalid parameter error.
    pub fn invalid_parameter(
        backend: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            backend: backend.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new backend unavailable error.
    pub fn backend_unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new not transportable error.
    pub fn not_transportable(reason: impl Into<String>) -> Self {
        Self::NotTransportable {
            reason: reason.into(),
        }
    }

    /// Creates a new execution error without a diagnostic.
    pub fn execution(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExecutionError {
            backend: backend.into(),
            message: message.into(),
            diagnostic: None,
        }
    }

    /// Creates a new execution error carrying a runtime diagnostic (stderr).
    pub fn execution_with_diagnostic(
        backend: impl Into<String>,
        message: impl Into<String>,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self::ExecutionError {
            backend: backend.into(),
            message: message.into(),
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Creates a new result missing error.
    pub fn result_missing(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ResultMissing {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new IO error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SortError::UnknownBackend { .. } | SortError::AmbiguousBackend { .. } => {
                ErrorKind::UnknownBackend
            }
            SortError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            SortError::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            SortError::UnsupportedConcurrencyModel { .. } => {
                ErrorKind::UnsupportedConcurrencyModel
            }
            SortError::NotTransportable { .. } => ErrorKind::NotTransportable,
            SortError::ExecutionError { .. } => ErrorKind::ExecutionError,
            SortError::ResultMissing { .. } => ErrorKind::ResultMissing,
            SortError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            SortError::Io { .. } => ErrorKind::Io,
            SortError::Serialization { .. } => ErrorKind::Serialization,
        }
    }

    /// Returns the runtime diagnostic attached to an execution error.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            SortError::ExecutionError { diagnostic, .. } => diagnostic.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SortError {
    fn from(err: serde_json::Error) -> Self {
        SortError::serialization(err.to_string())
    }
}

/// Common trait for reportable errors.
///
/// Gives every error a stable code for programmatic handling and a category
/// for grouping, independent of the concrete error type.
pub trait BackendError: std::error::Error {
    /// Get the error code for reporting, e.g. "SORT_001".
    fn code(&self) -> &'static str;

    /// Get a human-readable message describing the error.
    fn message(&self) -> String {
        self.to_string()
    }

    /// Get the error category, e.g. "dispatch" or "run".
    fn category(&self) -> &'static str;
}

impl BackendError for SortError {
    fn code(&self) -> &'static str {
        match self {
            SortError::UnknownBackend { .. } => "SORT_001",
            SortError::AmbiguousBackend { .. } => "SORT_002",
            SortError::InvalidParameter { .. } => "SORT_003",
            SortError::BackendUnavailable { .. } => "SORT_004",
            SortError::UnsupportedConcurrencyModel { .. } => "SORT_005",
            SortError::NotTransportable { .. } => "SORT_006",
            SortError::ExecutionError { .. } => "SORT_007",
            SortError::ResultMissing { .. } => "SORT_008",
            SortError::InvalidTransition { .. } => "SORT_009",
            SortError::Io { .. } => "SORT_010",
            SortError::Serialization { .. } => "SORT_011",
        }
    }

    fn category(&self) -> &'static str {
        if self.kind().is_run_failure() {
            "run"
        } else {
            "dispatch"
        }
    }
}

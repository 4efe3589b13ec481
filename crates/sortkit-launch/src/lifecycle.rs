//! Per-run sorter state machine.
//!
//! ```text
//! Created -> ParamsBound -> Running -> Completed
//!                                   \-> Failed
//! ```
//!
//! A [`SorterLifecycle`] is single-use: one recording, one output folder.
//! Calling a step out of order fails with `InvalidTransition`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use sortkit_spec::{
    BackendDescriptor, ExecutionRequest, ParamOverrides, Params, Recording, SortError,
    SortResult, Sorting,
};

use crate::curation;

/// Run log file written into the output folder.
pub const LOG_FILE: &str = "sortkit_log.json";

/// Resolved parameters file written into the output folder.
pub const PARAMS_FILE: &str = "sortkit_params.json";

/// State of a [`SorterLifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    ParamsBound,
    Running,
    Completed,
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::ParamsBound => "params_bound",
            LifecycleState::Running => "running",
            LifecycleState::Completed => "completed",
            LifecycleState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Completed | LifecycleState::Failed)
    }
}

/// Contents of `sortkit_log.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunLog {
    pub sorter_name: String,
    pub sorter_version: String,
    pub datetime: DateTime<Utc>,
    /// Run time in seconds.
    pub run_time: f64,
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Removes a pre-existing folder and creates it empty.
pub fn prepare_output_folder(path: &Path) -> SortResult<()> {
    if path.exists() {
        tracing::debug!(path = %path.display(), "clearing existing output folder");
        fs::remove_dir_all(path).map_err(|e| SortError::io(path, e))?;
    }
    fs::create_dir_all(path).map_err(|e| SortError::io(path, e))
}

/// Drives one backend through setup, run and collect.
#[derive(Debug)]
pub struct SorterLifecycle<'a> {
    descriptor: &'a BackendDescriptor,
    recording: Arc<dyn Recording>,
    output_folder: PathBuf,
    params: Option<Params>,
    state: LifecycleState,
    sorting: Option<Sorting>,
}

impl<'a> SorterLifecycle<'a> {
    pub fn new(
        descriptor: &'a BackendDescriptor,
        recording: Arc<dyn Recording>,
        output_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            descriptor,
            recording,
            output_folder: output_folder.into(),
            params: None,
            state: LifecycleState::Created,
            sorting: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    /// Merges overrides over the defaults. The state is unchanged on error.
    pub fn bind_params(&mut self, overrides: &ParamOverrides) -> SortResult<()> {
        self.expect(LifecycleState::Created, LifecycleState::ParamsBound)?;
        let params = self
            .descriptor
            .schema()
            .merge(self.descriptor.name(), overrides)?;
        self.params = Some(params);
        self.state = LifecycleState::ParamsBound;
        Ok(())
    }

    /// Binds an already merged parameter set.
    pub fn bind_resolved(&mut self, params: Params) -> SortResult<()> {
        self.expect(LifecycleState::Created, LifecycleState::ParamsBound)?;
        self.params = Some(params);
        self.state = LifecycleState::ParamsBound;
        Ok(())
    }

    /// Runs the backend to completion or failure.
    ///
    /// Errors from the backend are surfaced as `ExecutionError`; a run that
    /// claims success without valid artifacts is `ResultMissing`.
    pub fn run(&mut self) -> SortResult<()> {
        self.expect(LifecycleState::ParamsBound, LifecycleState::Running)?;
        self.state = LifecycleState::Running;

        let name = self.descriptor.name();
        tracing::info!(
            sorter = name,
            output = %self.output_folder.display(),
            "sorter started"
        );
        let start = Instant::now();
        let outcome = self.execute();
        let run_time = start.elapsed().as_secs_f64();

        if self.output_folder.is_dir() {
            self.write_log(run_time, outcome.as_ref().err());
        }

        match outcome {
            Ok(sorting) => {
                tracing::info!(
                    sorter = name,
                    units = sorting.num_units(),
                    run_time,
                    "sorter completed"
                );
                self.sorting = Some(sorting);
                self.state = LifecycleState::Completed;
                Ok(())
            }
            Err(err) => {
                self.state = LifecycleState::Failed;
                Err(err)
            }
        }
    }

    /// Returns the sorting of a completed run.
    pub fn sorting(&self) -> Option<&Sorting> {
        self.sorting.as_ref()
    }

    /// Consumes a completed lifecycle into its sorting.
    pub fn into_sorting(self) -> SortResult<Sorting> {
        match (self.state, self.sorting) {
            (LifecycleState::Completed, Some(sorting)) => Ok(sorting),
            (state, _) => Err(SortError::InvalidTransition {
                from: state.as_str(),
                to: "collected",
            }),
        }
    }

    fn expect(&self, from: LifecycleState, to: LifecycleState) -> SortResult<()> {
        if self.state == from {
            Ok(())
        } else {
            Err(SortError::InvalidTransition {
                from: self.state.as_str(),
                to: to.as_str(),
            })
        }
    }

    fn execute(&self) -> SortResult<Sorting> {
        let name = self.descriptor.name();
        let params = self.params.as_ref().ok_or(SortError::InvalidTransition {
            from: LifecycleState::Created.as_str(),
            to: LifecycleState::Running.as_str(),
        })?;
        let backend = self.descriptor.backend();
        let recording = self.recording.as_ref();

        prepare_output_folder(&self.output_folder)?;
        write_params(&self.output_folder, params)?;

        backend
            .setup(recording, params, &self.output_folder)
            .and_then(|_| backend.run(recording, params, &self.output_folder))
            .map_err(|err| as_execution_error(name, err))?;

        let sorting = backend.collect(&self.output_folder).map_err(|err| {
            if err.kind().is_run_failure() {
                err
            } else {
                SortError::result_missing(&self.output_folder, err.to_string())
            }
        })?;

        match curation::curation_threshold(self.descriptor.schema(), params) {
            Some(threshold) => curation::curate(recording, &sorting, params, threshold),
            None => Ok(sorting),
        }
    }

    fn write_log(&self, run_time: f64, error: Option<&SortError>) {
        let log = RunLog {
            sorter_name: self.descriptor.name().to_string(),
            sorter_version: self
                .descriptor
                .version()
                .unwrap_or_else(|| "unknown".to_string()),
            datetime: Utc::now(),
            run_time,
            error: error.is_some(),
            error_message: error.map(|e| match e.diagnostic() {
                Some(diagnostic) => format!("{}\n{}", e, diagnostic),
                None => e.to_string(),
            }),
        };
        let path = self.output_folder.join(LOG_FILE);
        let written = serde_json::to_string_pretty(&log)
            .map_err(SortError::from)
            .and_then(|json| fs::write(&path, json).map_err(|e| SortError::io(&path, e)));
        if let Err(err) = written {
            tracing::warn!(path = %path.display(), error = %err, "failed to write run log");
        }
    }
}

fn write_params(dir: &Path, params: &Params) -> SortResult<()> {
    let path = dir.join(PARAMS_FILE);
    let json = serde_json::to_string_pretty(params)?;
    fs::write(&path, json).map_err(|e| SortError::io(&path, e))
}

fn as_execution_error(backend: &str, err: SortError) -> SortError {
    if err.kind().is_run_failure() {
        return err;
    }
    match err.diagnostic() {
        Some(diagnostic) => {
            SortError::execution_with_diagnostic(backend, err.to_string(), diagnostic)
        }
        None => SortError::execution(backend, err.to_string()),
    }
}

/// Runs one request through a fresh lifecycle.
pub fn run_lifecycle(
    descriptor: &BackendDescriptor,
    request: &ExecutionRequest,
) -> SortResult<Sorting> {
    let mut lifecycle = SorterLifecycle::new(
        descriptor,
        Arc::clone(request.recording()),
        request.output_folder(),
    );
    lifecycle.bind_resolved(request.params().clone())?;
    lifecycle.run()?;
    lifecycle.into_sorting()
}

#[cfg(test)]
mod tests;

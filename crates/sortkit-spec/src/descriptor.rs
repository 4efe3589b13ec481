//! Backend descriptors and the backend body trait.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::bridge;
use crate::error::SortResult;
use crate::params::{ParamSchema, Params};
use crate::recording::Recording;
use crate::sorting::Sorting;

/// Worker pool implementation used for parallel partition fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPoolKind {
    /// Scoped OS threads in the calling process.
    Threads,
    /// Blocking tasks on a multi-threaded tokio runtime.
    Tokio,
    /// One worker process per partition.
    Processes,
}

impl WorkerPoolKind {
    /// All pool kinds.
    pub const ALL: [WorkerPoolKind; 3] = [
        WorkerPoolKind::Threads,
        WorkerPoolKind::Tokio,
        WorkerPoolKind::Processes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerPoolKind::Threads => "threads",
            WorkerPoolKind::Tokio => "tokio",
            WorkerPoolKind::Processes => "processes",
        }
    }
}

impl fmt::Display for WorkerPoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerPoolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threads" => Ok(WorkerPoolKind::Threads),
            "tokio" => Ok(WorkerPoolKind::Tokio),
            "processes" => Ok(WorkerPoolKind::Processes),
            other => Err(format!(
                "unknown worker pool '{}', expected threads, tokio or processes",
                other
            )),
        }
    }
}

/// Which worker pools a backend can safely run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCompatibility {
    pub threads: bool,
    pub tokio: bool,
    pub processes: bool,
}

impl PoolCompatibility {
    /// Compatible with every pool.
    pub const fn all() -> Self {
        Self {
            threads: true,
            tokio: true,
            processes: true,
        }
    }

    /// Only isolated worker processes.
    pub const fn processes_only() -> Self {
        Self {
            threads: false,
            tokio: false,
            processes: true,
        }
    }

    pub fn supports(&self, pool: WorkerPoolKind) -> bool {
        match pool {
            WorkerPoolKind::Threads => self.threads,
            WorkerPoolKind::Tokio => self.tokio,
            WorkerPoolKind::Processes => self.processes,
        }
    }

    /// Supported pools in declaration order.
    pub fn supported(&self) -> Vec<WorkerPoolKind> {
        WorkerPoolKind::ALL
            .into_iter()
            .filter(|p| self.supports(*p))
            .collect()
    }
}

impl Default for PoolCompatibility {
    fn default() -> Self {
        Self::all()
    }
}

/// Body of a sorter: the installed check, version probe and lifecycle steps.
///
/// `setup` and `run` write only inside `output_folder`. After a successful
/// `run`, `collect` reads the result back; the default reads the firings
/// contract from the folder.
pub trait SorterBackend: Send + Sync + fmt::Debug {
    /// Returns true if the backend's runtime dependency is present.
    fn is_installed(&self) -> bool;

    /// Returns the backend version, if it can be determined.
    fn version(&self) -> Option<String>;

    /// Stages inputs before the run.
    fn setup(
        &self,
        _recording: &dyn Recording,
        _params: &Params,
        _output_folder: &Path,
    ) -> SortResult<()> {
        Ok(())
    }

    /// Runs the sorter to completion.
    fn run(&self, recording: &dyn Recording, params: &Params, output_folder: &Path)
        -> SortResult<()>;

    /// Reads the sorter's result.
    fn collect(&self, output_folder: &Path) -> SortResult<Sorting> {
        bridge::read_result(output_folder)
    }
}

/// Static description of one registered backend.
#[derive(Debug, Clone)]
pub struct BackendDescriptor {
    name: String,
    description: String,
    installation_message: String,
    schema: ParamSchema,
    compatibility: PoolCompatibility,
    container_image: Option<String>,
    backend: Arc<dyn SorterBackend>,
}

impl BackendDescriptor {
    /// Starts a descriptor for `backend` under `name`.
    pub fn builder(name: impl Into<String>, backend: Arc<dyn SorterBackend>) -> DescriptorBuilder {
        DescriptorBuilder {
            descriptor: BackendDescriptor {
                name: name.into(),
                description: String::new(),
                installation_message: String::new(),
                schema: ParamSchema::default(),
                compatibility: PoolCompatibility::default(),
                container_image: None,
                backend,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn installation_message(&self) -> &str {
        &self.installation_message
    }

    pub fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    pub fn compatibility(&self) -> PoolCompatibility {
        self.compatibility
    }

    pub fn container_image(&self) -> Option<&str> {
        self.container_image.as_deref()
    }

    pub fn backend(&self) -> &Arc<dyn SorterBackend> {
        &self.backend
    }

    /// Shortcut for the backend's installed check.
    pub fn is_installed(&self) -> bool {
        self.backend.is_installed()
    }

    /// Shortcut for the backend's version probe.
    pub fn version(&self) -> Option<String> {
        self.backend.version()
    }

    /// Default parameter set.
    pub fn default_params(&self) -> Params {
        self.schema.defaults()
    }

    /// Returns true if both descriptors share the same backend body.
    pub fn same_backend(&self, other: &BackendDescriptor) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.backend, &other.backend)
    }

    /// Serializable summary for introspection.
    pub fn info(&self) -> DescriptorInfo {
        DescriptorInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            installation_message: self.installation_message.clone(),
            installed: self.is_installed(),
            params: self.schema.clone(),
            compatibility: self.compatibility,
            container_image: self.container_image.clone(),
        }
    }
}

/// Builder for [`BackendDescriptor`].
#[derive(Debug)]
pub struct DescriptorBuilder {
    descriptor: BackendDescriptor,
}

impl DescriptorBuilder {
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.descriptor.description = text.into();
        self
    }

    pub fn installation_message(mut self, text: impl Into<String>) -> Self {
        self.descriptor.installation_message = text.into();
        self
    }

    pub fn schema(mut self, schema: ParamSchema) -> Self {
        self.descriptor.schema = schema;
        self
    }

    pub fn compatibility(mut self, compatibility: PoolCompatibility) -> Self {
        self.descriptor.compatibility = compatibility;
        self
    }

    pub fn container_image(mut self, image: impl Into<String>) -> Self {
        self.descriptor.container_image = Some(image.into());
        self
    }

    pub fn build(self) -> BackendDescriptor {
        self.descriptor
    }
}

/// Introspection view of a descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct DescriptorInfo {
    pub name: String,
    pub description: String,
    pub installation_message: String,
    pub installed: bool,
    pub params: ParamSchema,
    pub compatibility: PoolCompatibility,
    pub container_image: Option<String>,
}

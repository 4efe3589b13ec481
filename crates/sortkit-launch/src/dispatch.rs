//! Request routing.
//!
//! The [`Dispatcher`] resolves a backend, checks that it can run where the
//! caller asked, and hands the request to the local or container launcher.
//! The free functions at the bottom of this module use a process-wide
//! dispatcher over the built-in registry.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use sortkit_spec::{
    ExecutionRequest, ExecutionResult, Params, Recording, RunOptions, SortError, SortResult,
};

use crate::container::{ContainerLauncher, JobRuntime};
use crate::local::LocalLauncher;
use crate::registry::{BackendRef, Registry};

/// Routes requests to a launcher.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    local: LocalLauncher,
    container: ContainerLauncher,
}

impl Dispatcher {
    /// Dispatcher with the default docker and worker process runtimes.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::builder(registry).build()
    }

    pub fn builder(registry: Arc<Registry>) -> DispatcherBuilder {
        DispatcherBuilder {
            registry,
            container_runtime: None,
            process_runtime: None,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn local(&self) -> &LocalLauncher {
        &self.local
    }

    pub fn container(&self) -> &ContainerLauncher {
        &self.container
    }

    /// Runs a sorter on a recording.
    ///
    /// Resolution and availability checks happen before any filesystem or
    /// process side effect.
    pub fn run<'a>(
        &self,
        backend: impl Into<BackendRef<'a>>,
        recording: Arc<dyn Recording>,
        options: &RunOptions,
    ) -> SortResult<ExecutionResult> {
        let descriptor = self.registry.resolve(backend.into())?;
        let name = descriptor.name();

        if options.is_container() {
            let runtime = self.container.runtime();
            if !runtime.is_available() {
                return Err(SortError::backend_unavailable(
                    name,
                    format!("{} runtime is not available", runtime.name()),
                ));
            }
            if descriptor.container_image().is_none() {
                return Err(SortError::backend_unavailable(
                    name,
                    "no container image for this sorter",
                ));
            }
        } else if !descriptor.is_installed() {
            return Err(SortError::backend_unavailable(
                name,
                descriptor.installation_message(),
            ));
        }

        let request = ExecutionRequest::new(descriptor, recording, options)?;
        tracing::info!(
            backend = name,
            container = request.use_container(),
            grouping = ?request.grouping_property(),
            "dispatching sorter run"
        );
        if request.use_container() {
            self.container.launch(descriptor, &request)
        } else {
            self.local.launch(descriptor, &request)
        }
    }
}

/// Builder for [`Dispatcher`].
#[derive(Debug)]
pub struct DispatcherBuilder {
    registry: Arc<Registry>,
    container_runtime: Option<Arc<dyn JobRuntime>>,
    process_runtime: Option<Arc<dyn JobRuntime>>,
}

impl DispatcherBuilder {
    /// Runtime for `use_container` requests. Defaults to docker.
    pub fn container_runtime(mut self, runtime: Arc<dyn JobRuntime>) -> Self {
        self.container_runtime = Some(runtime);
        self
    }

    /// Runtime for the `processes` pool. Defaults to `sortkit run-job` processes.
    pub fn process_runtime(mut self, runtime: Arc<dyn JobRuntime>) -> Self {
        self.process_runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            registry: self.registry,
            local: self
                .process_runtime
                .map(LocalLauncher::new)
                .unwrap_or_default(),
            container: self
                .container_runtime
                .map(ContainerLauncher::new)
                .unwrap_or_default(),
        }
    }
}

static DEFAULT_DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();

/// Process-wide dispatcher over the built-in registry.
pub fn default_dispatcher() -> &'static Dispatcher {
    DEFAULT_DISPATCHER.get_or_init(|| Dispatcher::new(Registry::builtin().into_shared()))
}

/// Runs a built-in sorter.
pub fn run_sorter(
    name: &str,
    recording: Arc<dyn Recording>,
    options: &RunOptions,
) -> SortResult<ExecutionResult> {
    default_dispatcher().run(name, recording, options)
}

/// Every built-in sorter.
pub fn available_sorters() -> Vec<String> {
    names(default_dispatcher().registry().list_available())
}

/// Built-in sorters installed on this host.
pub fn installed_sorters() -> Vec<String> {
    names(default_dispatcher().registry().list_installed())
}

/// Default parameters of a sorter.
pub fn default_params(name: &str) -> SortResult<Params> {
    default_dispatcher()
        .registry()
        .resolve(BackendRef::Name(name))
        .map(|d| d.default_params())
}

/// Parameter descriptions of a sorter.
pub fn params_description(name: &str) -> SortResult<BTreeMap<String, String>> {
    default_dispatcher()
        .registry()
        .resolve(BackendRef::Name(name))
        .map(|d| d.schema().descriptions())
}

/// Summary of a sorter.
pub fn sorter_description(name: &str) -> SortResult<String> {
    default_dispatcher()
        .registry()
        .resolve(BackendRef::Name(name))
        .map(|d| d.description().to_string())
}

/// Versions of installed sorters.
pub fn sorter_versions() -> Vec<(String, String)> {
    default_dispatcher().registry().versions()
}

fn names(list: Vec<&str>) -> Vec<String> {
    list.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sortkit_spec::{ErrorKind, InMemoryRecording};

    fn recording() -> Arc<dyn Recording> {
        Arc::new(InMemoryRecording::new(30000.0, 1, vec![0.0; 10]).unwrap())
    }

    #[test]
    fn test_unknown_backend_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let options = RunOptions::new().output_folder(&out);
        let err = default_dispatcher()
            .run("nosuchsorter", recording(), &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownBackend);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_introspection_helpers() {
        assert_eq!(available_sorters().len(), 6);
        assert!(available_sorters().contains(&"mountainsort4".to_string()));
        let params = default_params("mountainsort4").unwrap();
        assert_eq!(params.get_i64("detect_sign"), Some(-1));
        assert!(params_description("mountainsort4")
            .unwrap()
            .contains_key("detect_threshold"));
        assert!(!sorter_description("mountainsort4").unwrap().is_empty());
        assert_eq!(
            default_params("nope").unwrap_err().kind(),
            ErrorKind::UnknownBackend
        );
    }
}

//! Deterministic stub backends.

use std::path::Path;
use std::sync::Arc;

use sortkit_launch::{Dispatcher, Registry};
use sortkit_spec::bridge::write_result;
use sortkit_spec::{
    BackendDescriptor, ParamSchema, ParamSpec, Params, PoolCompatibility, Recording, SortError,
    SortResult, SorterBackend, Sorting, SpikeEvent,
};

use crate::runtime::InProcessRuntime;

/// Emits unit 0 at frame `frame` (default 10) on the first channel, and
/// fails on recordings holding channel `fail_channel`.
pub const STUB: &str = "stub";

/// Emits like [`STUB`] but only allows the `processes` pool.
pub const ISOLATED: &str = "isolated";

/// Always fails with a diagnostic.
pub const FAILING: &str = "failing";

/// Claims success without writing a result.
pub const SILENT: &str = "silent";

/// Reports itself as not installed.
pub const UNINSTALLED: &str = "uninstalled";

/// Stderr text attached to every failure of the failing stub.
pub const FAILING_DIAGNOSTIC: &str = "stub: segmentation fault in clustering";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Emit,
    Fail,
    Silent,
}

#[derive(Debug)]
struct StubBackend {
    behavior: Behavior,
    installed: bool,
}

impl SorterBackend for StubBackend {
    fn is_installed(&self) -> bool {
        self.installed
    }

    fn version(&self) -> Option<String> {
        Some("0.0.1".to_string())
    }

    fn run(&self, recording: &dyn Recording, params: &Params, out: &Path) -> SortResult<()> {
        match self.behavior {
            Behavior::Emit => {
                let channels = recording.channel_ids();
                if let Some(fail) = params.get_i64("fail_channel") {
                    if channels.iter().any(|&c| i64::from(c) == fail) {
                        return Err(SortError::execution(
                            "stub",
                            format!("channel {} is broken", fail),
                        ));
                    }
                }
                let channel = channels.first().copied().unwrap_or(0);
                let frame = params.get_i64("frame").unwrap_or(10).max(0) as u64;
                let sorting = Sorting::from_events(
                    recording.sampling_frequency(),
                    vec![SpikeEvent::new(channel, frame, 0)],
                );
                write_result(&sorting, out)
            }
            Behavior::Fail => Err(SortError::execution_with_diagnostic(
                "failing",
                "sorter exited with code 139",
                FAILING_DIAGNOSTIC,
            )),
            Behavior::Silent => Ok(()),
        }
    }
}

fn stub(name: &str, behavior: Behavior, installed: bool) -> BackendDescriptor {
    BackendDescriptor::builder(name, Arc::new(StubBackend { behavior, installed }))
        .description(format!("{} test sorter", name))
        .installation_message(format!("{} cannot be installed", name))
        .schema(ParamSchema::new(vec![
            ParamSpec::int("frame", 10, "Frame of the emitted spike").range(0.0, 1e9),
            ParamSpec::optional_int("fail_channel", None, "Channel that makes the run fail"),
        ]))
        .container_image(format!("sortkit/{}:test", name))
        .build()
}

/// Registry of the stub backends.
pub fn stub_registry() -> Arc<Registry> {
    Registry::builder()
        .register(stub(STUB, Behavior::Emit, true))
        .register(
            BackendDescriptor::builder(
                ISOLATED,
                Arc::new(StubBackend {
                    behavior: Behavior::Emit,
                    installed: true,
                }),
            )
            .compatibility(PoolCompatibility::processes_only())
            .container_image(format!("sortkit/{}:test", ISOLATED))
            .build(),
        )
        .register(stub(FAILING, Behavior::Fail, true))
        .register(stub(SILENT, Behavior::Silent, true))
        .register(stub(UNINSTALLED, Behavior::Emit, false))
        .build()
        .expect("stub registry is valid")
        .into_shared()
}

/// Dispatcher over the stubs whose container and process runtimes both
/// execute jobs in this process.
pub fn stub_dispatcher() -> Dispatcher {
    let registry = stub_registry();
    let runtime = Arc::new(InProcessRuntime::new(Arc::clone(&registry)));
    Dispatcher::builder(registry)
        .container_runtime(runtime.clone())
        .process_runtime(runtime)
        .build()
}

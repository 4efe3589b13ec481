use super::*;
use pretty_assertions::assert_eq;
use sortkit_spec::bridge::{self, FIRINGS_FILE};
use sortkit_spec::{
    ErrorKind, InMemoryRecording, ParamSchema, ParamSpec, ParamValue, SorterBackend, SpikeEvent,
    UnitKey,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Ok,
    Fail,
    NoArtifacts,
}

#[derive(Debug)]
struct Stub {
    mode: Mode,
}

impl SorterBackend for Stub {
    fn is_installed(&self) -> bool {
        true
    }

    fn version(&self) -> Option<String> {
        Some("0.1".into())
    }

    fn run(&self, recording: &dyn Recording, params: &Params, out: &Path) -> SortResult<()> {
        match self.mode {
            Mode::Ok => {
                let frame = params.get_i64("frame").unwrap_or(10) as u64;
                let sorting = Sorting::from_events(
                    recording.sampling_frequency(),
                    vec![SpikeEvent::new(0, frame, 0)],
                );
                bridge::write_result(&sorting, out)
            }
            Mode::Fail => Err(SortError::execution_with_diagnostic(
                "stub",
                "injected failure",
                "stub stderr",
            )),
            Mode::NoArtifacts => Ok(()),
        }
    }
}

fn descriptor(mode: Mode) -> BackendDescriptor {
    BackendDescriptor::builder("stub", Arc::new(Stub { mode }))
        .schema(ParamSchema::new(vec![ParamSpec::int("frame", 10, "Spike frame")]))
        .build()
}

fn recording() -> Arc<dyn Recording> {
    Arc::new(InMemoryRecording::new(30000.0, 2, vec![0.0; 200]).unwrap())
}

#[test]
fn test_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let descriptor = descriptor(Mode::Ok);
    let mut lifecycle = SorterLifecycle::new(&descriptor, recording(), &out);
    assert_eq!(lifecycle.state(), LifecycleState::Created);

    let mut overrides = ParamOverrides::new();
    overrides.insert("frame".into(), ParamValue::Int(42));
    lifecycle.bind_params(&overrides).unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::ParamsBound);

    lifecycle.run().unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Completed);
    assert!(out.join(FIRINGS_FILE).is_file());
    assert!(out.join(LOG_FILE).is_file());
    assert!(out.join(PARAMS_FILE).is_file());

    let sorting = lifecycle.into_sorting().unwrap();
    assert_eq!(
        sorting.spike_train(&UnitKey::label(0)).unwrap().frames,
        vec![42]
    );
}

#[test]
fn test_out_of_order_calls() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = descriptor(Mode::Ok);
    let mut lifecycle = SorterLifecycle::new(&descriptor, recording(), dir.path().join("o"));

    let err = lifecycle.run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(lifecycle.state(), LifecycleState::Created);

    lifecycle.bind_resolved(descriptor.default_params()).unwrap();
    let err = lifecycle.bind_resolved(descriptor.default_params()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    lifecycle.run().unwrap();
    let err = lifecycle.run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(lifecycle.state(), LifecycleState::Completed);
}

#[test]
fn test_invalid_params_keep_created() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = descriptor(Mode::Ok);
    let mut lifecycle = SorterLifecycle::new(&descriptor, recording(), dir.path().join("o"));
    let mut overrides = ParamOverrides::new();
    overrides.insert("unknown".into(), ParamValue::Int(1));
    let err = lifecycle.bind_params(&overrides).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    assert_eq!(lifecycle.state(), LifecycleState::Created);
}

#[test]
fn test_backend_failure() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("o");
    let descriptor = descriptor(Mode::Fail);
    let mut lifecycle = SorterLifecycle::new(&descriptor, recording(), &out);
    lifecycle.bind_resolved(descriptor.default_params()).unwrap();

    let err = lifecycle.run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionError);
    assert_eq!(err.diagnostic(), Some("stub stderr"));
    assert_eq!(lifecycle.state(), LifecycleState::Failed);

    let log: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join(LOG_FILE)).unwrap()).unwrap();
    assert_eq!(log["error"], true);
    assert_eq!(log["sorter_name"], "stub");
    assert!(lifecycle.into_sorting().is_err());
}

#[test]
fn test_missing_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = descriptor(Mode::NoArtifacts);
    let mut lifecycle = SorterLifecycle::new(&descriptor, recording(), dir.path().join("o"));
    lifecycle.bind_resolved(descriptor.default_params()).unwrap();
    let err = lifecycle.run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResultMissing);
    assert_eq!(lifecycle.state(), LifecycleState::Failed);
}

#[test]
fn test_stale_artifacts_are_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("o");

    let ok = descriptor(Mode::Ok);
    let mut first = SorterLifecycle::new(&ok, recording(), &out);
    first.bind_resolved(ok.default_params()).unwrap();
    first.run().unwrap();
    assert!(out.join(FIRINGS_FILE).is_file());

    let lying = descriptor(Mode::NoArtifacts);
    let mut second = SorterLifecycle::new(&lying, recording(), &out);
    second.bind_resolved(lying.default_params()).unwrap();
    assert_eq!(second.run().unwrap_err().kind(), ErrorKind::ResultMissing);
    assert!(!out.join(FIRINGS_FILE).exists());
}

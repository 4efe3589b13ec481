use super::*;
use pretty_assertions::assert_eq;
use sortkit_spec::bridge::{self, FIRINGS_FILE};
use sortkit_spec::{
    ErrorKind, InMemoryRecording, Params, PoolCompatibility, RunOptions, SorterBackend,
    SpikeEvent, UnitKey, WorkerCount, GROUP_PROPERTY,
};

/// Emits unit 0 at frame 10 on the first channel; fails on `fail_on`.
#[derive(Debug)]
struct Stub {
    fail_on: Option<u32>,
}

impl SorterBackend for Stub {
    fn is_installed(&self) -> bool {
        true
    }

    fn version(&self) -> Option<String> {
        None
    }

    fn run(&self, recording: &dyn Recording, _: &Params, out: &Path) -> SortResult<()> {
        let channels = recording.channel_ids();
        if self.fail_on.is_some_and(|c| channels.contains(&c)) {
            return Err(SortError::execution("stub", "injected failure"));
        }
        let sorting = Sorting::from_events(
            recording.sampling_frequency(),
            vec![SpikeEvent::new(channels[0], 10, 0)],
        );
        bridge::write_result(&sorting, out)
    }
}

fn descriptor(fail_on: Option<u32>) -> BackendDescriptor {
    BackendDescriptor::builder("stub", Arc::new(Stub { fail_on })).build()
}

fn grouped() -> Arc<dyn Recording> {
    let groups = ["A", "A", "B", "B"].iter().map(|g| g.to_string()).collect();
    Arc::new(
        InMemoryRecording::new(30000.0, 4, vec![0.0; 4 * 100])
            .unwrap()
            .with_property(GROUP_PROPERTY, groups)
            .unwrap(),
    )
}

fn request(descriptor: &BackendDescriptor, out: &Path, options: RunOptions) -> ExecutionRequest {
    ExecutionRequest::new(descriptor, grouped(), &options.output_folder(out)).unwrap()
}

fn launch(descriptor: &BackendDescriptor, request: &ExecutionRequest) -> SortResult<ExecutionResult> {
    LocalLauncher::default().launch(descriptor, request)
}

#[test]
fn test_single_run() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let stub = descriptor(None);
    let result = launch(&stub, &request(&stub, &out, RunOptions::new())).unwrap();

    let report = result.report().unwrap();
    assert_eq!(report.output_folder, out);
    assert!(!report.is_partial());
    assert_eq!(report.sorting.unit_keys().collect::<Vec<_>>(), vec![&UnitKey::label(0)]);
    assert!(out.join(FIRINGS_FILE).is_file());
}

#[test]
fn test_partitions_carry_provenance() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let stub = descriptor(None);
    let options = RunOptions::new().grouping_property(GROUP_PROPERTY);
    let sorting = launch(&stub, &request(&stub, &out, options))
        .unwrap()
        .into_sorting()
        .unwrap();

    let keys: Vec<_> = sorting.unit_keys().cloned().collect();
    assert_eq!(
        keys,
        vec![UnitKey::in_partition("A", 0), UnitKey::in_partition("B", 0)]
    );
    assert_eq!(
        sorting.spike_train(&keys[1]).unwrap().channels,
        vec![2]
    );
    assert!(out.join("A").join(FIRINGS_FILE).is_file());
    assert!(out.join("B").join(FIRINGS_FILE).is_file());
}

#[test]
fn test_parallel_matches_sequential() {
    let dir = tempfile::tempdir().unwrap();
    let stub = descriptor(None);
    let base = RunOptions::new().grouping_property(GROUP_PROPERTY);

    let sequential = launch(&stub, &request(&stub, &dir.path().join("seq"), base.clone()))
        .unwrap()
        .into_sorting()
        .unwrap();
    for pool in [WorkerPoolKind::Threads, WorkerPoolKind::Tokio] {
        let options = base
            .clone()
            .parallel(true)
            .pool(pool)
            .worker_count(WorkerCount::fixed(2));
        let out = dir.path().join(pool.as_str());
        let parallel = launch(&stub, &request(&stub, &out, options))
            .unwrap()
            .into_sorting()
            .unwrap();
        assert_eq!(parallel, sequential);
    }
}

#[test]
fn test_missing_property_is_rejected_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let stub = descriptor(None);
    let options = RunOptions::new().grouping_property("shank");
    let err = launch(&stub, &request(&stub, &out, options)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    assert!(!out.exists());
}

#[test]
fn test_incompatible_pool_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let stub = BackendDescriptor::builder("stub", Arc::new(Stub { fail_on: None }))
        .compatibility(PoolCompatibility::processes_only())
        .build();
    let options = RunOptions::new()
        .grouping_property(GROUP_PROPERTY)
        .parallel(true)
        .pool(WorkerPoolKind::Threads);
    let err = launch(&stub, &request(&stub, &out, options)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedConcurrencyModel);
    assert!(!out.exists());
}

#[test]
fn test_processes_pool_needs_dumpable_recording() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let stub = descriptor(None);
    let options = RunOptions::new()
        .grouping_property(GROUP_PROPERTY)
        .parallel(true)
        .pool(WorkerPoolKind::Processes);
    let err = launch(&stub, &request(&stub, &out, options)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotTransportable);
    assert!(!out.exists());
}

#[test]
fn test_failed_partition_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let stub = descriptor(Some(2));
    let options = RunOptions::new()
        .grouping_property(GROUP_PROPERTY)
        .raise_on_error(false);
    let result = launch(&stub, &request(&stub, &dir.path().join("o"), options)).unwrap();

    let report = result.report().unwrap();
    assert!(report.is_partial());
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].partition, "B");
    assert_eq!(report.dropped[0].failure.kind, ErrorKind::ExecutionError);
    assert_eq!(
        report.sorting.unit_keys().collect::<Vec<_>>(),
        vec![&UnitKey::in_partition("A", 0)]
    );
}

#[test]
fn test_failed_partition_aborts_when_raising() {
    let dir = tempfile::tempdir().unwrap();
    let stub = descriptor(Some(0));
    let options = RunOptions::new()
        .grouping_property(GROUP_PROPERTY)
        .parallel(true)
        .pool(WorkerPoolKind::Threads);
    let err = launch(&stub, &request(&stub, &dir.path().join("o"), options)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionError);
}

#[test]
fn test_failure_is_recorded_without_raising() {
    let dir = tempfile::tempdir().unwrap();
    let stub = descriptor(Some(0));
    let options = RunOptions::new().raise_on_error(false);
    let result = launch(&stub, &request(&stub, &dir.path().join("o"), options)).unwrap();
    let failure = result.failure().unwrap();
    assert_eq!(failure.backend, "stub");
    assert_eq!(failure.kind, ErrorKind::ExecutionError);
    assert!(result.sorting().is_none());
}

#[test]
fn test_every_partition_failing_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    #[derive(Debug)]
    struct AlwaysFails;
    impl SorterBackend for AlwaysFails {
        fn is_installed(&self) -> bool {
            true
        }
        fn version(&self) -> Option<String> {
            None
        }
        fn run(&self, _: &dyn Recording, _: &Params, _: &Path) -> SortResult<()> {
            Err(SortError::execution("always", "nope"))
        }
    }
    let stub = BackendDescriptor::builder("always", Arc::new(AlwaysFails)).build();
    let options = RunOptions::new()
        .grouping_property(GROUP_PROPERTY)
        .raise_on_error(false);
    let result = launch(&stub, &request(&stub, &dir.path().join("o"), options)).unwrap();
    assert_eq!(result.failure().unwrap().kind, ErrorKind::ExecutionError);
}

#[test]
fn test_delete_output_folder() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let stub = descriptor(None);
    let options = RunOptions::new().delete_output_folder(true);
    let result = launch(&stub, &request(&stub, &out, options)).unwrap();
    assert!(result.is_completed());
    assert!(!out.exists());
}

#[test]
fn test_group_keys_must_be_folder_names() {
    assert!(is_folder_name("A"));
    assert!(is_folder_name("shank 1"));
    for key in ["", ".", "..", "/abs", "a/b", "a/"] {
        assert!(!is_folder_name(key), "{:?}", key);
    }

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let groups = ["..", "..", "B", "B"].iter().map(|g| g.to_string()).collect();
    let recording: Arc<dyn Recording> = Arc::new(
        InMemoryRecording::new(30000.0, 4, vec![0.0; 4 * 100])
            .unwrap()
            .with_property(GROUP_PROPERTY, groups)
            .unwrap(),
    );
    let stub = descriptor(None);
    let options = RunOptions::new()
        .grouping_property(GROUP_PROPERTY)
        .output_folder(&out);
    let request = ExecutionRequest::new(&stub, recording, &options).unwrap();
    let err = launch(&stub, &request).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    assert!(!out.exists());
}

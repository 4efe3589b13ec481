//! Integration tests for partitioned runs.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sortkit-tests --test partitioning
//! ```

use std::fs;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use sortkit_spec::bridge::FIRINGS_FILE;
use sortkit_spec::{
    ErrorKind, InMemoryRecording, Recording, RunOptions, Sorting, UnitKey, WorkerCount,
    WorkerPoolKind, GROUP_PROPERTY,
};
use sortkit_tests::{grouped_recording, in_memory_recording, stub_dispatcher, GroupedFixture, STUB};

fn run(fixture: &GroupedFixture, folder: &str, options: RunOptions) -> Sorting {
    stub_dispatcher()
        .run(
            STUB,
            Arc::clone(&fixture.recording),
            &options.output_folder(fixture.path().join(folder)),
        )
        .unwrap()
        .into_sorting()
        .unwrap()
}

fn grouped() -> RunOptions {
    RunOptions::new().grouping_property(GROUP_PROPERTY)
}

#[test]
fn groups_become_partitioned_units() {
    let fixture = grouped_recording();
    let sorting = run(&fixture, "seq", grouped());

    let keys: Vec<UnitKey> = sorting.unit_keys().cloned().collect();
    assert_eq!(
        keys,
        vec![UnitKey::in_partition("A", 0), UnitKey::in_partition("B", 0)]
    );
    assert_eq!(
        keys.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
        vec!["A/0", "B/0"]
    );
    assert!(sorting.is_partitioned());
    assert_eq!(sorting.spike_train(&keys[0]).unwrap().frames, vec![10]);
    assert_eq!(sorting.spike_train(&keys[0]).unwrap().channels, vec![0]);
    assert_eq!(sorting.spike_train(&keys[1]).unwrap().channels, vec![2]);

    let out = fixture.path().join("seq");
    assert!(out.join("A").join(FIRINGS_FILE).is_file());
    assert!(out.join("B").join(FIRINGS_FILE).is_file());
}

#[test]
fn parallel_pools_match_sequential() {
    let fixture = grouped_recording();
    let sequential = run(&fixture, "seq", grouped());

    for pool in WorkerPoolKind::ALL {
        let options = grouped()
            .parallel(true)
            .pool(pool)
            .worker_count(WorkerCount::fixed(2));
        let parallel = run(&fixture, pool.as_str(), options);
        assert_eq!(parallel, sequential, "pool {}", pool);
    }
}

#[test]
fn all_workers_matches_single_worker() {
    let fixture = grouped_recording();
    let one = run(
        &fixture,
        "one",
        grouped()
            .parallel(true)
            .pool(WorkerPoolKind::Threads)
            .worker_count(WorkerCount::fixed(1)),
    );
    let all = run(
        &fixture,
        "all",
        grouped()
            .parallel(true)
            .pool(WorkerPoolKind::Threads)
            .worker_count(WorkerCount::All),
    );
    assert_eq!(one, all);
}

#[test]
fn processes_pool_rejects_in_memory_recording() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let err = stub_dispatcher()
        .run(
            STUB,
            in_memory_recording(),
            &grouped()
                .parallel(true)
                .pool(WorkerPoolKind::Processes)
                .output_folder(&out),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotTransportable);
    assert!(!out.exists());
}

#[test]
fn in_memory_recording_runs_on_threads() {
    let dir = tempfile::tempdir().unwrap();
    let sorting = stub_dispatcher()
        .run(
            STUB,
            in_memory_recording(),
            &grouped()
                .parallel(true)
                .pool(WorkerPoolKind::Threads)
                .output_folder(dir.path().join("out")),
        )
        .unwrap()
        .into_sorting()
        .unwrap();
    assert_eq!(sorting.num_units(), 2);
}

#[test]
fn missing_grouping_property() {
    let fixture = grouped_recording();
    let out = fixture.path().join("out");
    let err = stub_dispatcher()
        .run(
            STUB,
            Arc::clone(&fixture.recording),
            &RunOptions::new()
                .grouping_property("shank")
                .output_folder(&out),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    assert!(!out.exists());
}

#[test]
fn group_values_that_escape_the_output_are_rejected() {
    let root = tempfile::tempdir().unwrap();
    let project = root.path().join("project");
    fs::create_dir(&project).unwrap();
    let precious = project.join("precious.txt");
    fs::write(&precious, "keep").unwrap();
    let out = project.join("out");

    for bad in ["..", ".", "", "/abs", "a/b", "a/"] {
        let groups = vec![bad.to_string(), bad.to_string(), "B".into(), "B".into()];
        let recording: Arc<dyn Recording> = Arc::new(
            InMemoryRecording::new(30000.0, 4, vec![0.0; 4 * 50])
                .unwrap()
                .with_property(GROUP_PROPERTY, groups)
                .unwrap(),
        );
        let err = stub_dispatcher()
            .run(STUB, recording, &grouped().output_folder(&out))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter, "group {:?}", bad);
        assert!(!out.exists());
        assert!(precious.is_file());
    }
}

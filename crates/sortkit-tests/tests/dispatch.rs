//! Integration tests for backend resolution and dispatch-time validation.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sortkit-tests --test dispatch
//! ```

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sortkit_launch::{BackendRef, Dispatcher};
use sortkit_spec::{ErrorKind, RunOptions};
use sortkit_tests::{
    count_entries, grouped_recording, in_memory_recording, stub_dispatcher, stub_registry,
    InProcessRuntime, STUB, UNINSTALLED,
};

#[test]
fn unknown_backend_creates_nothing() {
    let fixture = grouped_recording();
    let before = count_entries(fixture.path());
    let options = RunOptions::new().output_folder(fixture.path().join("out"));

    let err = stub_dispatcher()
        .run("does-not-exist", Arc::clone(&fixture.recording), &options)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnknownBackend);
    assert_eq!(count_entries(fixture.path()), before);
}

#[test]
fn name_and_reference_resolve_identically() {
    let fixture = grouped_recording();
    let dispatcher = stub_dispatcher();
    let descriptor = dispatcher
        .registry()
        .resolve(BackendRef::Name(STUB))
        .unwrap()
        .clone();

    let by_name = dispatcher
        .run(
            STUB,
            Arc::clone(&fixture.recording),
            &RunOptions::new()
                .output_folder(fixture.path().join("by_name"))
                .param("frame", 25i64),
        )
        .unwrap();
    let by_ref = dispatcher
        .run(
            &descriptor,
            Arc::clone(&fixture.recording),
            &RunOptions::new()
                .output_folder(fixture.path().join("by_ref"))
                .param("frame", 25i64),
        )
        .unwrap();

    assert_eq!(by_name.sorting(), by_ref.sorting());
    let train = by_name.sorting().unwrap().units().next().unwrap().1;
    assert_eq!(train.frames, vec![25]);
}

#[test]
fn unknown_parameter_is_rejected_before_writing() {
    let fixture = grouped_recording();
    let out = fixture.path().join("out");
    let err = stub_dispatcher()
        .run(
            STUB,
            Arc::clone(&fixture.recording),
            &RunOptions::new().output_folder(&out).param("fram", 3i64),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    assert!(!out.exists());
}

#[test]
fn uninstalled_backend_is_unavailable() {
    let fixture = grouped_recording();
    let out = fixture.path().join("out");
    let err = stub_dispatcher()
        .run(
            UNINSTALLED,
            Arc::clone(&fixture.recording),
            &RunOptions::new().output_folder(&out),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert!(err.to_string().contains("cannot be installed"));
    assert!(!out.exists());
}

#[test]
fn container_run_requires_runtime() {
    let fixture = grouped_recording();
    let registry = stub_registry();
    let dispatcher = Dispatcher::builder(Arc::clone(&registry))
        .container_runtime(Arc::new(InProcessRuntime::unavailable(registry)))
        .build();
    let out = fixture.path().join("out");
    let err = dispatcher
        .run(
            STUB,
            Arc::clone(&fixture.recording),
            &RunOptions::new().output_folder(&out).use_container(true),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert!(!out.exists());
}

#[test]
fn container_run_requires_transportable_recording() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let err = stub_dispatcher()
        .run(
            STUB,
            in_memory_recording(),
            &RunOptions::new().output_folder(&out).use_container(true),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotTransportable);
    assert!(!out.exists());
}

#[test]
fn introspection() {
    let dispatcher = stub_dispatcher();
    let registry = dispatcher.registry();
    assert_eq!(
        registry.list_available(),
        vec!["failing", "isolated", "silent", "stub", "uninstalled"]
    );
    assert_eq!(
        registry.list_installed(),
        vec!["failing", "isolated", "silent", "stub"]
    );

    let info = registry.describe(STUB).unwrap();
    assert_eq!(info.description, "stub test sorter");
    assert_eq!(info.container_image.as_deref(), Some("sortkit/stub:test"));

    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["name"], "stub");
}

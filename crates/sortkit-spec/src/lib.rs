//! sortkit data model
//!
//! This crate provides the types shared by every sortkit crate: errors,
//! parameter schemas, recordings, sortings, backend descriptors, run
//! options and results, the container job message, and the on-disk result
//! contract between a sorter and the orchestrator.
//!
//! # Example
//!
//! ```
//! use sortkit_spec::{Sorting, SpikeEvent};
//! use sortkit_spec::bridge::{read_result, write_result};
//!
//! let sorting = Sorting::from_events(30000.0, vec![SpikeEvent::new(0, 10, 1)]);
//! let dir = tempfile::tempdir().unwrap();
//! write_result(&sorting, dir.path()).unwrap();
//! assert_eq!(read_result(dir.path()).unwrap(), sorting);
//! ```
//!
//! # Modules
//!
//! - [`error`]: error taxonomy and stable error codes
//! - [`params`]: typed parameter schemas and merged parameter sets
//! - [`recording`]: the read-only recording capability and its implementations
//! - [`sorting`]: units and spike trains
//! - [`bridge`]: `firings.mda` / `samplerate.txt` and the JSON archive
//! - [`descriptor`]: backend descriptors and the backend body trait
//! - [`request`]: run options, execution requests and results
//! - [`job`]: the container job message

pub mod bridge;
pub mod descriptor;
pub mod error;
pub mod job;
pub mod params;
pub mod recording;
pub mod request;
pub mod sorting;

pub use descriptor::{
    BackendDescriptor, DescriptorBuilder, DescriptorInfo, PoolCompatibility, SorterBackend,
    WorkerPoolKind,
};
pub use error::{BackendError, ErrorKind, SortError, SortResult};
pub use job::{BindMount, ContainerJob, JobBody};
pub use params::{
    ParamConstraint, ParamKind, ParamOverrides, ParamSchema, ParamSpec, ParamValue, Params,
};
pub use recording::{
    split_by_property, BinaryRecording, BinaryRecordingInfo, ChannelSliceRecording,
    InMemoryRecording, Recording, RecordingDump, SampleType, GROUP_PROPERTY,
};
pub use request::{
    default_output_folder, ExecutionRequest, ExecutionResult, FailureRecord, PartitionFailure,
    RunOptions, SortingReport, WorkerCount,
};
pub use sorting::{Sorting, SpikeEvent, SpikeTrain, UnitKey};

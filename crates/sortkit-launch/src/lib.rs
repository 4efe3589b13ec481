//! sortkit orchestration
//!
//! This crate runs spike sorters. It resolves a backend from the
//! [`Registry`], validates the request, and runs it either on this host
//! ([`LocalLauncher`]) or through a job runtime ([`ContainerLauncher`]).
//!
//! # Overview
//!
//! - **Registry** - immutable catalog of backend descriptors
//! - **Dispatcher** - resolution, availability checks and routing
//! - **LocalLauncher** - single runs and partitioned runs over worker pools
//! - **SorterLifecycle** - the per-run state machine
//! - **ContainerLauncher** - job submission to docker or worker processes
//!
//! # Partitioning
//!
//! With a grouping property set, the recording is split into one channel
//! slice per property value. Each slice runs in `<output>/<group>` and the
//! results are merged into one sorting whose units carry their group key.
//! Partitions run sequentially, or in parallel on one of three pools:
//!
//! | Pool | Workers |
//! |------|---------|
//! | `threads` | scoped OS threads |
//! | `tokio` | blocking tasks on a multi-threaded tokio runtime |
//! | `processes` | `sortkit run-job` worker processes |
//!
//! # Example
//!
//! ```ignore
//! use sortkit_launch::run_sorter;
//! use sortkit_spec::{RecordingDump, RunOptions};
//!
//! let recording = dump.load()?;
//! let options = RunOptions::new()
//!     .output_folder("ms4_output")
//!     .grouping_property("group")
//!     .param("detect_threshold", 4.0);
//! let result = run_sorter("mountainsort4", recording, &options)?;
//! println!("units: {}", result.sorting().map_or(0, |s| s.num_units()));
//! ```

pub mod capability;
pub mod container;
pub mod curation;
pub mod dispatch;
pub mod lifecycle;
pub mod local;
pub mod pool;
pub mod registry;

pub use capability::Capabilities;
pub use container::{
    execute_job, run_job_file, ContainerLauncher, DockerConfig, DockerRuntime, JobHandle,
    JobOutcome, JobRuntime, JobSubmission, ProcessConfig, ProcessRuntime,
};
pub use dispatch::{
    available_sorters, default_dispatcher, default_params, installed_sorters,
    params_description, run_sorter, sorter_description, sorter_versions, Dispatcher,
    DispatcherBuilder,
};
pub use lifecycle::{run_lifecycle, LifecycleState, RunLog, SorterLifecycle};
pub use local::LocalLauncher;
pub use pool::{PartitionExecutor, PartitionOutcome, PartitionTask};
pub use registry::{BackendRef, Registry, RegistryBuilder, RegistryError};

//! sortkit End-to-End Test Infrastructure
//!
//! Stub backends, recording fixtures and an in-process job runtime for the
//! integration tests under `tests/`:
//!
//! - **dispatch**: resolution and fail-fast validation
//! - **partitioning**: grouped runs across every pool
//! - **container**: job round trips through a runtime
//! - **failure_policy**: raise-on-error in both settings
//! - **result_bridge**: the on-disk result contract
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sortkit-tests
//! ```

pub mod fixtures;
pub mod runtime;
pub mod stubs;

pub use fixtures::{count_entries, grouped_recording, in_memory_recording, GroupedFixture};
pub use runtime::InProcessRuntime;
pub use stubs::{stub_dispatcher, stub_registry, FAILING, ISOLATED, SILENT, STUB, UNINSTALLED};

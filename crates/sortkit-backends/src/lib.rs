//! sortkit built-in backends
//!
//! This crate provides the catalog of built-in sorters and the generic
//! backend body that drives a sorter shipped as an external executable.
//!
//! # External executables
//!
//! Each built-in sorter is invoked through a bridge executable. It is
//! searched for in:
//!
//! 1. An explicit path in [`ExternalSorterConfig`]
//! 2. The `SORTKIT_<NAME>_PATH` environment variable
//! 3. `sortkit-<name>` on the system PATH
//!
//! A sorter whose executable cannot be found is reported as not installed.

pub mod catalog;
pub mod error;
pub mod external;

pub use catalog::builtin_descriptors;
pub use error::{ExternalError, ExternalResult};
pub use external::{executable_env_var, write_traces, ExternalSorter, ExternalSorterConfig};

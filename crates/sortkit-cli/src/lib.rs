//! sortkit CLI library.
//!
//! This crate provides the command implementations behind the `sortkit`
//! binary, including the `run-job` worker entry point used inside
//! containers and by the `processes` pool.

pub mod commands;
pub mod logging;

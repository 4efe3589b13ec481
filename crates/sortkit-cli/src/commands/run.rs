//! Run command implementation
//!
//! Runs a sorter on a recording described by a dump file.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sortkit_launch::Dispatcher;
use sortkit_spec::{ParamValue, RecordingDump, RunOptions, WorkerCount, WorkerPoolKind};

use super::reporting;

/// Arguments of `sortkit run`.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub sorter: String,
    pub recording: PathBuf,
    pub output: Option<PathBuf>,
    pub params: Vec<String>,
    pub grouping: Option<String>,
    pub parallel: bool,
    pub jobs: Option<usize>,
    pub pool: Option<String>,
    pub docker: bool,
    pub keep_going: bool,
    pub delete_output: bool,
}

/// Reads a recording dump from a JSON file.
pub fn load_recording(path: &Path) -> Result<RecordingDump> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading recording description {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("parsing recording description {}", path.display()))
}

/// Splits `name=value` into a parameter override.
pub fn parse_param(raw: &str) -> Result<(String, ParamValue)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("parameter '{}' is not of the form name=value", raw);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("parameter '{}' has an empty name", raw);
    }
    Ok((name.to_string(), ParamValue::parse_loose(value)))
}

/// Builds run options from command-line arguments.
pub fn build_options(args: &RunArgs) -> Result<RunOptions> {
    let mut options = RunOptions::new()
        .raise_on_error(!args.keep_going)
        .use_container(args.docker)
        .parallel(args.parallel)
        .delete_output_folder(args.delete_output)
        .worker_count(args.jobs.map(WorkerCount::fixed).unwrap_or_default());
    if let Some(output) = &args.output {
        options = options.output_folder(output);
    }
    if let Some(grouping) = &args.grouping {
        options = options.grouping_property(grouping);
    }
    if let Some(pool) = &args.pool {
        let pool: WorkerPoolKind = pool.parse().map_err(anyhow::Error::msg)?;
        options = options.pool(pool);
    }
    for raw in &args.params {
        let (name, value) = parse_param(raw)?;
        options = options.param(name, value);
    }
    Ok(options)
}

/// Run the run command
///
/// # Returns
/// Exit code: 0 if the sorter completed, 1 if a failure was recorded
pub fn run(dispatcher: &Dispatcher, args: &RunArgs) -> Result<ExitCode> {
    let options = build_options(args)?;
    let recording = load_recording(&args.recording)?
        .load()
        .context("loading recording")?;

    println!("{} {}", "Running:".cyan().bold(), args.sorter);
    let result = dispatcher.run(args.sorter.as_str(), recording, &options)?;
    reporting::print_result(&result);

    Ok(if result.is_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("detect_threshold=4.5").unwrap(),
            ("detect_threshold".to_string(), ParamValue::Float(4.5))
        );
        assert_eq!(
            parse_param("adjacency_radius = -1").unwrap(),
            ("adjacency_radius".to_string(), ParamValue::Int(-1))
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=3").is_err());
    }

    #[test]
    fn test_build_options() {
        let args = RunArgs {
            sorter: "mountainsort4".into(),
            params: vec!["curation=true".into()],
            grouping: Some("group".into()),
            parallel: true,
            jobs: Some(2),
            pool: Some("tokio".into()),
            keep_going: true,
            ..Default::default()
        };
        let options = build_options(&args).unwrap();
        assert_eq!(
            options.overrides().get("curation"),
            Some(&ParamValue::Bool(true))
        );
        assert_eq!(
            options,
            RunOptions::new()
                .raise_on_error(false)
                .parallel(true)
                .worker_count(WorkerCount::fixed(2))
                .grouping_property("group")
                .pool(WorkerPoolKind::Tokio)
                .param("curation", true)
        );

        let bad = RunArgs {
            pool: Some("gpu".into()),
            ..Default::default()
        };
        assert!(build_options(&bad).is_err());
    }
}

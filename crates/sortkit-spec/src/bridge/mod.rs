//! On-disk result handoff between a backend and the orchestrator.
//!
//! Every backend leaves two files directly under its output folder:
//!
//! - `firings.mda`: a 3×L MDA array, see [`mda`]
//! - `samplerate.txt`: the sampling rate as plain text
//!
//! [`write_result`] and [`read_result`] are exact inverses for unpartitioned
//! sortings whose units all have at least one event. Partitioned sortings use
//! the [`archive`] form instead.

pub mod archive;
pub mod mda;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{SortError, SortResult};
use crate::sorting::Sorting;

pub use archive::{read_archive, read_job_archive, write_archive, write_job_archive, ARCHIVE_FILE};

/// Firings file name.
pub const FIRINGS_FILE: &str = "firings.mda";

/// Sampling rate file name.
pub const SAMPLERATE_FILE: &str = "samplerate.txt";

/// Returns true if both result files exist under `dir`.
pub fn has_result(dir: &Path) -> bool {
    dir.join(FIRINGS_FILE).is_file() && dir.join(SAMPLERATE_FILE).is_file()
}

/// Writes `sorting` into `dir` as firings plus sampling rate.
pub fn write_result(sorting: &Sorting, dir: &Path) -> SortResult<()> {
    if sorting.is_partitioned() {
        return Err(SortError::serialization(
            "partitioned sortings cannot be written as firings; use the archive form",
        ));
    }
    check_rate(sorting.sampling_frequency()).map_err(SortError::serialization)?;
    let events = sorting.events();
    if let Some(event) = events.iter().find(|e| e.frame > mda::MAX_EXACT_FRAME) {
        return Err(SortError::serialization(format!(
            "frame {} cannot be stored exactly in firings",
            event.frame
        )));
    }

    let firings = dir.join(FIRINGS_FILE);
    let file = File::create(&firings).map_err(|e| SortError::io(&firings, e))?;
    let mut writer = BufWriter::new(file);
    mda::write_firings(&mut writer, &events)
        .and_then(|_| writer.flush())
        .map_err(|e| SortError::io(&firings, e))?;

    let rate = dir.join(SAMPLERATE_FILE);
    fs::write(&rate, format!("{}", sorting.sampling_frequency()))
        .map_err(|e| SortError::io(&rate, e))?;

    tracing::debug!(dir = %dir.display(), units = sorting.num_units(), "wrote firings");
    Ok(())
}

/// Reads the result files under `dir`.
///
/// Missing, unparsable or inconsistent files are all `ResultMissing`.
pub fn read_result(dir: &Path) -> SortResult<Sorting> {
    let rate_path = dir.join(SAMPLERATE_FILE);
    let text = fs::read_to_string(&rate_path)
        .map_err(|e| SortError::result_missing(&rate_path, format!("cannot read: {}", e)))?;
    let sampling_frequency: f64 = text.trim().parse().map_err(|_| {
        SortError::result_missing(&rate_path, format!("not a number: '{}'", text.trim()))
    })?;
    check_rate(sampling_frequency).map_err(|reason| SortError::result_missing(&rate_path, reason))?;

    let firings = dir.join(FIRINGS_FILE);
    let file = File::open(&firings)
        .map_err(|e| SortError::result_missing(&firings, format!("cannot open: {}", e)))?;
    let events = mda::read_firings(&mut BufReader::new(file))
        .map_err(|reason| SortError::result_missing(&firings, reason))?;

    Ok(Sorting::from_events(sampling_frequency, events))
}

fn check_rate(rate: f64) -> Result<(), String> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(format!("sampling rate must be positive, got {}", rate))
    }
}

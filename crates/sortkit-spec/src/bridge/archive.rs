//! JSON archive form of a sorting.
//!
//! Used to hand a result back from a container job, and for grouped sortings
//! which the firings format cannot represent. A job archive also lists the
//! partitions that were dropped from the result.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{SortError, SortResult};
use crate::request::PartitionFailure;
use crate::sorting::{Sorting, SpikeTrain, UnitKey};

/// Archive file name inside an output folder.
pub const ARCHIVE_FILE: &str = "sorting_container.json";

/// Current archive format version.
pub const ARCHIVE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ArchiveUnit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    partition: Option<String>,
    label: u32,
    frames: Vec<u64>,
    channels: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Archive {
    version: u32,
    sampling_frequency: f64,
    units: Vec<ArchiveUnit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dropped: Vec<PartitionFailure>,
}

/// Encodes a sorting as archive JSON.
pub fn to_archive_json(sorting: &Sorting) -> SortResult<String> {
    encode(sorting, &[])
}

/// Decodes archive JSON, ignoring any dropped partitions.
pub fn from_archive_json(json: &str) -> Result<Sorting, String> {
    decode(json).map(|(sorting, _)| sorting)
}

fn encode(sorting: &Sorting, dropped: &[PartitionFailure]) -> SortResult<String> {
    let archive = Archive {
        version: ARCHIVE_VERSION,
        sampling_frequency: sorting.sampling_frequency(),
        units: sorting
            .units()
            .map(|(key, train)| ArchiveUnit {
                partition: key.partition.clone(),
                label: key.label,
                frames: train.frames.clone(),
                channels: train.channels.clone(),
            })
            .collect(),
        dropped: dropped.to_vec(),
    };
    Ok(serde_json::to_string_pretty(&archive)?)
}

fn decode(json: &str) -> Result<(Sorting, Vec<PartitionFailure>), String> {
    let archive: Archive = serde_json::from_str(json).map_err(|e| e.to_string())?;
    if archive.version != ARCHIVE_VERSION {
        return Err(format!("unsupported archive version {}", archive.version));
    }
    let fs = archive.sampling_frequency;
    if !fs.is_finite() || fs <= 0.0 {
        return Err(format!("invalid sampling frequency {}", fs));
    }

    let mut sorting = Sorting::new(fs);
    for unit in archive.units {
        if unit.frames.len() != unit.channels.len() {
            return Err(format!(
                "unit {} has {} frames but {} channels",
                unit.label,
                unit.frames.len(),
                unit.channels.len()
            ));
        }
        let key = UnitKey {
            partition: unit.partition,
            label: unit.label,
        };
        if sorting.spike_train(&key).is_some() {
            return Err(format!("duplicate unit {}", key));
        }
        sorting.insert_unit(
            key,
            SpikeTrain {
                frames: unit.frames,
                channels: unit.channels,
            },
        );
    }
    Ok((sorting, archive.dropped))
}

/// Writes `sorting` to `<dir>/sorting_container.json`.
pub fn write_archive(sorting: &Sorting, dir: &Path) -> SortResult<()> {
    write_job_archive(sorting, &[], dir)
}

/// Writes `sorting` and the partitions dropped from it.
pub fn write_job_archive(
    sorting: &Sorting,
    dropped: &[PartitionFailure],
    dir: &Path,
) -> SortResult<()> {
    let path = dir.join(ARCHIVE_FILE);
    let json = encode(sorting, dropped)?;
    fs::write(&path, json).map_err(|e| SortError::io(&path, e))
}

/// Reads `<dir>/sorting_container.json`.
///
/// A missing or invalid archive is a `ResultMissing` error.
pub fn read_archive(dir: &Path) -> SortResult<Sorting> {
    read_job_archive(dir).map(|(sorting, _)| sorting)
}

/// Reads an archive together with its dropped partitions.
pub fn read_job_archive(dir: &Path) -> SortResult<(Sorting, Vec<PartitionFailure>)> {
    let path = dir.join(ARCHIVE_FILE);
    let json = fs::read_to_string(&path)
        .map_err(|e| SortError::result_missing(&path, format!("cannot read archive: {}", e)))?;
    decode(&json).map_err(|reason| SortError::result_missing(&path, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sorting::SpikeEvent;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_archive_keeps_partitions() {
        let a = Sorting::from_events(25000.0, vec![SpikeEvent::new(0, 10, 0)]);
        let b = Sorting::from_events(25000.0, vec![SpikeEvent::new(2, 12, 0)]);
        let merged =
            Sorting::merge_partitions(25000.0, vec![("A".into(), a), ("B".into(), b)]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        write_archive(&merged, dir.path()).unwrap();
        let back = read_archive(dir.path()).unwrap();
        assert_eq!(back, merged);
    }

    #[test]
    fn test_job_archive_keeps_dropped_partitions() {
        let a = Sorting::from_events(25000.0, vec![SpikeEvent::new(0, 10, 0)]);
        let merged = Sorting::merge_partitions(25000.0, vec![("A".into(), a)]).unwrap();
        let dropped = vec![PartitionFailure {
            partition: "B".to_string(),
            failure: crate::request::FailureRecord {
                backend: "stub".to_string(),
                kind: ErrorKind::ExecutionError,
                message: "boom".to_string(),
                diagnostic: None,
            },
        }];

        let dir = tempfile::tempdir().unwrap();
        write_job_archive(&merged, &dropped, dir.path()).unwrap();
        let (sorting, back) = read_job_archive(dir.path()).unwrap();
        assert_eq!(sorting, merged);
        assert_eq!(back, dropped);
        assert_eq!(read_archive(dir.path()).unwrap(), merged);
    }

    #[test]
    fn test_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_archive(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResultMissing);
    }

    #[test]
    fn test_rejects_mismatched_unit() {
        let json = r#"{"version":1,"sampling_frequency":100.0,
            "units":[{"label":1,"frames":[1,2],"channels":[0]}]}"#;
        assert!(from_archive_json(json).is_err());
    }
}

//! Recording fixtures.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use sortkit_spec::{BinaryRecording, InMemoryRecording, Recording, SampleType, GROUP_PROPERTY};
use tempfile::TempDir;

pub const SAMPLING_FREQUENCY: f64 = 30000.0;
pub const NUM_CHANNELS: usize = 4;
pub const NUM_FRAMES: usize = 300;

fn samples() -> Vec<f32> {
    (0..NUM_FRAMES * NUM_CHANNELS)
        .map(|i| ((i % 17) as f32 - 8.0) * 0.5)
        .collect()
}

fn groups() -> Vec<String> {
    ["A", "A", "B", "B"].iter().map(|g| g.to_string()).collect()
}

/// A 4-channel binary recording with groups A: [0, 1] and B: [2, 3].
pub struct GroupedFixture {
    pub root: TempDir,
    pub recording: Arc<dyn Recording>,
}

impl GroupedFixture {
    /// Root of the fixture tree; outputs should go under it.
    pub fn path(&self) -> &Path {
        self.root.path()
    }
}

/// Writes the grouped binary recording into a fresh temp dir.
pub fn grouped_recording() -> GroupedFixture {
    let root = TempDir::new().expect("Failed to create temp dir");
    let data_dir = root.path().join("data");
    fs::create_dir(&data_dir).expect("Failed to create data dir");
    let recording = BinaryRecording::write(
        data_dir.join("recording.dat"),
        SAMPLING_FREQUENCY,
        NUM_CHANNELS,
        &samples(),
        SampleType::Float32,
    )
    .expect("Failed to write recording")
    .with_property(GROUP_PROPERTY, groups())
    .expect("Failed to set groups");
    GroupedFixture {
        root,
        recording: Arc::new(recording),
    }
}

/// The same data held in memory, which cannot be shipped to a job.
pub fn in_memory_recording() -> Arc<dyn Recording> {
    let recording = InMemoryRecording::new(SAMPLING_FREQUENCY, NUM_CHANNELS, samples())
        .expect("Failed to build recording")
        .with_property(GROUP_PROPERTY, groups())
        .expect("Failed to set groups");
    Arc::new(recording)
}

/// Number of entries directly under `dir`.
pub fn count_entries(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

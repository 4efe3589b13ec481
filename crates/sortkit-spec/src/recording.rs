//! Multichannel recordings consumed by sorters.
//!
//! A [`Recording`] is read-only: every accessor takes `&self`, and the trait
//! requires `Send + Sync`, so partitions of one recording can be sorted from
//! several workers at once through an `Arc<dyn Recording>`.
//!
//! Recordings backed by files can be dumped to a [`RecordingDump`], a
//! serializable description from which an equivalent recording is rebuilt in
//! another process or container. In-memory recordings cannot be dumped.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{SortError, SortResult};

/// Channel property holding the channel-group key.
pub const GROUP_PROPERTY: &str = "group";

/// Read-only multichannel time series.
pub trait Recording: Send + Sync + fmt::Debug {
    /// Sampling frequency in Hz.
    fn sampling_frequency(&self) -> f64;

    /// Number of channels in this view.
    fn num_channels(&self) -> usize;

    /// Number of frames (samples per channel).
    fn num_frames(&self) -> usize;

    /// Channel identifiers, one per channel in view order.
    fn channel_ids(&self) -> Vec<u32>;

    /// Whether the data has already been band-pass filtered.
    fn is_filtered(&self) -> bool;

    /// Per-channel values of a property, or `None` if the property is unset.
    fn channel_property(&self, name: &str) -> Option<Vec<String>>;

    /// Reads frames `start..end` as frame-major interleaved samples.
    fn traces(&self, start_frame: usize, end_frame: usize) -> SortResult<Vec<f32>>;

    /// Serializable description of this recording, if it has one.
    fn dump(&self) -> Option<RecordingDump>;

    fn is_dumpable(&self) -> bool {
        self.dump().is_some()
    }
}

fn frame_range(start: usize, end: usize, num_frames: usize) -> SortResult<()> {
    if start > end || end > num_frames {
        return Err(SortError::io(
            PathBuf::new(),
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "frame range {}..{} outside recording of {} frames",
                    start, end, num_frames
                ),
            ),
        ));
    }
    Ok(())
}

fn check_property_len(name: &str, values: &[String], num_channels: usize) -> SortResult<()> {
    if values.len() != num_channels {
        return Err(SortError::invalid_parameter(
            "recording",
            name,
            format!(
                "property has {} values for {} channels",
                values.len(),
                num_channels
            ),
        ));
    }
    Ok(())
}

/// Recording held entirely in memory. Not transportable.
#[derive(Debug, Clone)]
pub struct InMemoryRecording {
    sampling_frequency: f64,
    channel_ids: Vec<u32>,
    num_frames: usize,
    data: Vec<f32>,
    filtered: bool,
    properties: BTreeMap<String, Vec<String>>,
}

impl InMemoryRecording {
    /// Wraps frame-major interleaved samples.
    pub fn new(sampling_frequency: f64, num_channels: usize, data: Vec<f32>) -> SortResult<Self> {
        if num_channels == 0 || data.len() % num_channels != 0 {
            return Err(SortError::serialization(format!(
                "{} samples cannot be split into {} channels",
                data.len(),
                num_channels
            )));
        }
        Ok(Self {
            sampling_frequency,
            channel_ids: (0..num_channels as u32).collect(),
            num_frames: data.len() / num_channels,
            data,
            filtered: false,
            properties: BTreeMap::new(),
        })
    }

    /// Marks the data as already filtered.
    pub fn filtered(mut self, filtered: bool) -> Self {
        self.filtered = filtered;
        self
    }

    /// Sets a per-channel property.
    pub fn with_property(mut self, name: &str, values: Vec<String>) -> SortResult<Self> {
        check_property_len(name, &values, self.channel_ids.len())?;
        self.properties.insert(name.to_string(), values);
        Ok(self)
    }
}

impl Recording for InMemoryRecording {
    fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    fn num_channels(&self) -> usize {
        self.channel_ids.len()
    }

    fn num_frames(&self) -> usize {
        self.num_frames
    }

    fn channel_ids(&self) -> Vec<u32> {
        self.channel_ids.clone()
    }

    fn is_filtered(&self) -> bool {
        self.filtered
    }

    fn channel_property(&self, name: &str) -> Option<Vec<String>> {
        self.properties.get(name).cloned()
    }

    fn traces(&self, start_frame: usize, end_frame: usize) -> SortResult<Vec<f32>> {
        frame_range(start_frame, end_frame, self.num_frames)?;
        let n = self.channel_ids.len();
        Ok(self.data[start_frame * n..end_frame * n].to_vec())
    }

    fn dump(&self) -> Option<RecordingDump> {
        None
    }
}

/// On-disk sample encoding of a raw binary recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    Int16,
    Float32,
}

impl SampleType {
    /// Bytes per sample.
    pub fn size(&self) -> usize {
        match self {
            SampleType::Int16 => 2,
            SampleType::Float32 => 4,
        }
    }
}

/// Serializable description of a raw binary recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryRecordingInfo {
    pub path: PathBuf,
    pub sampling_frequency: f64,
    pub num_channels: usize,
    pub sample_type: SampleType,
    #[serde(default)]
    pub header_bytes: u64,
    #[serde(default)]
    pub is_filtered: bool,
    pub channel_ids: Vec<u32>,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<String>>,
}

/// Recording stored as a raw little-endian frame-major binary file.
#[derive(Debug, Clone)]
pub struct BinaryRecording {
    info: BinaryRecordingInfo,
    num_frames: usize,
}

impl BinaryRecording {
    /// Opens an existing binary file.
    pub fn open(
        path: impl Into<PathBuf>,
        sampling_frequency: f64,
        num_channels: usize,
        sample_type: SampleType,
    ) -> SortResult<Self> {
        Self::from_info(BinaryRecordingInfo {
            path: path.into(),
            sampling_frequency,
            num_channels,
            sample_type,
            header_bytes: 0,
            is_filtered: false,
            channel_ids: (0..num_channels as u32).collect(),
            properties: BTreeMap::new(),
        })
    }

    /// Opens a binary file described by `info`.
    pub fn from_info(info: BinaryRecordingInfo) -> SortResult<Self> {
        if info.num_channels == 0 || info.channel_ids.len() != info.num_channels {
            return Err(SortError::serialization(format!(
                "binary recording declares {} channels and {} channel ids",
                info.num_channels,
                info.channel_ids.len()
            )));
        }
        for (name, values) in &info.properties {
            check_property_len(name, values, info.num_channels)?;
        }
        let len = std::fs::metadata(&info.path)
            .map_err(|e| SortError::io(&info.path, e))?
            .len();
        let frame_bytes = (info.num_channels * info.sample_type.size()) as u64;
        let payload = len.saturating_sub(info.header_bytes);
        if payload % frame_bytes != 0 {
            return Err(SortError::serialization(format!(
                "{} is {} bytes, not a whole number of {}-byte frames",
                info.path.display(),
                payload,
                frame_bytes
            )));
        }
        Ok(Self {
            num_frames: (payload / frame_bytes) as usize,
            info,
        })
    }

    /// Writes frame-major samples to `path` and opens the result.
    pub fn write(
        path: impl Into<PathBuf>,
        sampling_frequency: f64,
        num_channels: usize,
        data: &[f32],
        sample_type: SampleType,
    ) -> SortResult<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| SortError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        let result = match sample_type {
            SampleType::Float32 => data
                .iter()
                .try_for_each(|s| writer.write_f32::<LittleEndian>(*s)),
            SampleType::Int16 => data.iter().try_for_each(|s| {
                writer.write_i16::<LittleEndian>(s.round().clamp(i16::MIN as f32, i16::MAX as f32)
                    as i16)
            }),
        };
        result
            .and_then(|_| writer.flush())
            .map_err(|e| SortError::io(&path, e))?;
        Self::open(path, sampling_frequency, num_channels, sample_type)
    }

    /// Marks the data as already filtered.
    pub fn filtered(mut self, filtered: bool) -> Self {
        self.info.is_filtered = filtered;
        self
    }

    /// Sets a per-channel property.
    pub fn with_property(mut self, name: &str, values: Vec<String>) -> SortResult<Self> {
        check_property_len(name, &values, self.info.num_channels)?;
        self.info.properties.insert(name.to_string(), values);
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    pub fn info(&self) -> &BinaryRecordingInfo {
        &self.info
    }
}

impl Recording for BinaryRecording {
    fn sampling_frequency(&self) -> f64 {
        self.info.sampling_frequency
    }

    fn num_channels(&self) -> usize {
        self.info.num_channels
    }

    fn num_frames(&self) -> usize {
        self.num_frames
    }

    fn channel_ids(&self) -> Vec<u32> {
        self.info.channel_ids.clone()
    }

    fn is_filtered(&self) -> bool {
        self.info.is_filtered
    }

    fn channel_property(&self, name: &str) -> Option<Vec<String>> {
        self.info.properties.get(name).cloned()
    }

    fn traces(&self, start_frame: usize, end_frame: usize) -> SortResult<Vec<f32>> {
        frame_range(start_frame, end_frame, self.num_frames)?;
        let path = &self.info.path;
        let n = self.info.num_channels;
        let size = self.info.sample_type.size();
        let offset = self.info.header_bytes + (start_frame * n * size) as u64;
        let count = (end_frame - start_frame) * n;

        let mut file = File::open(path).map_err(|e| SortError::io(path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| SortError::io(path, e))?;
        let mut reader = BufReader::new(file);
        let mut bytes = vec![0u8; count * size];
        reader
            .read_exact(&mut bytes)
            .map_err(|e| SortError::io(path, e))?;

        let samples = match self.info.sample_type {
            SampleType::Float32 => {
                let mut out = vec![0f32; count];
                LittleEndian::read_f32_into(&bytes, &mut out);
                out
            }
            SampleType::Int16 => {
                let mut raw = vec![0i16; count];
                LittleEndian::read_i16_into(&bytes, &mut raw);
                raw.into_iter().map(f32::from).collect()
            }
        };
        Ok(samples)
    }

    fn dump(&self) -> Option<RecordingDump> {
        Some(RecordingDump::Binary(self.info.clone()))
    }
}

/// A subset of another recording's channels.
#[derive(Debug, Clone)]
pub struct ChannelSliceRecording {
    parent: Arc<dyn Recording>,
    indices: Vec<usize>,
}

impl ChannelSliceRecording {
    /// Selects channels of `parent` by their index in the parent's view.
    pub fn new(parent: Arc<dyn Recording>, indices: Vec<usize>) -> SortResult<Self> {
        let total = parent.num_channels();
        if indices.is_empty() || indices.iter().any(|&i| i >= total) {
            return Err(SortError::serialization(format!(
                "channel indices {:?} invalid for a recording of {} channels",
                indices, total
            )));
        }
        Ok(Self { parent, indices })
    }

    /// Parent channel indices in this view.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl Recording for ChannelSliceRecording {
    fn sampling_frequency(&self) -> f64 {
        self.parent.sampling_frequency()
    }

    fn num_channels(&self) -> usize {
        self.indices.len()
    }

    fn num_frames(&self) -> usize {
        self.parent.num_frames()
    }

    fn channel_ids(&self) -> Vec<u32> {
        let ids = self.parent.channel_ids();
        self.indices.iter().map(|&i| ids[i]).collect()
    }

    fn is_filtered(&self) -> bool {
        self.parent.is_filtered()
    }

    fn channel_property(&self, name: &str) -> Option<Vec<String>> {
        let values = self.parent.channel_property(name)?;
        Some(self.indices.iter().map(|&i| values[i].clone()).collect())
    }

    fn traces(&self, start_frame: usize, end_frame: usize) -> SortResult<Vec<f32>> {
        let full = self.parent.traces(start_frame, end_frame)?;
        let stride = self.parent.num_channels();
        let mut out = Vec::with_capacity((end_frame - start_frame) * self.indices.len());
        for frame in full.chunks_exact(stride) {
            out.extend(self.indices.iter().map(|&i| frame[i]));
        }
        Ok(out)
    }

    fn dump(&self) -> Option<RecordingDump> {
        self.parent.dump().map(|parent| RecordingDump::ChannelSlice {
            parent: Box::new(parent),
            channel_indices: self.indices.clone(),
        })
    }
}

/// Serializable description of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordingDump {
    Binary(BinaryRecordingInfo),
    ChannelSlice {
        parent: Box<RecordingDump>,
        channel_indices: Vec<usize>,
    },
}

impl RecordingDump {
    /// Rebuilds the described recording.
    pub fn load(&self) -> SortResult<Arc<dyn Recording>> {
        match self {
            RecordingDump::Binary(info) => Ok(Arc::new(BinaryRecording::from_info(info.clone())?)),
            RecordingDump::ChannelSlice {
                parent,
                channel_indices,
            } => {
                let parent = parent.load()?;
                Ok(Arc::new(ChannelSliceRecording::new(
                    parent,
                    channel_indices.clone(),
                )?))
            }
        }
    }

    /// Data files the recording reads from.
    pub fn data_files(&self) -> Vec<&Path> {
        match self {
            RecordingDump::Binary(info) => vec![info.path.as_path()],
            RecordingDump::ChannelSlice { parent, .. } => parent.data_files(),
        }
    }

    /// Returns a copy whose data file paths are rewritten by `relocate`.
    pub fn relocated(&self, relocate: &mut dyn FnMut(&Path) -> PathBuf) -> RecordingDump {
        match self {
            RecordingDump::Binary(info) => RecordingDump::Binary(BinaryRecordingInfo {
                path: relocate(&info.path),
                ..info.clone()
            }),
            RecordingDump::ChannelSlice {
                parent,
                channel_indices,
            } => RecordingDump::ChannelSlice {
                parent: Box::new(parent.relocated(relocate)),
                channel_indices: channel_indices.clone(),
            },
        }
    }
}

/// Splits a recording into one channel slice per distinct property value.
///
/// Groups are returned sorted by their key. Returns `None` when the property
/// is not set on the recording.
pub fn split_by_property(
    recording: &Arc<dyn Recording>,
    property: &str,
) -> SortResult<Option<Vec<(String, Arc<dyn Recording>)>>> {
    let Some(values) = recording.channel_property(property) else {
        return Ok(None);
    };

    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, value) in values.into_iter().enumerate() {
        groups.entry(value).or_default().push(index);
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, indices) in groups {
        let slice = ChannelSliceRecording::new(Arc::clone(recording), indices)?;
        out.push((key, Arc::new(slice) as Arc<dyn Recording>));
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn four_channel_data() -> Vec<f32> {
        // 3 frames x 4 channels, sample = frame * 10 + channel
        (0..3)
            .flat_map(|f| (0..4).map(move |c| (f * 10 + c) as f32))
            .collect()
    }

    #[test]
    fn test_in_memory_traces() {
        let rec = InMemoryRecording::new(30000.0, 4, four_channel_data()).unwrap();
        assert_eq!(rec.num_frames(), 3);
        assert_eq!(rec.traces(1, 2).unwrap(), vec![10.0, 11.0, 12.0, 13.0]);
        assert!(rec.traces(2, 4).is_err());
        assert!(!rec.is_dumpable());
    }

    #[test]
    fn test_in_memory_rejects_ragged_data() {
        assert!(InMemoryRecording::new(30000.0, 3, vec![0.0; 4]).is_err());
    }

    #[test]
    fn test_channel_slice() {
        let rec: Arc<dyn Recording> = Arc::new(
            InMemoryRecording::new(30000.0, 4, four_channel_data())
                .unwrap()
                .with_property(GROUP_PROPERTY, vec!["A".into(), "A".into(), "B".into(), "B".into()])
                .unwrap(),
        );
        let slice = ChannelSliceRecording::new(rec, vec![2, 3]).unwrap();
        assert_eq!(slice.channel_ids(), vec![2, 3]);
        assert_eq!(slice.traces(0, 2).unwrap(), vec![2.0, 3.0, 12.0, 13.0]);
        assert_eq!(
            slice.channel_property(GROUP_PROPERTY),
            Some(vec!["B".to_string(), "B".to_string()])
        );
    }

    #[test]
    fn test_split_by_property() {
        let rec: Arc<dyn Recording> = Arc::new(
            InMemoryRecording::new(30000.0, 4, four_channel_data())
                .unwrap()
                .with_property(GROUP_PROPERTY, vec!["B".into(), "A".into(), "B".into(), "A".into()])
                .unwrap(),
        );
        let groups = split_by_property(&rec, GROUP_PROPERTY).unwrap().unwrap();
        let keys: Vec<_> = groups.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(groups[0].1.channel_ids(), vec![1, 3]);
        assert_eq!(groups[1].1.channel_ids(), vec![0, 2]);

        assert!(split_by_property(&rec, "shank").unwrap().is_none());
    }

    #[test]
    fn test_binary_roundtrip_and_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.dat");
        let rec = BinaryRecording::write(&path, 20000.0, 4, &four_channel_data(), SampleType::Int16)
            .unwrap()
            .with_property(GROUP_PROPERTY, vec!["0".into(), "0".into(), "1".into(), "1".into()])
            .unwrap();
        assert_eq!(rec.num_frames(), 3);
        assert_eq!(rec.traces(2, 3).unwrap(), vec![20.0, 21.0, 22.0, 23.0]);

        let parent: Arc<dyn Recording> = Arc::new(rec);
        let groups = split_by_property(&parent, GROUP_PROPERTY).unwrap().unwrap();
        let dump = groups[1].1.dump().unwrap();
        assert_eq!(dump.data_files(), vec![path.as_path()]);

        let json = serde_json::to_string(&dump).unwrap();
        let restored: RecordingDump = serde_json::from_str(&json).unwrap();
        let loaded = restored.load().unwrap();
        assert_eq!(loaded.channel_ids(), vec![2, 3]);
        assert_eq!(loaded.traces(0, 3).unwrap(), groups[1].1.traces(0, 3).unwrap());
    }

    #[test]
    fn test_dump_relocation() {
        let dump = RecordingDump::ChannelSlice {
            parent: Box::new(RecordingDump::Binary(BinaryRecordingInfo {
                path: PathBuf::from("/data/session/rec.dat"),
                sampling_frequency: 30000.0,
                num_channels: 2,
                sample_type: SampleType::Float32,
                header_bytes: 0,
                is_filtered: true,
                channel_ids: vec![0, 1],
                properties: BTreeMap::new(),
            })),
            channel_indices: vec![1],
        };
        let moved = dump.relocated(&mut |p| Path::new("/input").join(p.file_name().unwrap()));
        assert_eq!(moved.data_files(), vec![Path::new("/input/rec.dat")]);
    }
}

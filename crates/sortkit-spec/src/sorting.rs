//! Sorting results: units and their spike trains.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{SortError, SortResult};

/// One detected event as stored in a firings artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpikeEvent {
    /// Primary channel of the event.
    pub channel: u32,
    /// Frame index of the event.
    pub frame: u64,
    /// Unit label assigned by the sorter.
    pub label: u32,
}

impl SpikeEvent {
    pub fn new(channel: u32, frame: u64, label: u32) -> Self {
        Self {
            channel,
            frame,
            label,
        }
    }
}

/// Identity of a unit within a (possibly merged) sorting.
///
/// Units from different partitions never collide: the partition key is part of
/// the identity. Ordering is partition first, then label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    /// Partition the unit was sorted in, if the run was partitioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    /// Label assigned by the sorter.
    pub label: u32,
}

impl UnitKey {
    /// Unit of an unpartitioned sorting.
    pub fn label(label: u32) -> Self {
        Self {
            partition: None,
            label,
        }
    }

    /// Unit of a partitioned sorting.
    pub fn in_partition(partition: impl Into<String>, label: u32) -> Self {
        Self {
            partition: Some(partition.into()),
            label,
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.partition {
            Some(p) => write!(f, "{}/{}", p, self.label),
            None => write!(f, "{}", self.label),
        }
    }
}

/// Event frames of one unit together with each event's primary channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpikeTrain {
    pub frames: Vec<u64>,
    pub channels: Vec<u32>,
}

impl SpikeTrain {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn push(&mut self, frame: u64, channel: u32) {
        self.frames.push(frame);
        self.channels.push(channel);
    }

    /// Sorts events by frame, then channel.
    fn normalize(&mut self) {
        let mut pairs: Vec<(u64, u32)> = self
            .frames
            .iter()
            .copied()
            .zip(self.channels.iter().copied())
            .collect();
        pairs.sort_unstable();
        self.frames = pairs.iter().map(|p| p.0).collect();
        self.channels = pairs.iter().map(|p| p.1).collect();
    }

    /// Most frequent primary channel, ties broken towards the lowest id.
    pub fn dominant_channel(&self) -> Option<u32> {
        let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
        for &c in &self.channels {
            *counts.entry(c).or_default() += 1;
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(c, _)| c)
    }
}

/// Labeled event output of a sorter.
#[derive(Debug, Clone, PartialEq)]
pub struct Sorting {
    sampling_frequency: f64,
    units: BTreeMap<UnitKey, SpikeTrain>,
}

impl Sorting {
    /// Creates an empty sorting.
    pub fn new(sampling_frequency: f64) -> Self {
        Self {
            sampling_frequency,
            units: BTreeMap::new(),
        }
    }

    /// Builds an unpartitioned sorting from raw events.
    pub fn from_events(
        sampling_frequency: f64,
        events: impl IntoIterator<Item = SpikeEvent>,
    ) -> Self {
        let mut sorting = Self::new(sampling_frequency);
        for event in events {
            sorting
                .units
                .entry(UnitKey::label(event.label))
                .or_default()
                .push(event.frame, event.channel);
        }
        for train in sorting.units.values_mut() {
            train.normalize();
        }
        sorting
    }

    /// Inserts or replaces a unit.
    pub fn insert_unit(&mut self, key: UnitKey, mut train: SpikeTrain) {
        train.normalize();
        self.units.insert(key, train);
    }

    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    pub fn num_units(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Unit keys in order.
    pub fn unit_keys(&self) -> impl Iterator<Item = &UnitKey> {
        self.units.keys()
    }

    /// Units and their trains in key order.
    pub fn units(&self) -> impl Iterator<Item = (&UnitKey, &SpikeTrain)> {
        self.units.iter()
    }

    pub fn spike_train(&self, key: &UnitKey) -> Option<&SpikeTrain> {
        self.units.get(key)
    }

    /// Total number of events across units.
    pub fn num_events(&self) -> usize {
        self.units.values().map(SpikeTrain::len).sum()
    }

    /// Returns true if any unit carries a partition key.
    pub fn is_partitioned(&self) -> bool {
        self.units.keys().any(|k| k.partition.is_some())
    }

    /// All events of an unpartitioned sorting, ordered by frame, label, then channel.
    pub fn events(&self) -> Vec<SpikeEvent> {
        let mut events: Vec<SpikeEvent> = self
            .units
            .iter()
            .flat_map(|(key, train)| {
                train
                    .frames
                    .iter()
                    .zip(train.channels.iter())
                    .map(move |(&frame, &channel)| SpikeEvent::new(channel, frame, key.label))
            })
            .collect();
        events.sort_unstable_by_key(|e| (e.frame, e.label, e.channel));
        events
    }

    /// Keeps only the units for which `keep` returns true.
    pub fn retain_units(&mut self, mut keep: impl FnMut(&UnitKey, &SpikeTrain) -> bool) {
        self.units.retain(|k, v| keep(k, v));
    }

    /// Tags every unit with `partition`.
    pub fn into_partition(self, partition: &str) -> Self {
        let units = self
            .units
            .into_iter()
            .map(|(key, train)| {
                (
                    UnitKey {
                        partition: Some(partition.to_string()),
                        label: key.label,
                    },
                    train,
                )
            })
            .collect();
        Self {
            sampling_frequency: self.sampling_frequency,
            units,
        }
    }

    /// Set union of partition sortings.
    ///
    /// Each sorting is tagged with its partition key before insertion, so the
    /// result does not depend on the order of `parts`. All parts must share
    /// the same sampling frequency.
    pub fn merge_partitions(
        sampling_frequency: f64,
        parts: impl IntoIterator<Item = (String, Sorting)>,
    ) -> SortResult<Sorting> {
        let mut merged = Sorting::new(sampling_frequency);
        for (partition, sorting) in parts {
            if sorting.sampling_frequency != sampling_frequency {
                return Err(SortError::execution(
                    "merge",
                    format!(
                        "partition '{}' sampled at {} Hz, expected {} Hz",
                        partition, sorting.sampling_frequency, sampling_frequency
                    ),
                ));
            }
            merged.units.extend(sorting.into_partition(&partition).units);
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw() -> Sorting {
        Sorting::from_events(
            30000.0,
            vec![
                SpikeEvent::new(1, 40, 2),
                SpikeEvent::new(0, 10, 1),
                SpikeEvent::new(1, 20, 2),
                SpikeEvent::new(0, 30, 1),
            ],
        )
    }

    #[test]
    fn test_from_events_groups_by_label() {
        let sorting = raw();
        assert_eq!(sorting.num_units(), 2);
        assert_eq!(
            sorting.spike_train(&UnitKey::label(2)).unwrap().frames,
            vec![20, 40]
        );
        assert_eq!(sorting.num_events(), 4);
    }

    #[test]
    fn test_events_are_time_ordered() {
        let frames: Vec<u64> = raw().events().iter().map(|e| e.frame).collect();
        assert_eq!(frames, vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = Sorting::from_events(30000.0, vec![SpikeEvent::new(0, 10, 0)]);
        let b = Sorting::from_events(30000.0, vec![SpikeEvent::new(2, 10, 0)]);

        let ab = Sorting::merge_partitions(
            30000.0,
            vec![("A".to_string(), a.clone()), ("B".to_string(), b.clone())],
        )
        .unwrap();
        let ba =
            Sorting::merge_partitions(30000.0, vec![("B".to_string(), b), ("A".to_string(), a)])
                .unwrap();

        assert_eq!(ab, ba);
        assert_eq!(ab.num_units(), 2);
        assert!(ab.spike_train(&UnitKey::in_partition("A", 0)).is_some());
        assert!(ab.spike_train(&UnitKey::in_partition("B", 0)).is_some());
    }

    #[test]
    fn test_merge_rejects_mixed_rates() {
        let a = Sorting::new(20000.0);
        assert!(Sorting::merge_partitions(30000.0, vec![("A".to_string(), a)]).is_err());
    }

    #[test]
    fn test_dominant_channel() {
        let train = SpikeTrain {
            frames: vec![1, 2, 3, 4],
            channels: vec![3, 1, 3, 1],
        };
        assert_eq!(train.dominant_channel(), Some(1));
        assert_eq!(SpikeTrain::default().dominant_channel(), None);
    }
}

//! Noise-overlap curation.
//!
//! A unit is dropped when its clips cannot be told apart from noise. For
//! each unit the mean clip on its dominant channel is used as a template;
//! unit clips and randomly placed noise clips are projected onto it, and the
//! noise overlap is the misclassification rate of the midpoint threshold
//! between the two projection means. Noise clips come from a PCG generator
//! seeded with the unit label, so the result only depends on the sorting,
//! the recording and the parameters.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use sortkit_spec::{ParamSchema, Params, Recording, SortResult, Sorting, SpikeTrain};

/// Parameter enabling curation.
pub const CURATION_PARAM: &str = "curation";

/// Parameter holding the noise overlap threshold.
pub const THRESHOLD_PARAM: &str = "noise_overlap_threshold";

/// Parameter holding the clip size in frames.
pub const CLIP_SIZE_PARAM: &str = "clip_size";

const DEFAULT_CLIP_SIZE: usize = 50;
const MAX_CLIPS: usize = 200;
const MIN_NOISE_CLIPS: usize = 50;
const SEED_BASE: u64 = 0x5eed_5047_u64;

/// Returns the threshold if curation applies to this run.
pub fn curation_threshold(schema: &ParamSchema, params: &Params) -> Option<f64> {
    if !schema.contains(CURATION_PARAM) || !schema.contains(THRESHOLD_PARAM) {
        return None;
    }
    if params.get_bool(CURATION_PARAM) != Some(true) {
        return None;
    }
    params.get_f64(THRESHOLD_PARAM)
}

/// Drops units whose noise overlap exceeds `threshold`.
pub fn curate(
    recording: &dyn Recording,
    sorting: &Sorting,
    params: &Params,
    threshold: f64,
) -> SortResult<Sorting> {
    let clip_size = params
        .get_i64(CLIP_SIZE_PARAM)
        .and_then(|c| usize::try_from(c).ok())
        .filter(|&c| c >= 2)
        .unwrap_or(DEFAULT_CLIP_SIZE);

    let mut curated = sorting.clone();
    let mut dropped = Vec::new();
    for (key, train) in sorting.units() {
        let overlap = noise_overlap(recording, train, key.label, clip_size)?;
        if overlap.is_some_and(|o| o > threshold) {
            dropped.push(key.clone());
        }
    }
    curated.retain_units(|key, _| !dropped.contains(key));

    tracing::info!(
        kept = curated.num_units(),
        dropped = dropped.len(),
        threshold,
        "curated sorting"
    );
    Ok(curated)
}

/// Estimates the noise overlap of one unit.
///
/// Returns `None` when the unit cannot be evaluated (unknown channel, no
/// complete clip, flat template); such units are kept.
pub fn noise_overlap(
    recording: &dyn Recording,
    train: &SpikeTrain,
    label: u32,
    clip_size: usize,
) -> SortResult<Option<f64>> {
    let num_frames = recording.num_frames();
    if num_frames <= clip_size {
        return Ok(None);
    }
    let Some(channel) = train
        .dominant_channel()
        .and_then(|id| channel_index(recording, id))
    else {
        return Ok(None);
    };

    let half = clip_size / 2;
    let starts: Vec<usize> = train
        .frames
        .iter()
        .filter_map(|&f| usize::try_from(f).ok())
        .filter(|&f| f >= half && f - half + clip_size <= num_frames)
        .map(|f| f - half)
        .collect();
    if starts.is_empty() {
        return Ok(None);
    }
    let step = starts.len().div_ceil(MAX_CLIPS);
    let mut clips = Vec::new();
    for &start in starts.iter().step_by(step) {
        clips.push(read_clip(recording, channel, start, clip_size)?);
    }

    let template = mean_clip(&clips, clip_size);
    let norm = template.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 {
        return Ok(None);
    }

    let mut rng = Pcg64::seed_from_u64(SEED_BASE ^ u64::from(label));
    let num_noise = clips.len().max(MIN_NOISE_CLIPS);
    let mut noise = Vec::with_capacity(num_noise);
    for _ in 0..num_noise {
        let start = rng.gen_range(0..=num_frames - clip_size);
        noise.push(read_clip(recording, channel, start, clip_size)?);
    }

    let project = |clip: &Vec<f64>| -> f64 {
        clip.iter().zip(&template).map(|(a, b)| a * b).sum::<f64>() / norm
    };
    let signal: Vec<f64> = clips.iter().map(project).collect();
    let noise: Vec<f64> = noise.iter().map(project).collect();

    let signal_mean = mean(&signal);
    let noise_mean = mean(&noise);
    let cut = (signal_mean + noise_mean) / 2.0;
    let above = signal_mean >= noise_mean;

    let noise_wrong = noise.iter().filter(|&&p| (p >= cut) == above).count();
    let signal_wrong = signal.iter().filter(|&&p| (p >= cut) != above).count();
    let overlap = (noise_wrong as f64 / noise.len() as f64
        + signal_wrong as f64 / signal.len() as f64)
        / 2.0;
    Ok(Some(overlap))
}

fn channel_index(recording: &dyn Recording, id: u32) -> Option<usize> {
    recording.channel_ids().iter().position(|&c| c == id)
}

fn read_clip(
    recording: &dyn Recording,
    channel: usize,
    start: usize,
    clip_size: usize,
) -> SortResult<Vec<f64>> {
    let num_channels = recording.num_channels();
    let traces = recording.traces(start, start + clip_size)?;
    Ok(traces
        .chunks_exact(num_channels)
        .map(|frame| f64::from(frame[channel]))
        .collect())
}

fn mean_clip(clips: &[Vec<f64>], clip_size: usize) -> Vec<f64> {
    let mut template = vec![0.0; clip_size];
    for clip in clips {
        for (t, v) in template.iter_mut().zip(clip) {
            *t += v;
        }
    }
    let n = clips.len() as f64;
    template.iter_mut().for_each(|t| *t /= n);
    template
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

use std::ops::Range;

use super::frames::{mean_square, CenteredFrames};
use crate::config::{HOP_LENGTH, N_FFT, SILENCE_TOP_DB};

/// Sample ranges whose short-time energy sits within `SILENCE_TOP_DB` of the
/// clip's loudest frame. A clip with no energy at all has no speech.
pub(crate) fn speech_intervals(samples: &[f32]) -> Vec<Range<usize>> {
    if samples.is_empty() {
        return Vec::new();
    }
    let energies: Vec<f32> = CenteredFrames::new(samples, N_FFT, HOP_LENGTH)
        .iter()
        .map(mean_square)
        .collect();
    let peak = energies.iter().copied().fold(0.0_f32, f32::max);
    if peak <= 0.0 {
        return Vec::new();
    }
    let threshold = peak * 10f32.powf(-SILENCE_TOP_DB / 10.0);

    let to_samples = |frame: usize| (frame * HOP_LENGTH).min(samples.len());
    let mut intervals = Vec::new();
    let mut speech_start: Option<usize> = None;
    for (idx, &energy) in energies.iter().enumerate() {
        if energy > threshold {
            speech_start.get_or_insert(idx);
        } else if let Some(start) = speech_start.take() {
            intervals.push(to_samples(start)..to_samples(idx));
        }
    }
    if let Some(start) = speech_start {
        intervals.push(to_samples(start)..samples.len());
    }
    intervals.retain(|range| !range.is_empty());
    intervals
}

/// Fraction of the clip not covered by speech intervals, in [0, 1].
pub(crate) fn pause_ratio(samples: &[f32], sample_rate: u32) -> f64 {
    if samples.is_empty() || sample_rate == 0 {
        return 0.0;
    }
    let duration = samples.len() as f64 / sample_rate as f64;
    let speech: usize = speech_intervals(samples).iter().map(|r| r.len()).sum();
    let speech_duration = speech as f64 / sample_rate as f64;
    (1.0 - speech_duration / duration).clamp(0.0, 1.0)
}

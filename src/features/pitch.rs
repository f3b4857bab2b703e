use aus::analysis;

use super::frames::mean_and_variance;
use crate::config::{N_FFT, PITCH_FMAX_HZ, PITCH_FMIN_HZ, TARGET_SAMPLE_RATE};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct PitchStats {
    pub mean: f64,
    pub variance: f64,
    pub voiced_frames: usize,
}

/// pYIN statistics over voiced frames of a clip at the target rate.
///
/// `0.0` for both fields is a sentinel for "no voiced content": it is returned
/// when the tracker flags every frame unvoiced, and without running the tracker
/// for digitally silent clips and for clips shorter than one `N_FFT` frame
/// (128 ms at 16 kHz), even if those are voiced.
pub(crate) fn pitch_statistics(samples: &[f32]) -> PitchStats {
    let peak = samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
    if samples.len() < N_FFT || peak == 0.0 {
        return PitchStats::default();
    }
    let audio: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    let (_timestamps, pitches, voiced_flags, _confidence) = analysis::pyin_pitch_estimator(
        &audio,
        TARGET_SAMPLE_RATE,
        PITCH_FMIN_HZ,
        PITCH_FMAX_HZ,
        N_FFT,
    );
    let voiced = voiced_pitches(&pitches, &voiced_flags);
    let (mean, variance) = mean_and_variance(&voiced);
    PitchStats {
        mean,
        variance,
        voiced_frames: voiced.len(),
    }
}

fn voiced_pitches(pitches: &[f64], voiced: &[bool]) -> Vec<f64> {
    pitches
        .iter()
        .zip(voiced.iter())
        .filter_map(|(&pitch, &flag)| (flag && pitch.is_finite() && pitch > 0.0).then_some(pitch))
        .collect()
}

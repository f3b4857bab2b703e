mod frames;
mod pauses;
mod pitch;
pub mod spectral;
mod transcript;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::resample::linear_resample;
use crate::config::{HOP_LENGTH, MFCC_COUNT, N_FFT, TARGET_SAMPLE_RATE};
use crate::error::Result;
use crate::types::Waveform;

use frames::{mean_and_variance, mean_square, zero_crossing_rate, CenteredFrames};
pub use spectral::{MelSpectrogram, SpectralTransform};

/// Scalar acoustic and prosodic descriptors of one clip.
///
/// `pitch_mean == 0.0` means no voiced frames were found; it is never a real
/// pitch and should be treated as missing by statistical consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub duration: f64,
    pub rms_mean: f64,
    pub rms_variance: f64,
    pub zero_crossing_rate: f64,
    pub spectral_centroid: f64,
    pub speaking_rate: f64,
    pub pause_ratio: f64,
    pub pitch_mean: f64,
    pub pitch_variance: f64,
    pub filler_count: u32,
    pub mfcc_means: [f64; MFCC_COUNT],
}

impl FeatureRecord {
    fn empty(filler_count: u32) -> Self {
        Self {
            duration: 0.0,
            rms_mean: 0.0,
            rms_variance: 0.0,
            zero_crossing_rate: 0.0,
            spectral_centroid: 0.0,
            speaking_rate: 0.0,
            pause_ratio: 0.0,
            pitch_mean: 0.0,
            pitch_variance: 0.0,
            filler_count,
            mfcc_means: [0.0; MFCC_COUNT],
        }
    }

    /// True when the pitch fields hold the no-voiced-content sentinel.
    pub fn pitch_is_missing(&self) -> bool {
        self.pitch_mean == 0.0
    }
}

/// Computes [`FeatureRecord`]s. Pure: identical inputs give identical records.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, waveform: &Waveform, transcript: Option<&str>) -> Result<FeatureRecord> {
        let text = transcript.unwrap_or_default();
        let fillers = transcript::filler_count(text);
        let duration = waveform.duration();
        if waveform.samples().is_empty() {
            return Ok(FeatureRecord::empty(fillers));
        }

        let samples = linear_resample(
            waveform.samples(),
            waveform.sample_rate(),
            TARGET_SAMPLE_RATE,
        )?;

        let frames = CenteredFrames::new(&samples, N_FFT, HOP_LENGTH);
        let rms: Vec<f64> = frames
            .iter()
            .map(|frame| (mean_square(frame) as f64).sqrt())
            .collect();
        let (rms_mean, rms_variance) = mean_and_variance(&rms);
        let zcr: Vec<f64> = frames
            .iter()
            .map(|frame| zero_crossing_rate(frame) as f64)
            .collect();
        let (zcr_mean, _) = mean_and_variance(&zcr);

        let spectra = spectral::compute_spectra(&samples);
        let spectral_centroid = spectral::mean_spectral_centroid(&spectra);
        let mfcc_means = spectral::mfcc_means::<MFCC_COUNT>(&spectra);

        let pitch = pitch::pitch_statistics(&samples);
        let pause_ratio = pauses::pause_ratio(&samples, TARGET_SAMPLE_RATE);
        let words = transcript::word_count(text);

        debug!(
            duration,
            frames = frames.len(),
            voiced_frames = pitch.voiced_frames,
            words,
            "extracted clip features"
        );

        Ok(FeatureRecord {
            duration,
            rms_mean,
            rms_variance,
            zero_crossing_rate: zcr_mean,
            spectral_centroid,
            speaking_rate: transcript::speaking_rate(words, duration),
            pause_ratio,
            pitch_mean: pitch.mean,
            pitch_variance: pitch.variance,
            filler_count: fillers,
            mfcc_means,
        })
    }
}

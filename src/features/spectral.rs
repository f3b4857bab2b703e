use aus::analysis;
use aus::analysis::mel::MelFilterbank;
use aus::spectrum;
use aus::WindowType;
use ndarray::{Array2, Axis};

use super::frames::{frame_count, CenteredFrames};
use crate::config::{HOP_LENGTH, N_FFT, N_MELS, TARGET_SAMPLE_RATE, TOP_DB};
use crate::error::{Result, ScoringError};
use crate::types::FixedWindow;

const AMIN: f64 = 1e-10;

/// Log-power mel spectrogram, `[mel_bins × time_steps]`, in dB relative to
/// the clip's own peak power.
#[derive(Debug, Clone, PartialEq)]
pub struct MelSpectrogram {
    data: Array2<f32>,
}

impl MelSpectrogram {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub fn mel_bins(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn time_steps(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.mel_bins(), self.time_steps())
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Row-major values, mel bins outermost.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

/// STFT products of a clip at the target rate, framed like the rest of the
/// feature pipeline.
pub(crate) struct Spectra {
    /// `[frames][bins]`
    pub magnitude: Vec<Vec<f64>>,
    /// `[frames][mels]`, power scale
    pub mel: Vec<Vec<f64>>,
    pub freqs: Vec<f64>,
}

pub(crate) fn compute_spectra(samples: &[f32]) -> Spectra {
    let frames = CenteredFrames::new(samples, N_FFT, HOP_LENGTH);
    let audio: Vec<f64> = frames.padded().iter().map(|&s| s as f64).collect();

    let stft = spectrum::rstft(&audio, N_FFT, HOP_LENGTH, WindowType::Hanning);
    let (magnitude, _) = spectrum::complex_to_polar_rstft(&stft);
    let power = analysis::make_power_spectrogram(&magnitude);

    let freqs = spectrum::rfftfreq(N_FFT, TARGET_SAMPLE_RATE);
    let filterbank = MelFilterbank::new(
        0.0,
        TARGET_SAMPLE_RATE as f64 / 2.0,
        N_MELS,
        &freqs,
        true,
    );
    let mel = analysis::mel::make_mel_spectrogram(&power, &filterbank);

    Spectra {
        magnitude,
        mel,
        freqs,
    }
}

/// Fixed window → mel spectrogram with a constant shape.
///
/// Decibels are referenced to the loudest bin of the clip itself, so quiet
/// and loud recordings of the same utterance look alike. Absolute loudness
/// is discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectralTransform;

impl SpectralTransform {
    pub fn new() -> Self {
        Self
    }

    /// Time steps produced for a window of `window_len` samples.
    pub fn time_steps(window_len: usize) -> usize {
        frame_count(window_len, HOP_LENGTH)
    }

    pub fn transform(&self, window: &FixedWindow) -> Result<MelSpectrogram> {
        if window.sample_rate() != TARGET_SAMPLE_RATE {
            return Err(ScoringError::invalid_input(format!(
                "spectral transform expects {TARGET_SAMPLE_RATE} Hz, got {}",
                window.sample_rate()
            )));
        }
        let spectra = compute_spectra(window.samples());
        let time_steps = Self::time_steps(window.len());
        Ok(MelSpectrogram::new(power_to_db(&spectra.mel, time_steps)))
    }
}

/// Convert `[frames][mels]` power values to `[mels × time_steps]` dB. Missing
/// trailing frames are filled with the floor value; extra frames are dropped.
fn power_to_db(mel: &[Vec<f64>], time_steps: usize) -> Array2<f32> {
    let peak = mel
        .iter()
        .flat_map(|frame| frame.iter().copied())
        .fold(0.0_f64, f64::max);
    let reference_db = 10.0 * peak.max(AMIN).log10();
    let floor = -(TOP_DB as f64);

    let mut db = Array2::from_elem((N_MELS, time_steps), floor as f32);
    if peak <= 0.0 {
        db.fill(0.0);
    }
    for (t, frame) in mel.iter().take(time_steps).enumerate() {
        for (m, &power) in frame.iter().take(N_MELS).enumerate() {
            let value = 10.0 * power.max(AMIN).log10() - reference_db;
            db[[m, t]] = value.max(floor) as f32;
        }
    }
    db
}

/// Mean over frames of the magnitude-weighted centroid frequency.
pub(crate) fn mean_spectral_centroid(spectra: &Spectra) -> f64 {
    if spectra.magnitude.is_empty() {
        return 0.0;
    }
    let total: f64 = spectra
        .magnitude
        .iter()
        .map(|frame| {
            let weight: f64 = frame.iter().sum();
            if weight <= 0.0 {
                return 0.0;
            }
            let weighted: f64 = frame
                .iter()
                .zip(spectra.freqs.iter())
                .map(|(m, f)| m * f)
                .sum();
            weighted / weight
        })
        .sum();
    total / spectra.magnitude.len() as f64
}

/// Per-coefficient mean of the MFCC matrix. Non-finite means become 0.
pub(crate) fn mfcc_means<const N: usize>(spectra: &Spectra) -> [f64; N] {
    let mut means = [0.0; N];
    if spectra.mel.is_empty() {
        return means;
    }
    let mfcc = analysis::mel::mfcc_spectrogram(&spectra.mel, N, None);
    if mfcc.is_empty() {
        return means;
    }
    for frame in &mfcc {
        for (acc, value) in means.iter_mut().zip(frame.iter()) {
            *acc += value;
        }
    }
    let frames = mfcc.len() as f64;
    for value in means.iter_mut() {
        *value /= frames;
        if !value.is_finite() {
            *value = 0.0;
        }
    }
    means
}

use std::sync::Arc;

use crate::audio::resample::linear_resample;
use crate::config::{fixed_window_len, TARGET_SAMPLE_RATE};
use crate::error::Result;
use crate::types::{FixedWindow, Waveform};

/// Resample to the target rate and right-pad with zeros or truncate to the
/// fixed analysis length. Empty input yields an all-zero window.
pub fn fix_window(waveform: &Waveform) -> Result<FixedWindow> {
    let target_len = fixed_window_len();
    let mut samples = linear_resample(
        waveform.samples(),
        waveform.sample_rate(),
        TARGET_SAMPLE_RATE,
    )?;
    samples.resize(target_len, 0.0);
    Ok(FixedWindow {
        samples: Arc::from(samples),
        sample_rate: TARGET_SAMPLE_RATE,
    })
}

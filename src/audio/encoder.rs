use std::path::Path;

use crate::error::{Result, ScoringError};
use crate::types::FixedWindow;

/// Write a normalized window as 16-bit mono WAV, the hand-off format for
/// external transcription engines.
pub fn write_window_wav<P: AsRef<Path>>(window: &FixedWindow, path: P) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: window.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(|err| wav_error(path, err))?;
    for &sample in window.samples() {
        let scaled = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer
            .write_sample(scaled)
            .map_err(|err| wav_error(path, err))?;
    }
    writer.finalize().map_err(|err| wav_error(path, err))?;
    Ok(())
}

fn wav_error(path: &Path, err: hound::Error) -> ScoringError {
    match err {
        hound::Error::IoError(source) => ScoringError::persistence("writing WAV window", path, source),
        other => ScoringError::invalid_input(format!("cannot encode {}: {other}", path.display())),
    }
}

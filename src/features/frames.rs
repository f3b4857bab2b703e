/// Zero-padded centered framing: frame `i` is centered on sample `i * hop`,
/// giving `1 + len / hop` frames for a clip of `len` samples.
pub(crate) struct CenteredFrames {
    padded: Vec<f32>,
    frame_len: usize,
    hop: usize,
    count: usize,
}

impl CenteredFrames {
    pub(crate) fn new(samples: &[f32], frame_len: usize, hop: usize) -> Self {
        let pad = frame_len / 2;
        let mut padded = Vec::with_capacity(samples.len() + 2 * pad);
        padded.resize(pad, 0.0);
        padded.extend_from_slice(samples);
        padded.resize(samples.len() + 2 * pad, 0.0);
        Self {
            padded,
            frame_len,
            hop: hop.max(1),
            count: frame_count(samples.len(), hop),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }

    /// The padded signal, for transforms that frame internally.
    pub(crate) fn padded(&self) -> &[f32] {
        &self.padded
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.count).map(move |idx| {
            let start = idx * self.hop;
            let end = (start + self.frame_len).min(self.padded.len());
            &self.padded[start..end]
        })
    }
}

pub(crate) fn frame_count(len: usize, hop: usize) -> usize {
    1 + len / hop.max(1)
}

pub(crate) fn mean_square(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32
}

/// Fraction of adjacent sample pairs whose sign differs. Zero counts as positive.
pub(crate) fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
        .count();
    crossings as f32 / frame.len() as f32
}

/// Mean and population variance.
pub(crate) fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

//! Core types shared by the scoring pipeline

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};

/// Decoded mono audio, normalized to [-1.0, 1.0].
#[derive(Debug, Clone)]
pub struct Waveform {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(ScoringError::invalid_input("sample rate must be positive"));
        }
        Ok(Self {
            samples: samples.into(),
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// A waveform resampled to the target rate and padded or truncated to the
/// fixed analysis length. Built by [`crate::audio::window::fix_window`].
#[derive(Debug, Clone)]
pub struct FixedWindow {
    pub(crate) samples: Arc<[f32]>,
    pub(crate) sample_rate: u32,
}

impl FixedWindow {
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// View the window as a waveform for consumers that accept any clip.
    pub fn to_waveform(&self) -> Waveform {
        Waveform {
            samples: Arc::clone(&self.samples),
            sample_rate: self.sample_rate,
        }
    }
}

/// Soft-skill scores on the user-facing 1–5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub confidence: f32,
    pub clarity: f32,
}

impl ScoreResult {
    /// Map raw model outputs in [0, 1] onto the 1–5 scale. Values outside the
    /// unit interval are clamped first.
    pub fn from_raw(confidence: f32, clarity: f32) -> Self {
        Self {
            confidence: rescale(confidence),
            clarity: rescale(clarity),
        }
    }
}

/// `score = raw * 4 + 1`.
pub fn rescale(raw: f32) -> f32 {
    raw.clamp(0.0, 1.0) * 4.0 + 1.0
}

/// Inverse of [`rescale`], used to normalize human 1–5 ratings into training
/// targets.
pub fn normalize_rating(rating: f32) -> f32 {
    (rating - 1.0) / 4.0
}

/// Uniform payload returned by the inference boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreResponse {
    Scores(ScoreResult),
    Failure { error: String },
}

impl ScoreResponse {
    pub fn failure(err: impl std::fmt::Display) -> Self {
        Self::Failure {
            error: err.to_string(),
        }
    }

    pub fn scores(&self) -> Option<ScoreResult> {
        match self {
            Self::Scores(scores) => Some(*scores),
            Self::Failure { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_maps_unit_interval_onto_five_point_scale() {
        assert_eq!(rescale(0.0), 1.0);
        assert_eq!(rescale(1.0), 5.0);
        assert_eq!(rescale(0.5), 3.0);
    }

    #[test]
    fn rescale_clamps_out_of_range_outputs() {
        assert_eq!(rescale(-0.3), 1.0);
        assert_eq!(rescale(1.7), 5.0);
    }

    #[test]
    fn normalize_rating_inverts_rescale() {
        for rating in [1.0_f32, 2.0, 3.5, 5.0] {
            assert!((rescale(normalize_rating(rating)) - rating).abs() < 1e-6);
        }
    }

    #[test]
    fn rejects_zero_sample_rate() {
        assert!(Waveform::new(vec![0.0_f32; 4], 0).is_err());
    }

    #[test]
    fn response_serializes_untagged() {
        let ok = ScoreResponse::Scores(ScoreResult::from_raw(0.5, 1.0));
        assert_eq!(
            serde_json::to_string(&ok).unwrap(),
            r#"{"confidence":3.0,"clarity":5.0}"#
        );
        let err = ScoreResponse::failure("broken");
        assert_eq!(serde_json::to_string(&err).unwrap(), r#"{"error":"broken"}"#);
    }
}

//! Speech soft-skill scoring: fixed-window audio normalization, log-mel
//! spectrograms, clip features, a CNN + BiLSTM acoustic model trained in three
//! transfer-learning stages, and a scoring boundary that reports confidence
//! and clarity on a 1-5 scale.

pub mod audio;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod types;

pub use error::{Result, ScoringError};
pub use features::{FeatureExtractor, FeatureRecord, MelSpectrogram, SpectralTransform};
pub use inference::InferenceAdapter;
pub use model::{AcousticModel, HeadSpec, LoadPolicy};
pub use types::{FixedWindow, ScoreResponse, ScoreResult, Waveform};

use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for results returned by the scoring pipeline.
pub type Result<T> = std::result::Result<T, ScoringError>;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("failed to decode audio: {message}")]
    Decode { message: String },
    #[error("shape mismatch for {key}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        key: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("checkpoint {path} is incompatible: {reason}")]
    IncompatibleCheckpoint { path: PathBuf, reason: String },
    #[error("I/O error while {context} ({path}): {source}")]
    Persistence {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset error: {message}")]
    Dataset { message: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("parameter store lock poisoned while {context}")]
    ParameterStore { context: &'static str },
    #[error("model runtime error: {0}")]
    Model(#[from] candle_core::Error),
}

impl ScoringError {
    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }

    pub(crate) fn persistence(
        context: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Persistence {
            context,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn dataset(message: impl Into<String>) -> Self {
        Self::Dataset {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn parameter_store(context: &'static str) -> Self {
        Self::ParameterStore { context }
    }

    pub(crate) fn shape_mismatch(key: impl Into<String>, expected: &[usize], found: &[usize]) -> Self {
        Self::ShapeMismatch {
            key: key.into(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}

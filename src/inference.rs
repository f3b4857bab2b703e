//! Scoring boundary: raw audio in, `{confidence, clarity}` or `{error}` out.

use std::path::Path;
use std::sync::Arc;

use candle_core::Device;
use tracing::{debug, warn};

use crate::audio::{decoder, window};
use crate::config::ModelConfig;
use crate::error::{Result, ScoringError};
use crate::features::SpectralTransform;
use crate::model::{AcousticModel, HeadSpec, LoadPolicy};
use crate::types::{FixedWindow, ScoreResponse, ScoreResult, Waveform};

/// Shares one loaded regression model across callers.
#[derive(Clone)]
pub struct InferenceAdapter {
    model: Arc<AcousticModel>,
    transform: SpectralTransform,
}

impl InferenceAdapter {
    /// Build a regression model with the widths recorded beside `checkpoint`
    /// (default widths when there is no sidecar) and strictly load it.
    pub fn load(checkpoint: &Path, device: &Device) -> Result<Self> {
        let config = match ModelConfig::read_sidecar(checkpoint)? {
            Some(config) => config,
            None => {
                debug!(
                    checkpoint = %checkpoint.display(),
                    "no model config sidecar, using default widths"
                );
                ModelConfig::default()
            }
        };
        Self::load_with_config(checkpoint, config, device)
    }

    pub fn load_with_config(
        checkpoint: &Path,
        config: ModelConfig,
        device: &Device,
    ) -> Result<Self> {
        let model = AcousticModel::new(config, HeadSpec::Regression, device)?;
        model.load(checkpoint, LoadPolicy::Strict)?;
        Self::from_model(model)
    }

    pub fn from_model(model: AcousticModel) -> Result<Self> {
        if model.head_spec() != HeadSpec::Regression {
            return Err(ScoringError::invalid_input(format!(
                "inference needs a regression head, model has {:?}",
                model.head_spec()
            )));
        }
        Ok(Self {
            model: Arc::new(model),
            transform: SpectralTransform::new(),
        })
    }

    pub fn model(&self) -> &AcousticModel {
        &self.model
    }

    pub fn score_window(&self, clip: &FixedWindow) -> Result<ScoreResult> {
        let mel = self.transform.transform(clip)?;
        let xs = self.model.batch_input(&[&mel])?;
        let outputs = self.model.forward_t(&xs, false)?.squeeze(0)?.to_vec1::<f32>()?;
        let [confidence, clarity] = outputs[..] else {
            return Err(ScoringError::shape_mismatch(
                "regression output",
                &[2],
                &[outputs.len()],
            ));
        };
        debug!(confidence, clarity, "raw regression output");
        Ok(ScoreResult::from_raw(confidence, clarity))
    }

    pub fn score_waveform(&self, waveform: &Waveform) -> Result<ScoreResult> {
        self.score_window(&window::fix_window(waveform)?)
    }

    /// Decode and score. Every failure becomes an error payload.
    pub fn score_bytes(&self, bytes: Vec<u8>, extension: Option<&str>) -> ScoreResponse {
        let scored = decoder::decode_bytes(bytes, extension)
            .and_then(|waveform| self.score_waveform(&waveform));
        match scored {
            Ok(scores) => ScoreResponse::Scores(scores),
            Err(err) => {
                warn!(error = %err, "scoring failed");
                ScoreResponse::failure(err)
            }
        }
    }
}

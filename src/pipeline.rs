//! End-to-end clip analysis: decode once, transcribe, describe, log, score.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audio::{decoder, window};
use crate::dataset::{generate_sample_id, MetadataLog, MetadataRow};
use crate::error::Result;
use crate::features::{FeatureExtractor, FeatureRecord};
use crate::inference::InferenceAdapter;
use crate::types::{FixedWindow, ScoreResponse};

/// Speech-to-text backend. Receives the normalized analysis window.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, clip: &FixedWindow) -> Result<String>;
}

/// Returns the same text for every clip, e.g. a transcript supplied by the
/// caller or produced by an external service.
#[derive(Debug, Clone, Default)]
pub struct FixedTranscript(pub String);

impl Transcriber for FixedTranscript {
    fn transcribe(&self, _clip: &FixedWindow) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipAnalysis {
    pub transcript: String,
    pub sample_id: String,
    pub features: FeatureRecord,
    pub scores: ScoreResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisResponse {
    Complete(Box<ClipAnalysis>),
    Failure { error: String },
}

impl AnalysisResponse {
    pub fn analysis(&self) -> Option<&ClipAnalysis> {
        match self {
            Self::Complete(analysis) => Some(analysis),
            Self::Failure { .. } => None,
        }
    }
}

pub struct ClipAnalyzer {
    adapter: InferenceAdapter,
    transcriber: Box<dyn Transcriber>,
    extractor: FeatureExtractor,
    metadata: Option<MetadataLog>,
}

impl ClipAnalyzer {
    pub fn new(adapter: InferenceAdapter, transcriber: Box<dyn Transcriber>) -> Self {
        Self {
            adapter,
            transcriber,
            extractor: FeatureExtractor::new(),
            metadata: None,
        }
    }

    /// Record every successful analysis in `log`.
    pub fn with_metadata(mut self, log: MetadataLog) -> Self {
        self.metadata = Some(log);
        self
    }

    /// Never fails: errors come back as [`AnalysisResponse::Failure`]. A
    /// scoring failure alone still returns the transcript and features.
    pub fn analyze(&self, bytes: Vec<u8>, extension: Option<&str>) -> AnalysisResponse {
        match self.try_analyze(bytes, extension) {
            Ok(analysis) => AnalysisResponse::Complete(Box::new(analysis)),
            Err(err) => {
                warn!(error = %err, "clip analysis failed");
                AnalysisResponse::Failure {
                    error: err.to_string(),
                }
            }
        }
    }

    fn try_analyze(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<ClipAnalysis> {
        let waveform = decoder::decode_bytes(bytes, extension)?;
        let clip = window::fix_window(&waveform)?;
        let transcript = self.transcriber.transcribe(&clip)?.trim().to_string();
        let features = self.extractor.extract(&waveform, Some(&transcript))?;
        let sample_id = generate_sample_id();

        if let Some(log) = &self.metadata {
            log.append(&MetadataRow::new(&sample_id, &transcript, &features))?;
        }

        let scores = match self.adapter.score_window(&clip) {
            Ok(scores) => ScoreResponse::Scores(scores),
            Err(err) => ScoreResponse::failure(err),
        };
        info!(
            %sample_id,
            duration = features.duration,
            fillers = features.filler_count,
            scored = scores.scores().is_some(),
            "clip analyzed"
        );
        Ok(ClipAnalysis {
            transcript,
            sample_id,
            features,
            scores,
        })
    }
}

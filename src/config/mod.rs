//! Fixed signal constants plus the runtime configuration for training runs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};

pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const FIXED_DURATION_SECS: usize = 5;
pub const N_MELS: usize = 128;
pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;
/// Floor applied to log-mel values, relative to the clip peak.
pub const TOP_DB: f32 = 80.0;
/// Frames quieter than this many dB below the clip peak count as silence.
pub const SILENCE_TOP_DB: f32 = 25.0;
/// C2 and C7.
pub const PITCH_FMIN_HZ: f64 = 65.406;
pub const PITCH_FMAX_HZ: f64 = 2093.005;
pub const MFCC_COUNT: usize = 13;
pub const FILLER_WORDS: &[&str] = &["um", "uh", "like", "you know", "actually", "basically"];
pub const DATASET_VERSION: &str = "smartprep_v1";

const MODELS_DIR_ENV: &str = "SPEAKSCORE_MODELS_DIR";

/// Number of samples in every fixed analysis window.
pub const fn fixed_window_len() -> usize {
    TARGET_SAMPLE_RATE as usize * FIXED_DURATION_SECS
}

/// Widths of the acoustic model. Every layer size is derived from these values
/// when the model is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub n_mels: usize,
    pub time_steps: usize,
    pub conv_channels: [usize; 3],
    pub pool_factors: [usize; 3],
    pub lstm_hidden: usize,
    pub regression_hidden: usize,
    pub dropout: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_mels: N_MELS,
            time_steps: 1 + fixed_window_len() / HOP_LENGTH,
            conv_channels: [32, 64, 128],
            pool_factors: [2, 2, 1],
            lstm_hidden: 128,
            regression_hidden: 128,
            dropout: 0.3,
        }
    }
}

impl ModelConfig {
    /// File next to a checkpoint recording the widths it was saved with,
    /// e.g. `regression.config.json` for `regression.safetensors`.
    pub fn sidecar_path(checkpoint: &Path) -> PathBuf {
        checkpoint.with_extension("config.json")
    }

    pub fn write_sidecar(&self, checkpoint: &Path) -> Result<()> {
        let path = Self::sidecar_path(checkpoint);
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| ScoringError::persistence("encoding model config", &path, err.into()))?;
        std::fs::write(&path, json)
            .map_err(|err| ScoringError::persistence("writing model config", &path, err))
    }

    /// Widths recorded beside `checkpoint`, or `None` when it has no sidecar.
    pub fn read_sidecar(checkpoint: &Path) -> Result<Option<Self>> {
        let path = Self::sidecar_path(checkpoint);
        if !path.is_file() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .map_err(|err| ScoringError::persistence("reading model config", &path, err))?;
        let config = serde_json::from_str(&data).map_err(|err| {
            ScoringError::invalid_input(format!("malformed model config {path:?}: {err}"))
        })?;
        Ok(Some(config))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub validation_fraction: f32,
}

impl StageConfig {
    fn new(batch_size: usize, epochs: usize, learning_rate: f64) -> Self {
        Self {
            batch_size,
            epochs,
            learning_rate,
            validation_fraction: 0.2,
        }
    }

    pub fn validate(&self, stage: &str) -> Result<()> {
        if self.batch_size == 0 || self.epochs == 0 {
            return Err(ScoringError::invalid_input(format!(
                "{stage}: batch_size and epochs must be positive"
            )));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ScoringError::invalid_input(format!(
                "{stage}: learning_rate must be positive"
            )));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(ScoringError::invalid_input(format!(
                "{stage}: validation_fraction must be in [0, 1)"
            )));
        }
        Ok(())
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self::new(16, 10, 1e-4)
    }
}

/// Fields given for one stage in a training config file. Anything left out
/// keeps that stage's own default.
#[derive(Debug, Clone, Default, Deserialize)]
struct StageOverrides {
    batch_size: Option<usize>,
    epochs: Option<usize>,
    learning_rate: Option<f64>,
    validation_fraction: Option<f32>,
}

impl StageOverrides {
    fn apply(self, base: StageConfig) -> StageConfig {
        StageConfig {
            batch_size: self.batch_size.unwrap_or(base.batch_size),
            epochs: self.epochs.unwrap_or(base.epochs),
            learning_rate: self.learning_rate.unwrap_or(base.learning_rate),
            validation_fraction: self.validation_fraction.unwrap_or(base.validation_fraction),
        }
    }
}

/// Hyper-parameters for the three training stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TrainingConfigFile")]
pub struct TrainingConfig {
    pub seed: u64,
    pub device: String,
    pub model: ModelConfig,
    pub emotion: StageConfig,
    pub domain: StageConfig,
    pub regression: StageConfig,
    pub domain_max_samples: usize,
    pub domain_noise_std: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            device: "cpu".to_string(),
            model: ModelConfig::default(),
            emotion: StageConfig::new(16, 15, 1e-3),
            domain: StageConfig::new(16, 10, 1e-4),
            regression: StageConfig::new(8, 20, 1e-4),
            domain_max_samples: 5000,
            domain_noise_std: 0.005,
        }
    }
}

/// On-disk shape of [`TrainingConfig`]; every field is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct TrainingConfigFile {
    seed: u64,
    device: String,
    model: ModelConfig,
    emotion: StageOverrides,
    domain: StageOverrides,
    regression: StageOverrides,
    domain_max_samples: usize,
    domain_noise_std: f32,
}

impl Default for TrainingConfigFile {
    fn default() -> Self {
        let defaults = TrainingConfig::default();
        Self {
            seed: defaults.seed,
            device: defaults.device,
            model: defaults.model,
            emotion: StageOverrides::default(),
            domain: StageOverrides::default(),
            regression: StageOverrides::default(),
            domain_max_samples: defaults.domain_max_samples,
            domain_noise_std: defaults.domain_noise_std,
        }
    }
}

impl From<TrainingConfigFile> for TrainingConfig {
    fn from(file: TrainingConfigFile) -> Self {
        let defaults = TrainingConfig::default();
        Self {
            seed: file.seed,
            device: file.device,
            model: file.model,
            emotion: file.emotion.apply(defaults.emotion),
            domain: file.domain.apply(defaults.domain),
            regression: file.regression.apply(defaults.regression),
            domain_max_samples: file.domain_max_samples,
            domain_noise_std: file.domain_noise_std,
        }
    }
}

impl TrainingConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|err| ScoringError::persistence("reading training config", path, err))?;
        let config: Self = serde_json::from_str(&data).map_err(|err| {
            ScoringError::invalid_input(format!("malformed training config {path:?}: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.emotion.validate("emotion")?;
        self.domain.validate("domain")?;
        self.regression.validate("regression")?;
        Ok(())
    }
}

/// Location of checkpoints produced and consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub models_dir: PathBuf,
}

impl ArtifactConfig {
    pub fn from_override(path: Option<PathBuf>) -> Result<Self> {
        let dir = match path {
            Some(custom) => custom,
            None => default_models_dir(),
        };
        std::fs::create_dir_all(&dir)
            .map_err(|err| ScoringError::persistence("creating models directory", &dir, err))?;
        Ok(Self { models_dir: dir })
    }

    pub fn checkpoint_path(&self, file_name: &str) -> PathBuf {
        self.models_dir.join(file_name)
    }
}

fn default_models_dir() -> PathBuf {
    std::env::var_os(MODELS_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("models"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_time_steps_match_centered_framing() {
        assert_eq!(fixed_window_len(), 80_000);
        assert_eq!(ModelConfig::default().time_steps, 157);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: TrainingConfig =
            serde_json::from_str(r#"{"seed": 7, "regression": {"epochs": 3}}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.regression.epochs, 3);
        assert_eq!(config.regression.batch_size, 8);
        assert_eq!(config.regression.learning_rate, 1e-4);
        assert_eq!(config.emotion.learning_rate, 1e-3);
        assert_eq!(config.model, ModelConfig::default());
    }

    #[test]
    fn stage_overrides_merge_onto_that_stage() {
        let config: TrainingConfig = serde_json::from_str(
            r#"{"emotion": {"batch_size": 4}, "domain": {"learning_rate": 0.01}}"#,
        )
        .unwrap();
        let defaults = TrainingConfig::default();
        assert_eq!(config.emotion.batch_size, 4);
        assert_eq!(config.emotion.epochs, 15);
        assert_eq!(config.emotion.learning_rate, 1e-3);
        assert_eq!(config.domain.learning_rate, 0.01);
        assert_eq!(config.domain.epochs, defaults.domain.epochs);
        assert_eq!(config.regression, defaults.regression);
    }

    #[test]
    fn serialized_config_reads_back_unchanged() {
        let mut config = TrainingConfig::default();
        config.regression.epochs = 3;
        config.model.lstm_hidden = 64;
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<TrainingConfig>(&json).unwrap(), config);
    }

    #[test]
    fn sidecar_sits_beside_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = dir.path().join("regression.safetensors");
        assert_eq!(ModelConfig::read_sidecar(&checkpoint).unwrap(), None);

        let config = ModelConfig {
            lstm_hidden: 64,
            ..ModelConfig::default()
        };
        config.write_sidecar(&checkpoint).unwrap();
        assert!(dir.path().join("regression.config.json").is_file());
        assert_eq!(ModelConfig::read_sidecar(&checkpoint).unwrap(), Some(config));
    }

    #[test]
    fn rejects_zero_batch_size() {
        let mut config = TrainingConfig::default();
        config.domain.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_override_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested");
        let config = ArtifactConfig::from_override(Some(target.clone())).unwrap();
        assert!(target.is_dir());
        assert_eq!(
            config.checkpoint_path("regression.safetensors"),
            target.join("regression.safetensors")
        );
    }
}

//! Three-stage transfer learning: emotion pretraining, domain adaptation, and
//! regression on human ratings with a frozen backbone.
//!
//! Each stage is a complete supervised run that ends by writing one
//! checkpoint into the models directory. Later stages refuse to start when the
//! checkpoint they build on is missing.

pub mod datasets;
pub mod metrics;

use std::path::PathBuf;

use candle_core::{Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ArtifactConfig, StageConfig, TrainingConfig};
use crate::error::{Result, ScoringError};
use crate::features::MelSpectrogram;
use crate::model::head::REGRESSION_OUTPUTS;
use crate::model::{AcousticModel, HeadSpec, LoadPolicy};
use datasets::{Example, ExampleSource, Target, DOMAIN_CLASSES, EMOTION_CLASSES};
use metrics::RegressionMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    EmotionPretrain,
    DomainAdapt,
    FrozenRegression,
}

impl Stage {
    pub const ALL: [Stage; 3] = [
        Stage::EmotionPretrain,
        Stage::DomainAdapt,
        Stage::FrozenRegression,
    ];

    pub fn checkpoint_name(self) -> &'static str {
        match self {
            Self::EmotionPretrain => "emotion_pretrain.safetensors",
            Self::DomainAdapt => "domain_adapt.safetensors",
            Self::FrozenRegression => "regression.safetensors",
        }
    }

    /// Head trained during this stage.
    pub fn head(self) -> HeadSpec {
        match self {
            Self::EmotionPretrain => HeadSpec::Classification {
                num_classes: EMOTION_CLASSES,
            },
            Self::DomainAdapt => HeadSpec::Classification {
                num_classes: DOMAIN_CLASSES,
            },
            Self::FrozenRegression => HeadSpec::Regression,
        }
    }

    /// Stage whose checkpoint must exist before this one can start.
    pub fn prerequisite(self) -> Option<Stage> {
        match self {
            Self::EmotionPretrain => None,
            Self::DomainAdapt => Some(Self::EmotionPretrain),
            Self::FrozenRegression => Some(Self::DomainAdapt),
        }
    }

    pub fn backbone_frozen(self) -> bool {
        matches!(self, Self::FrozenRegression)
    }

    fn settings(self, config: &TrainingConfig) -> &StageConfig {
        match self {
            Self::EmotionPretrain => &config.emotion,
            Self::DomainAdapt => &config.domain,
            Self::FrozenRegression => &config.regression,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::EmotionPretrain => "emotion",
            Self::DomainAdapt => "domain",
            Self::FrozenRegression => "regression",
        }
    }
}

/// Held-out performance after the final epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum ValidationReport {
    Classification { loss: f32, accuracy: f64 },
    Regression { loss: f32, mae: f64, rmse: f64, r2: f64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub epochs: usize,
    pub train_examples: usize,
    pub validation_examples: usize,
    pub final_train_loss: f32,
    pub validation: Option<ValidationReport>,
    pub checkpoint: PathBuf,
}

/// Resolve a device name. `cuda` and `metal` need candle built with the
/// matching backend.
pub fn select_device(name: &str) -> Result<Device> {
    Ok(match name {
        "cuda" => Device::new_cuda(0)?,
        "metal" => Device::new_metal(0)?,
        "cpu" => Device::Cpu,
        other => {
            return Err(ScoringError::invalid_input(format!(
                "unknown device {other:?}, expected cpu, cuda or metal"
            )))
        }
    })
}

pub struct Trainer {
    config: TrainingConfig,
    artifacts: ArtifactConfig,
    device: Device,
}

impl Trainer {
    pub fn new(config: TrainingConfig, artifacts: ArtifactConfig) -> Result<Self> {
        config.validate()?;
        let device = select_device(&config.device)?;
        Ok(Self {
            config,
            artifacts,
            device,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn checkpoint_path(&self, stage: Stage) -> PathBuf {
        self.artifacts.checkpoint_path(stage.checkpoint_name())
    }

    /// Build the stage's model and initialize it from the prerequisite
    /// checkpoint, if any.
    pub fn prepare(&self, stage: Stage) -> Result<AcousticModel> {
        let model_config = self.config.model.clone();
        match stage {
            Stage::EmotionPretrain => AcousticModel::new(model_config, stage.head(), &self.device),
            Stage::DomainAdapt => {
                let model = AcousticModel::new(model_config, stage.head(), &self.device)?;
                let report =
                    model.load(&self.checkpoint_path(Stage::EmotionPretrain), LoadPolicy::Partial)?;
                info!(
                    loaded = report.loaded.len(),
                    skipped = report.mismatched.len() + report.missing.len(),
                    "backbone initialized from emotion checkpoint"
                );
                Ok(model)
            }
            Stage::FrozenRegression => {
                let mut model =
                    AcousticModel::new(model_config, Stage::DomainAdapt.head(), &self.device)?;
                model.load(&self.checkpoint_path(Stage::DomainAdapt), LoadPolicy::Strict)?;
                model.swap_head(stage.head())?;
                Ok(model)
            }
        }
    }

    /// Prepare, fit and save one stage.
    pub fn run(&self, stage: Stage, source: &dyn ExampleSource) -> Result<StageSummary> {
        let mut model = self.prepare(stage)?;
        self.fit(stage, &mut model, source)
    }

    /// Train `model` for the configured epochs, then write the stage
    /// checkpoint. Nothing is written if any epoch fails.
    pub fn fit(
        &self,
        stage: Stage,
        model: &mut AcousticModel,
        source: &dyn ExampleSource,
    ) -> Result<StageSummary> {
        if model.head_spec() != stage.head() {
            return Err(ScoringError::invalid_input(format!(
                "{} stage expects head {:?}, model has {:?}",
                stage.label(),
                stage.head(),
                model.head_spec()
            )));
        }
        let settings = stage.settings(&self.config);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let (mut train_idx, val_idx) = split_indices(source.len(), settings, &mut rng)?;

        let vars: Vec<Var> = if stage.backbone_frozen() {
            model.head_vars()
        } else {
            let mut vars = model.backbone_vars();
            vars.extend(model.head_vars());
            vars
        };
        let mut optimizer = AdamW::new(
            vars,
            ParamsAdamW {
                lr: settings.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        info!(
            stage = stage.label(),
            train = train_idx.len(),
            validation = val_idx.len(),
            epochs = settings.epochs,
            batch_size = settings.batch_size,
            frozen_backbone = stage.backbone_frozen(),
            "training stage started"
        );

        let mut final_train_loss = 0.0;
        let mut validation = None;
        for epoch in 1..=settings.epochs {
            train_idx.shuffle(&mut rng);
            let mut loss_sum = 0.0;
            let mut batches = 0usize;
            for chunk in train_idx.chunks(settings.batch_size) {
                let examples = load_examples(source, chunk)?;
                let xs = batch_spectrograms(model, &examples)?;
                let outputs = if stage.backbone_frozen() {
                    model.forward_frozen_backbone(&xs, true)?
                } else {
                    model.forward_t(&xs, true)?
                };
                let loss = batch_loss(stage, &outputs, &examples, model.device())?;
                optimizer.backward_step(&loss)?;
                let value = loss.to_scalar::<f32>()?;
                debug!(stage = stage.label(), epoch, batch = batches, loss = value, "batch");
                loss_sum += value;
                batches += 1;
            }
            final_train_loss = loss_sum / batches.max(1) as f32;
            validation = evaluate(stage, model, source, &val_idx, settings.batch_size)?;
            log_epoch(stage, epoch, settings.epochs, final_train_loss, validation);
        }

        let checkpoint = self.checkpoint_path(stage);
        model.save(&checkpoint)?;
        info!(stage = stage.label(), checkpoint = %checkpoint.display(), "training stage finished");
        Ok(StageSummary {
            stage,
            epochs: settings.epochs,
            train_examples: train_idx.len(),
            validation_examples: val_idx.len(),
            final_train_loss,
            validation,
            checkpoint,
        })
    }
}

/// Seeded shuffle followed by a train/validation cut. The training side keeps
/// at least one example.
fn split_indices(
    len: usize,
    settings: &StageConfig,
    rng: &mut StdRng,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if len == 0 {
        return Err(ScoringError::dataset("training corpus is empty"));
    }
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(rng);
    let train_len = ((len as f32 * (1.0 - settings.validation_fraction)).floor() as usize).max(1);
    let validation = indices.split_off(train_len.min(len));
    Ok((indices, validation))
}

fn load_examples(source: &dyn ExampleSource, indices: &[usize]) -> Result<Vec<Example>> {
    indices.iter().map(|&i| source.example(i)).collect()
}

fn batch_spectrograms(model: &AcousticModel, examples: &[Example]) -> Result<Tensor> {
    let mels: Vec<&MelSpectrogram> = examples.iter().map(|e| &e.mel).collect();
    model.batch_input(&mels)
}

fn class_labels(examples: &[Example]) -> Result<Vec<u32>> {
    examples
        .iter()
        .map(|e| match e.target {
            Target::Class(label) => Ok(label),
            Target::Rating { .. } => Err(ScoringError::dataset(
                "classification stage received a rating target",
            )),
        })
        .collect()
}

fn rating_rows(examples: &[Example]) -> Result<Vec<[f32; REGRESSION_OUTPUTS]>> {
    examples
        .iter()
        .map(|e| match e.target {
            Target::Rating {
                confidence,
                clarity,
            } => Ok([confidence, clarity]),
            Target::Class(_) => Err(ScoringError::dataset(
                "regression stage received a class target",
            )),
        })
        .collect()
}

fn batch_loss(
    stage: Stage,
    outputs: &Tensor,
    examples: &[Example],
    device: &Device,
) -> Result<Tensor> {
    match stage.head() {
        HeadSpec::Classification { num_classes } => {
            let labels = class_labels(examples)?;
            if let Some(bad) = labels.iter().find(|&&l| l as usize >= num_classes) {
                return Err(ScoringError::dataset(format!(
                    "label {bad} out of range for {num_classes} classes"
                )));
            }
            let labels = Tensor::from_vec(labels, examples.len(), device)?;
            Ok(candle_nn::loss::cross_entropy(outputs, &labels)?)
        }
        HeadSpec::Regression => {
            let rows = rating_rows(examples)?;
            let flat: Vec<f32> = rows.iter().flatten().copied().collect();
            let targets = Tensor::from_vec(flat, (examples.len(), REGRESSION_OUTPUTS), device)?;
            Ok(candle_nn::loss::mse(outputs, &targets)?)
        }
    }
}

fn evaluate(
    stage: Stage,
    model: &AcousticModel,
    source: &dyn ExampleSource,
    indices: &[usize],
    batch_size: usize,
) -> Result<Option<ValidationReport>> {
    if indices.is_empty() {
        return Ok(None);
    }
    let mut loss_sum = 0.0;
    let mut batches = 0usize;
    let mut predicted = Vec::new();
    let mut labels = Vec::new();
    let mut outputs_rows = Vec::new();
    let mut target_rows = Vec::new();
    for chunk in indices.chunks(batch_size) {
        let examples = load_examples(source, chunk)?;
        let xs = batch_spectrograms(model, &examples)?;
        let outputs = model.forward_t(&xs, false)?;
        loss_sum += batch_loss(stage, &outputs, &examples, model.device())?.to_scalar::<f32>()?;
        batches += 1;
        match stage.head() {
            HeadSpec::Classification { .. } => {
                predicted.extend(outputs.argmax(1)?.to_vec1::<u32>()?);
                labels.extend(class_labels(&examples)?);
            }
            HeadSpec::Regression => {
                for row in outputs.to_vec2::<f32>()? {
                    outputs_rows.push([row[0], row[1]]);
                }
                target_rows.extend(rating_rows(&examples)?);
            }
        }
    }
    let loss = loss_sum / batches as f32;
    Ok(Some(match stage.head() {
        HeadSpec::Classification { .. } => ValidationReport::Classification {
            loss,
            accuracy: metrics::accuracy(&predicted, &labels),
        },
        HeadSpec::Regression => {
            let m = RegressionMetrics::compute(&outputs_rows, &target_rows);
            ValidationReport::Regression {
                loss,
                mae: m.mae,
                rmse: m.rmse,
                r2: m.r2,
            }
        }
    }))
}

fn log_epoch(
    stage: Stage,
    epoch: usize,
    epochs: usize,
    train_loss: f32,
    validation: Option<ValidationReport>,
) {
    match validation {
        Some(ValidationReport::Classification { loss, accuracy }) => info!(
            stage = stage.label(),
            epoch,
            epochs,
            train_loss,
            val_loss = loss,
            accuracy,
            "epoch complete"
        ),
        Some(ValidationReport::Regression {
            loss,
            mae,
            rmse,
            r2,
        }) => info!(
            stage = stage.label(),
            epoch,
            epochs,
            train_loss,
            val_loss = loss,
            mae,
            rmse,
            r2,
            "epoch complete"
        ),
        None => info!(stage = stage.label(), epoch, epochs, train_loss, "epoch complete"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use ndarray::Array2;

    fn tiny_model() -> ModelConfig {
        ModelConfig {
            n_mels: 8,
            time_steps: 6,
            conv_channels: [2, 4, 4],
            pool_factors: [2, 1, 1],
            lstm_hidden: 3,
            regression_hidden: 4,
            dropout: 0.1,
        }
    }

    fn trainer(dir: &std::path::Path) -> Trainer {
        let mut config = TrainingConfig {
            model: tiny_model(),
            ..TrainingConfig::default()
        };
        for stage in [&mut config.emotion, &mut config.domain, &mut config.regression] {
            stage.epochs = 2;
            stage.batch_size = 2;
        }
        let artifacts = ArtifactConfig::from_override(Some(dir.to_path_buf())).unwrap();
        Trainer::new(config, artifacts).unwrap()
    }

    fn mel(seed: usize) -> MelSpectrogram {
        MelSpectrogram::new(Array2::from_shape_fn((8, 6), |(m, t)| {
            -(((m * 7 + t * 3 + seed * 11) % 80) as f32)
        }))
    }

    fn class_corpus(classes: u32) -> Vec<Example> {
        (0..6)
            .map(|i| Example {
                mel: mel(i),
                target: Target::Class(i as u32 % classes),
            })
            .collect()
    }

    fn rated_corpus() -> Vec<Example> {
        (0..5)
            .map(|i| Example {
                mel: mel(i),
                target: Target::Rating {
                    confidence: i as f32 / 4.0,
                    clarity: 1.0 - i as f32 / 4.0,
                },
            })
            .collect()
    }

    #[test]
    fn split_keeps_every_index_once() {
        let mut rng = StdRng::seed_from_u64(1);
        let (train, val) = split_indices(10, &StageConfig::default(), &mut rng).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        let mut all: Vec<usize> = train.into_iter().chain(val).collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn split_rejects_empty_corpus() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(split_indices(0, &StageConfig::default(), &mut rng).is_err());
    }

    #[test]
    fn domain_stage_requires_emotion_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path());
        let err = trainer
            .run(Stage::DomainAdapt, &class_corpus(2))
            .err()
            .unwrap();
        assert!(matches!(err, ScoringError::Persistence { .. }));
        assert!(!trainer.checkpoint_path(Stage::DomainAdapt).exists());
    }

    #[test]
    fn stages_chain_and_frozen_stage_keeps_backbone() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path());

        let emotion = trainer
            .run(Stage::EmotionPretrain, &class_corpus(8))
            .unwrap();
        assert!(emotion.checkpoint.is_file());
        assert!(matches!(
            emotion.validation,
            Some(ValidationReport::Classification { .. })
        ));

        let domain = trainer.run(Stage::DomainAdapt, &class_corpus(2)).unwrap();
        assert!(domain.checkpoint.is_file());

        let mut model = trainer.prepare(Stage::FrozenRegression).unwrap();
        let before = model.backbone_parameters().unwrap();
        let head_before = model.head_parameters().unwrap();
        let summary = trainer
            .fit(Stage::FrozenRegression, &mut model, &rated_corpus())
            .unwrap();
        assert_eq!(model.backbone_parameters().unwrap(), before);
        assert_ne!(model.head_parameters().unwrap(), head_before);
        assert!(matches!(
            summary.validation,
            Some(ValidationReport::Regression { .. })
        ));
        let regression = trainer.checkpoint_path(Stage::FrozenRegression);
        assert!(regression.is_file());
        assert_eq!(ModelConfig::read_sidecar(&regression).unwrap(), Some(tiny_model()));
    }

    #[test]
    fn frozen_stage_rejects_incompatible_domain_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path());
        AcousticModel::new(
            tiny_model(),
            HeadSpec::Classification { num_classes: 8 },
            &Device::Cpu,
        )
        .unwrap()
        .save(&trainer.checkpoint_path(Stage::DomainAdapt))
        .unwrap();

        let err = trainer
            .run(Stage::FrozenRegression, &rated_corpus())
            .err()
            .unwrap();
        assert!(matches!(err, ScoringError::ShapeMismatch { .. }));
        assert!(!trainer.checkpoint_path(Stage::FrozenRegression).exists());
    }

    #[test]
    fn rejects_targets_for_the_wrong_task() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path());
        assert!(matches!(
            trainer.run(Stage::EmotionPretrain, &rated_corpus()),
            Err(ScoringError::Dataset { .. })
        ));
    }
}

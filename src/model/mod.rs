//! Convolutional + bidirectional LSTM acoustic model with swappable heads.
//!
//! Backbone and head keep their parameters in separate stores so a head can
//! be replaced, frozen around, or re-initialized without touching backbone
//! values. Every layer width is derived from [`ModelConfig`] when the model
//! is built; nothing is sized from the first input it sees.

mod backbone;
pub mod checkpoint;
pub mod head;

use std::collections::BTreeMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use tracing::info;

use crate::config::ModelConfig;
use crate::error::{Result, ScoringError};
use crate::features::MelSpectrogram;
use backbone::Backbone;
pub use checkpoint::{LoadPolicy, LoadReport};
pub use head::{HeadSpec, OutputHead};

const BACKBONE_GROUP: &str = "backbone";
const HEAD_GROUP: &str = "head";

/// Layer sizes implied by the model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapePlan {
    pub reduced_mels: usize,
    pub reduced_time: usize,
    pub lstm_input: usize,
    pub embedding: usize,
}

impl ShapePlan {
    pub fn derive(config: &ModelConfig) -> Result<Self> {
        if config.pool_factors.iter().any(|&p| p == 0) {
            return Err(ScoringError::invalid_input("pool factors must be positive"));
        }
        let reduce = |len: usize| config.pool_factors.iter().fold(len, |acc, &p| acc / p);
        let reduced_mels = reduce(config.n_mels);
        let reduced_time = reduce(config.time_steps);
        if reduced_mels == 0 || reduced_time == 0 {
            return Err(ScoringError::invalid_input(format!(
                "input {}x{} is too small for pool factors {:?}",
                config.n_mels, config.time_steps, config.pool_factors
            )));
        }
        let channels = config.conv_channels[config.conv_channels.len() - 1];
        Ok(Self {
            reduced_mels,
            reduced_time,
            lstm_input: channels * reduced_mels,
            embedding: 2 * config.lstm_hidden,
        })
    }
}

pub struct AcousticModel {
    config: ModelConfig,
    plan: ShapePlan,
    device: Device,
    backbone_vars: VarMap,
    backbone: Backbone,
    head_vars: VarMap,
    head: Box<dyn OutputHead>,
}

impl AcousticModel {
    pub fn new(config: ModelConfig, head: HeadSpec, device: &Device) -> Result<Self> {
        let plan = ShapePlan::derive(&config)?;
        let backbone_vars = VarMap::new();
        let backbone = Backbone::load(
            &config,
            &plan,
            VarBuilder::from_varmap(&backbone_vars, DType::F32, device),
        )?;
        let head_vars = VarMap::new();
        let head = head::build_head(
            head,
            plan.embedding,
            &config,
            VarBuilder::from_varmap(&head_vars, DType::F32, device),
        )?;
        info!(
            lstm_input = plan.lstm_input,
            embedding = plan.embedding,
            reduced_time = plan.reduced_time,
            head = ?head.spec(),
            "acoustic model constructed"
        );
        Ok(Self {
            config,
            plan,
            device: device.clone(),
            backbone_vars,
            backbone,
            head_vars,
            head,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn plan(&self) -> &ShapePlan {
        &self.plan
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn head_spec(&self) -> HeadSpec {
        self.head.spec()
    }

    /// Replace the output head with a freshly initialized one. Backbone
    /// parameters are not touched.
    pub fn swap_head(&mut self, spec: HeadSpec) -> Result<()> {
        let head_vars = VarMap::new();
        let head = head::build_head(
            spec,
            self.plan.embedding,
            &self.config,
            VarBuilder::from_varmap(&head_vars, DType::F32, &self.device),
        )?;
        info!(from = ?self.head.spec(), to = ?spec, "output head swapped");
        self.head_vars = head_vars;
        self.head = head;
        Ok(())
    }

    /// Stack spectrograms into a `[batch, 1, mels, time]` tensor.
    pub fn batch_input(&self, mels: &[&MelSpectrogram]) -> Result<Tensor> {
        let expected = [self.config.n_mels, self.config.time_steps];
        let mut data = Vec::with_capacity(mels.len() * expected[0] * expected[1]);
        for mel in mels {
            let (bins, steps) = mel.shape();
            if [bins, steps] != expected {
                return Err(ScoringError::shape_mismatch(
                    "input spectrogram",
                    &expected,
                    &[bins, steps],
                ));
            }
            data.extend(mel.data().iter().copied());
        }
        Ok(Tensor::from_vec(
            data,
            (mels.len(), 1, expected[0], expected[1]),
            &self.device,
        )?)
    }

    /// Pooled backbone embedding, `[batch, plan.embedding]`.
    pub fn embed(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let (_, channels, bins, _) = xs.dims4()?;
        if channels != 1 || bins != self.config.n_mels {
            return Err(ScoringError::shape_mismatch(
                "model input",
                &[1, self.config.n_mels],
                &[channels, bins],
            ));
        }
        Ok(self.backbone.forward_t(xs, train)?)
    }

    /// Full forward pass, `[batch, head outputs]`.
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let embedding = self.embed(xs, train)?;
        Ok(self.head.forward_t(&embedding, train)?)
    }

    /// Forward pass with the backbone in inference mode and cut out of the
    /// gradient graph.
    pub fn forward_frozen_backbone(&self, xs: &Tensor, head_train: bool) -> Result<Tensor> {
        let embedding = self.embed(xs, false)?.detach();
        Ok(self.head.forward_t(&embedding, head_train)?)
    }

    pub fn backbone_vars(&self) -> Vec<Var> {
        self.backbone_vars.all_vars()
    }

    pub fn head_vars(&self) -> Vec<Var> {
        self.head_vars.all_vars()
    }

    pub fn backbone_parameters(&self) -> Result<BTreeMap<String, Vec<f32>>> {
        snapshot(&self.backbone_vars)
    }

    pub fn head_parameters(&self) -> Result<BTreeMap<String, Vec<f32>>> {
        snapshot(&self.head_vars)
    }

    /// Write the parameters to `path` and the widths they were built with to
    /// [`ModelConfig::sidecar_path`].
    pub fn save(&self, path: &Path) -> Result<()> {
        checkpoint::save(&self.groups(), path)?;
        self.config.write_sidecar(path)
    }

    pub fn load(&self, path: &Path, policy: LoadPolicy) -> Result<LoadReport> {
        checkpoint::load(&self.groups(), path, policy, &self.device)
    }

    fn groups(&self) -> [checkpoint::ParameterGroup<'_>; 2] {
        [
            (BACKBONE_GROUP, &self.backbone_vars),
            (HEAD_GROUP, &self.head_vars),
        ]
    }
}

fn snapshot(vars: &VarMap) -> Result<BTreeMap<String, Vec<f32>>> {
    let data = vars
        .data()
        .lock()
        .map_err(|_| ScoringError::parameter_store("reading parameters"))?;
    let mut params = BTreeMap::new();
    for (name, var) in data.iter() {
        params.insert(name.clone(), var.as_tensor().flatten_all()?.to_vec1::<f32>()?);
    }
    Ok(params)
}

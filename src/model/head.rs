use candle_core::{Module, Tensor};
use candle_nn::{Dropout, Linear, VarBuilder};
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;

pub const REGRESSION_OUTPUTS: usize = 2;

/// Which head sits on top of the backbone embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadSpec {
    Classification { num_classes: usize },
    Regression,
}

impl HeadSpec {
    pub fn output_width(&self) -> usize {
        match self {
            Self::Classification { num_classes } => *num_classes,
            Self::Regression => REGRESSION_OUTPUTS,
        }
    }
}

/// Task-specific mapping from the pooled embedding to raw outputs.
pub trait OutputHead: Send + Sync {
    fn forward_t(&self, embedding: &Tensor, train: bool) -> candle_core::Result<Tensor>;

    fn spec(&self) -> HeadSpec;
}

pub struct ClassificationHead {
    fc: Linear,
    num_classes: usize,
}

impl ClassificationHead {
    pub fn load(embedding: usize, num_classes: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            fc: candle_nn::linear(embedding, num_classes, vb.pp("fc"))?,
            num_classes,
        })
    }
}

impl OutputHead for ClassificationHead {
    fn forward_t(&self, embedding: &Tensor, _train: bool) -> candle_core::Result<Tensor> {
        self.fc.forward(embedding)
    }

    fn spec(&self) -> HeadSpec {
        HeadSpec::Classification {
            num_classes: self.num_classes,
        }
    }
}

/// Two-layer perceptron producing (confidence, clarity) in roughly [0, 1].
pub struct RegressionHead {
    fc1: Linear,
    fc2: Linear,
    dropout: Dropout,
}

impl RegressionHead {
    pub fn load(
        embedding: usize,
        hidden: usize,
        dropout: f32,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        Ok(Self {
            fc1: candle_nn::linear(embedding, hidden, vb.pp("fc1"))?,
            fc2: candle_nn::linear(hidden, REGRESSION_OUTPUTS, vb.pp("fc2"))?,
            dropout: Dropout::new(dropout),
        })
    }
}

impl OutputHead for RegressionHead {
    fn forward_t(&self, embedding: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let h = self.fc1.forward(embedding)?.relu()?;
        let h = self.dropout.forward(&h, train)?;
        self.fc2.forward(&h)
    }

    fn spec(&self) -> HeadSpec {
        HeadSpec::Regression
    }
}

pub(crate) fn build_head(
    spec: HeadSpec,
    embedding: usize,
    config: &ModelConfig,
    vb: VarBuilder,
) -> candle_core::Result<Box<dyn OutputHead>> {
    Ok(match spec {
        HeadSpec::Classification { num_classes } => {
            Box::new(ClassificationHead::load(embedding, num_classes, vb)?)
        }
        HeadSpec::Regression => Box::new(RegressionHead::load(
            embedding,
            config.regression_hidden,
            config.dropout,
            vb,
        )?),
    })
}

use candle_core::{Module, ModuleT, Tensor};
use candle_nn::rnn::{LSTMConfig, LSTM, RNN};
use candle_nn::{BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, VarBuilder};

use super::ShapePlan;
use crate::config::ModelConfig;

struct ConvBlock {
    conv: Conv2d,
    norm: BatchNorm,
    pool: usize,
}

impl ConvBlock {
    fn load(in_c: usize, out_c: usize, pool: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        Ok(Self {
            conv: candle_nn::conv2d(in_c, out_c, 3, cfg, vb.pp("conv"))?,
            norm: candle_nn::batch_norm(out_c, BatchNormConfig::default(), vb.pp("norm"))?,
            pool,
        })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let xs = self.conv.forward(xs)?;
        let xs = self.norm.forward_t(&xs, train)?.relu()?;
        if self.pool > 1 {
            xs.max_pool2d(self.pool)
        } else {
            Ok(xs)
        }
    }
}

/// Convolutional front-end plus bidirectional LSTM, pooled to a fixed-width
/// embedding.
pub(crate) struct Backbone {
    blocks: Vec<ConvBlock>,
    lstm_forward: LSTM,
    lstm_backward: LSTM,
}

impl Backbone {
    pub(crate) fn load(
        config: &ModelConfig,
        plan: &ShapePlan,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let mut blocks = Vec::with_capacity(config.conv_channels.len());
        let mut in_c = 1;
        for (i, (&out_c, &pool)) in config
            .conv_channels
            .iter()
            .zip(config.pool_factors.iter())
            .enumerate()
        {
            blocks.push(ConvBlock::load(in_c, out_c, pool, vb.pp(format!("blocks.{i}")))?);
            in_c = out_c;
        }
        let lstm_forward = candle_nn::lstm(
            plan.lstm_input,
            config.lstm_hidden,
            LSTMConfig::default(),
            vb.pp("lstm.forward"),
        )?;
        let lstm_backward = candle_nn::lstm(
            plan.lstm_input,
            config.lstm_hidden,
            LSTMConfig::default(),
            vb.pp("lstm.backward"),
        )?;
        Ok(Self {
            blocks,
            lstm_forward,
            lstm_backward,
        })
    }

    /// `[batch, 1, mels, time]` → `[batch, 2 * hidden]`.
    pub(crate) fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let mut h = xs.clone();
        for block in &self.blocks {
            h = block.forward_t(&h, train)?;
        }
        let (b, c, f, t) = h.dims4()?;
        // One step per reduced time frame, carrying channels x reduced mels.
        let seq = h.permute((0, 3, 1, 2))?.contiguous()?.reshape((b, t, c * f))?;

        let forward = self
            .lstm_forward
            .states_to_tensor(&self.lstm_forward.seq(&seq)?)?;

        let reversed_idx = Tensor::from_vec((0..t as u32).rev().collect::<Vec<_>>(), t, seq.device())?;
        let reversed = seq.index_select(&reversed_idx, 1)?;
        let backward = self
            .lstm_backward
            .states_to_tensor(&self.lstm_backward.seq(&reversed)?)?
            .index_select(&reversed_idx, 1)?;

        Tensor::cat(&[&forward, &backward], 2)?.mean(1)
    }
}

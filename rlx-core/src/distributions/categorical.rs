use super::Distribution;
use crate::nets::{Mlp, build_mlp};
use crate::rng;
use candle_core::{D, Error, Result, Tensor};
use candle_nn::ops::{log_softmax, softmax};
use candle_nn::{Module, VarBuilder};
use rand::distr::Distribution as RandDistribution;
use rand::distr::weighted::WeightedIndex;

/// Categorical policy over a logits network.
pub struct Categorical {
    action_size: usize,
    logits: Mlp,
}

impl Categorical {
    pub fn build(
        input_dim: usize,
        action_size: usize,
        layers: &[usize],
        vb: &VarBuilder,
        prefix: &str,
    ) -> Result<Self> {
        let mut layers = layers.to_vec();
        layers.push(action_size);
        let logits = build_mlp(input_dim, &layers, vb, prefix)?;
        Ok(Self {
            action_size,
            logits,
        })
    }

    pub fn action_size(&self) -> usize {
        self.action_size
    }

    /// Full action distribution for a batch of states: `(probs, log_probs)`, both `(B, A)` and
    /// attached to the graph.
    pub fn probs_and_log_probs(&self, states: &Tensor) -> Result<(Tensor, Tensor)> {
        let logits = self.logits.forward(states)?;
        let probs = softmax(&logits, 1)?;
        let log_probs = log_softmax(&logits, 1)?;
        Ok((probs, log_probs))
    }
}

impl Distribution for Categorical {
    fn sample(&self, observation: &Tensor) -> Result<Tensor> {
        assert!(
            observation.rank() == 1,
            "observation should be a flattened tensor"
        );
        let logits = self.logits.forward(&observation.unsqueeze(0)?)?;
        let action_probs: Vec<f32> = softmax(&logits, 1)?.squeeze(0)?.to_vec1()?;
        let weighted = WeightedIndex::new(&action_probs).map_err(Error::wrap)?;
        let action = rng::with_rng(|rng| weighted.sample(rng)) as u32;
        Ok(Tensor::new(&[action], observation.device())?)
    }

    fn mode(&self, observation: &Tensor) -> Result<Tensor> {
        let logits = self.logits.forward(&observation.unsqueeze(0)?)?;
        logits.argmax(D::Minus1)
    }
}

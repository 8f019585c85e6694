use candle_core::{Result, Tensor};
use candle_nn::{Module, VarBuilder};
use rlx_core::nets::{Mlp, build_mlp};

/// Clipped double-Q critic pair over a concatenated state-action input. Both heads live in the
/// caller's varmap so one optimizer steps them together.
pub struct TwinCritic {
    q1: Mlp,
    q2: Mlp,
}

impl TwinCritic {
    pub fn build(input_dim: usize, layers: &[usize], vb: &VarBuilder) -> Result<Self> {
        let mut layers = layers.to_vec();
        layers.push(1);
        Ok(Self {
            q1: build_mlp(input_dim, &layers, vb, "q1_")?,
            q2: build_mlp(input_dim, &layers, vb, "q2_")?,
        })
    }

    /// Both Q estimates, each `(B, 1)`.
    pub fn forward(&self, states: &Tensor, actions: &Tensor) -> Result<(Tensor, Tensor)> {
        let input = Tensor::cat(&[states, actions], 1)?;
        Ok((self.q1.forward(&input)?, self.q2.forward(&input)?))
    }

    pub fn forward_min(&self, states: &Tensor, actions: &Tensor) -> Result<Tensor> {
        let (q1, q2) = self.forward(states, actions)?;
        q1.minimum(&q2)
    }
}

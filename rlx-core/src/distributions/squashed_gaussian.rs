use super::Distribution;
use crate::nets::{Mlp, build_mlp};
use candle_core::{Result, Tensor};
use candle_nn::{Module, VarBuilder};
use std::f64::consts::PI;

const LOG_STD_MIN: f64 = -20.;
const LOG_STD_MAX: f64 = 2.;
const SQUASH_EPS: f64 = 1e-6;

/// Tanh-squashed diagonal Gaussian policy. One trunk predicts both the mean and the log
/// standard deviation; actions are squashed into `(-1, 1)` and the log-likelihood carries the
/// tanh change-of-variables correction.
pub struct SquashedDiagGaussian {
    action_size: usize,
    net: Mlp,
}

impl SquashedDiagGaussian {
    pub fn build(
        input_dim: usize,
        action_size: usize,
        layers: &[usize],
        vb: &VarBuilder,
        prefix: &str,
    ) -> Result<Self> {
        let mut layers = layers.to_vec();
        layers.push(2 * action_size);
        let net = build_mlp(input_dim, &layers, vb, prefix)?;
        Ok(Self { action_size, net })
    }

    pub fn action_size(&self) -> usize {
        self.action_size
    }

    fn mean_and_log_std(&self, states: &Tensor) -> Result<(Tensor, Tensor)> {
        let out = self.net.forward(states)?;
        let mean = out.narrow(1, 0, self.action_size)?;
        let log_std = out
            .narrow(1, self.action_size, self.action_size)?
            .clamp(LOG_STD_MIN, LOG_STD_MAX)?;
        Ok((mean, log_std))
    }

    /// Reparameterized draw for a batch of states: `(action (B, A), log_prob (B, 1))`, both
    /// attached to the graph.
    pub fn sample_with_log_prob(&self, states: &Tensor) -> Result<(Tensor, Tensor)> {
        let (mean, log_std) = self.mean_and_log_std(states)?;
        let std = log_std.exp()?;
        let noise = mean.randn_like(0., 1.)?;
        let pre_squash = (&mean + noise.mul(&std)?)?;
        let action = pre_squash.tanh()?;

        // Gaussian log-likelihood in terms of the noise, then the tanh correction.
        let half_log_2pi = 0.5 * (2. * PI).ln();
        let gauss = (noise.sqr()?.affine(-0.5, -half_log_2pi)? - &log_std)?;
        let correction = action.sqr()?.affine(-1., 1. + SQUASH_EPS)?.log()?;
        let log_prob = (gauss - correction)?.sum_keepdim(1)?;
        Ok((action, log_prob))
    }
}

impl Distribution for SquashedDiagGaussian {
    fn sample(&self, observation: &Tensor) -> Result<Tensor> {
        assert!(
            observation.rank() == 1,
            "observation should be a flattened tensor"
        );
        let (action, _) = self.sample_with_log_prob(&observation.unsqueeze(0)?)?;
        Ok(action.squeeze(0)?.detach())
    }

    fn mode(&self, observation: &Tensor) -> Result<Tensor> {
        let (mean, _) = self.mean_and_log_std(&observation.unsqueeze(0)?)?;
        Ok(mean.tanh()?.squeeze(0)?.detach())
    }
}

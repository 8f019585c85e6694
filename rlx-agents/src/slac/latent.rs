use candle_core::{Result, Tensor};
use candle_nn::{Module, VarBuilder};
use rlx_core::buffers::sequence_buffer::SequenceBatch;
use rlx_core::nets::{Mlp, build_mlp};

const LOG_STD_MIN: f64 = -10.;
const LOG_STD_MAX: f64 = 2.;

/// MLP trunk predicting the mean and std of a diagonal Gaussian.
pub(crate) struct GaussianHead {
    net: Mlp,
    out_dim: usize,
}

impl GaussianHead {
    fn build(
        input_dim: usize,
        out_dim: usize,
        layers: &[usize],
        vb: &VarBuilder,
        prefix: &str,
    ) -> Result<Self> {
        let mut layers = layers.to_vec();
        layers.push(2 * out_dim);
        Ok(Self {
            net: build_mlp(input_dim, &layers, vb, prefix)?,
            out_dim,
        })
    }

    fn forward(&self, input: &Tensor) -> Result<(Tensor, Tensor)> {
        let out = self.net.forward(input)?;
        let mean = out.narrow(1, 0, self.out_dim)?;
        let std = out
            .narrow(1, self.out_dim, self.out_dim)?
            .clamp(LOG_STD_MIN, LOG_STD_MAX)?
            .exp()?;
        Ok((mean, std))
    }
}

/// Per-batch KL between two diagonal Gaussians, summed over the latent dimension.
fn kl_divergence(
    post_mean: &Tensor,
    post_std: &Tensor,
    prior_mean: &Tensor,
    prior_std: &Tensor,
) -> Result<Tensor> {
    let log_ratio = (prior_std.log()? - post_std.log()?)?;
    let variance_term = (post_std.sqr()? + (post_mean - prior_mean)?.sqr()?)?
        .div(&prior_std.sqr()?.affine(2., 0.)?)?;
    ((log_ratio + variance_term)?.affine(1., -0.5)?).sum(1)
}

/// Stochastic latent-variable model: an observation encoder, a Gaussian latent chain with
/// learned prior and posterior, a decoder and a reward head. The chain is inferred with the
/// posterior and regularized toward the prior by KL.
pub struct LatentModel {
    pub(crate) encoder: Mlp,
    decoder: Mlp,
    prior: GaussianHead,
    posterior_init: GaussianHead,
    posterior: GaussianHead,
    reward: GaussianHead,
}

impl LatentModel {
    pub fn build(
        obs_size: usize,
        action_size: usize,
        feature_dim: usize,
        latent_dim: usize,
        layers: &[usize],
        vb: &VarBuilder,
    ) -> Result<Self> {
        let mut encoder_layers = layers.to_vec();
        encoder_layers.push(feature_dim);
        let mut decoder_layers = layers.to_vec();
        decoder_layers.push(obs_size);
        Ok(Self {
            encoder: build_mlp(obs_size, &encoder_layers, vb, "enc")?,
            decoder: build_mlp(latent_dim, &decoder_layers, vb, "dec")?,
            prior: GaussianHead::build(latent_dim + action_size, latent_dim, layers, vb, "prior")?,
            posterior_init: GaussianHead::build(feature_dim, latent_dim, layers, vb, "post0")?,
            posterior: GaussianHead::build(
                feature_dim + latent_dim + action_size,
                latent_dim,
                layers,
                vb,
                "post",
            )?,
            reward: GaussianHead::build(2 * latent_dim + action_size, 1, layers, vb, "rew")?,
        })
    }

    pub fn features(&self, states: &Tensor) -> Result<Tensor> {
        self.encoder.forward(states)
    }

    /// Splits a sequence batch into per-step feature and action tensors: `L + 1` features of
    /// `(B, F)` and `L` actions of `(B, A)`.
    pub fn encode_sequence(&self, batch: &SequenceBatch) -> Result<(Vec<Tensor>, Vec<Tensor>)> {
        let (_, num_states, _) = batch.states.dims3()?;
        let mut feats = Vec::with_capacity(num_states);
        for t in 0..num_states {
            let state_t = batch.states.narrow(1, t, 1)?.squeeze(1)?;
            feats.push(self.features(&state_t)?);
        }
        let mut actions = Vec::with_capacity(num_states - 1);
        for t in 0..num_states - 1 {
            actions.push(batch.actions.narrow(1, t, 1)?.squeeze(1)?);
        }
        Ok((feats, actions))
    }

    /// Runs the posterior chain over a sequence, sampling one latent per step. Returns the
    /// sampled latents and the summed KL against the (learned) prior chain; the first step is
    /// regularized toward a standard normal.
    pub fn infer_chain(
        &self,
        feats: &[Tensor],
        actions: &[Tensor],
    ) -> Result<(Vec<Tensor>, Tensor)> {
        let (post_mean, post_std) = self.posterior_init.forward(&feats[0])?;
        let prior_mean = post_mean.zeros_like()?;
        let prior_std = post_std.ones_like()?;
        let mut kl_total =
            kl_divergence(&post_mean, &post_std, &prior_mean, &prior_std)?.mean_all()?;
        let noise = post_mean.randn_like(0., 1.)?;
        let mut z = (&post_mean + noise.mul(&post_std)?)?;
        let mut latents = vec![z.clone()];
        for t in 1..feats.len() {
            let prior_input = Tensor::cat(&[&z, &actions[t - 1]], 1)?;
            let (prior_mean, prior_std) = self.prior.forward(&prior_input)?;
            let post_input = Tensor::cat(&[&feats[t], &z, &actions[t - 1]], 1)?;
            let (post_mean, post_std) = self.posterior.forward(&post_input)?;
            let kl = kl_divergence(&post_mean, &post_std, &prior_mean, &prior_std)?.mean_all()?;
            kl_total = (kl_total + kl)?;
            let noise = post_mean.randn_like(0., 1.)?;
            z = (&post_mean + noise.mul(&post_std)?)?;
            latents.push(z.clone());
        }
        Ok((latents, kl_total))
    }

    /// Evidence-lower-bound style training loss: KL plus reconstruction plus reward
    /// prediction error.
    pub fn loss(&self, batch: &SequenceBatch) -> Result<Tensor> {
        let (feats, actions) = self.encode_sequence(batch)?;
        let (latents, kl) = self.infer_chain(&feats, &actions)?;

        let mut recon_loss = kl.zeros_like()?;
        for (t, z) in latents.iter().enumerate() {
            let state_t = batch.states.narrow(1, t, 1)?.squeeze(1)?;
            let recon = self.decoder.forward(z)?;
            recon_loss = (recon_loss + (recon - state_t)?.sqr()?.mean_all()?)?;
        }

        let mut reward_loss = kl.zeros_like()?;
        for t in 1..latents.len() {
            let input = Tensor::cat(&[&latents[t - 1], &actions[t - 1], &latents[t]], 1)?;
            let (reward_mean, _) = self.reward.forward(&input)?;
            let reward_t = batch.rewards.narrow(1, t - 1, 1)?.squeeze(1)?;
            reward_loss = (reward_loss + (reward_mean - reward_t)?.sqr()?.mean_all()?)?;
        }

        (kl + recon_loss)? + reward_loss
    }
}

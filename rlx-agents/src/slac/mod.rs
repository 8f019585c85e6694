mod latent;

pub use latent::LatentModel;

use crate::twin_critic::TwinCritic;
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, Init, ParamsAdamW, VarBuilder, VarMap};
use rand::Rng;
use rlx_core::buffers::sequence_buffer::SequenceBuffer;
use rlx_core::distributions::{Distribution, SquashedDiagGaussian};
use rlx_core::env::{Env, EnvironmentDescription};
use rlx_core::observation::ObservationWindow;
use rlx_core::optim::{OptimizerWithMaxGrad, hard_update, soft_update};
use rlx_core::rng;
use rlx_core::{Algorithm, StepOutcome};
use std::path::Path;

pub struct SlacConfig {
    pub buffer_size: usize,
    pub batch_size: usize,
    pub gamma: f64,
    pub lr_sac: f64,
    pub lr_model: f64,
    pub lr_alpha: f64,
    pub layers: Vec<usize>,
    pub model_layers: Vec<usize>,
    pub feature_dim: usize,
    pub latent_dim: usize,
    pub num_sequences: usize,
    pub start_steps: usize,
    pub update_interval: usize,
    pub tau: f64,
    pub max_grad_norm: Option<f32>,
}

impl Default for SlacConfig {
    fn default() -> Self {
        Self {
            buffer_size: 20_000,
            batch_size: 32,
            gamma: 0.99,
            lr_sac: 3e-4,
            lr_model: 1e-4,
            lr_alpha: 3e-4,
            layers: vec![256, 256],
            model_layers: vec![256, 256],
            feature_dim: 64,
            latent_dim: 32,
            num_sequences: 8,
            start_steps: 10_000,
            update_interval: 1,
            tau: 5e-3,
            max_grad_norm: None,
        }
    }
}

/// Stochastic latent actor-critic. A latent-variable model is trained on stored sequences;
/// the critics act on inferred latents while the actor conditions on the raw feature-action
/// history, so acting never requires latent inference.
pub struct Slac {
    config: SlacConfig,
    env_description: EnvironmentDescription,
    model: LatentModel,
    model_optimizer: OptimizerWithMaxGrad,
    actor: SquashedDiagGaussian,
    actor_optimizer: OptimizerWithMaxGrad,
    critic: TwinCritic,
    critic_optimizer: OptimizerWithMaxGrad,
    critic_target: TwinCritic,
    critic_target_varmap: VarMap,
    log_alpha: Tensor,
    alpha_optimizer: OptimizerWithMaxGrad,
    target_entropy: f64,
    pub buffer: SequenceBuffer,
    step_count: usize,
    device: Device,
}

impl Slac {
    pub fn new(
        config: SlacConfig,
        env_description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<Self> {
        let obs_size = env_description.observation_size();
        let action_size = env_description.action_size();
        let feature_action_dim = config.num_sequences * config.feature_dim
            + (config.num_sequences - 1) * action_size;
        let critic_input_dim = config.latent_dim + action_size;

        let model_varmap = VarMap::new();
        let model_vb = VarBuilder::from_varmap(&model_varmap, DType::F32, device);
        let model = LatentModel::build(
            obs_size,
            action_size,
            config.feature_dim,
            config.latent_dim,
            &config.model_layers,
            &model_vb,
        )?;
        let model_optimizer = OptimizerWithMaxGrad::new(
            AdamW::new(
                model_varmap.all_vars(),
                ParamsAdamW {
                    lr: config.lr_model,
                    ..Default::default()
                },
            )?,
            config.max_grad_norm,
            model_varmap,
        );

        let actor_varmap = VarMap::new();
        let actor_vb = VarBuilder::from_varmap(&actor_varmap, DType::F32, device);
        let actor = SquashedDiagGaussian::build(
            feature_action_dim,
            action_size,
            &config.layers,
            &actor_vb,
            "pi",
        )?;
        let actor_optimizer = OptimizerWithMaxGrad::new(
            AdamW::new(
                actor_varmap.all_vars(),
                ParamsAdamW {
                    lr: config.lr_sac,
                    ..Default::default()
                },
            )?,
            config.max_grad_norm,
            actor_varmap,
        );

        let critic_varmap = VarMap::new();
        let critic_vb = VarBuilder::from_varmap(&critic_varmap, DType::F32, device);
        let critic = TwinCritic::build(critic_input_dim, &config.layers, &critic_vb)?;
        let critic_target_varmap = VarMap::new();
        let target_vb = VarBuilder::from_varmap(&critic_target_varmap, DType::F32, device);
        let critic_target = TwinCritic::build(critic_input_dim, &config.layers, &target_vb)?;
        hard_update(&critic_target_varmap, &critic_varmap)?;
        let critic_optimizer = OptimizerWithMaxGrad::new(
            AdamW::new(
                critic_varmap.all_vars(),
                ParamsAdamW {
                    lr: config.lr_sac,
                    ..Default::default()
                },
            )?,
            config.max_grad_norm,
            critic_varmap,
        );

        let alpha_varmap = VarMap::new();
        let log_alpha = alpha_varmap.get(1, "log_alpha", Init::Const(0.), DType::F32, device)?;
        let alpha_optimizer = OptimizerWithMaxGrad::new(
            AdamW::new(
                alpha_varmap.all_vars(),
                ParamsAdamW {
                    lr: config.lr_alpha,
                    ..Default::default()
                },
            )?,
            None,
            alpha_varmap,
        );

        let buffer = SequenceBuffer::new(config.buffer_size, config.num_sequences);
        Ok(Self {
            target_entropy: -(action_size as f64),
            env_description: env_description.clone(),
            config,
            model,
            model_optimizer,
            actor,
            actor_optimizer,
            critic,
            critic_optimizer,
            critic_target,
            critic_target_varmap,
            log_alpha,
            alpha_optimizer,
            buffer,
            step_count: 0,
            device: device.clone(),
        })
    }

    /// Actor input: encoder features of the windowed observations concatenated with the
    /// windowed actions, flattened to rank one.
    fn feature_action(&self, window: &ObservationWindow) -> Result<Tensor> {
        let feats = self.model.features(&window.stacked_states()?)?;
        let feats = feats.detach().flatten_all()?;
        let actions = window.stacked_actions()?.flatten_all()?;
        Ok(Tensor::cat(&[&feats, &actions], 0)?)
    }

    fn update_model(&mut self) -> Result<()> {
        let batch = self.buffer.sample(self.config.batch_size)?;
        let model_loss = self.model.loss(&batch)?;
        self.model_optimizer.backward_step(&model_loss)?;
        Ok(())
    }

    fn update_sac(&mut self) -> Result<()> {
        let batch = self.buffer.sample(self.config.batch_size)?;
        let (feats, actions) = self.model.encode_sequence(&batch)?;
        let (latents, _) = self.model.infer_chain(&feats, &actions)?;
        let last = self.config.num_sequences - 1;
        let z = latents[last].detach();
        let z_next = latents[last + 1].detach();
        let last_action = &actions[last];
        let rewards = batch.rewards.narrow(1, last, 1)?.squeeze(1)?;
        let dones = batch.dones.narrow(1, last, 1)?.squeeze(1)?;

        let window = self.config.num_sequences;
        let feats: Vec<Tensor> = feats.iter().map(|f| f.detach()).collect();
        let fa_parts: Vec<&Tensor> = feats[..window].iter().chain(&actions[..window - 1]).collect();
        let feature_action = Tensor::cat(&fa_parts, 1)?;
        let fa_next_parts: Vec<&Tensor> = feats[1..].iter().chain(&actions[1..]).collect();
        let feature_action_next = Tensor::cat(&fa_next_parts, 1)?;

        let alpha = self.log_alpha.exp()?.detach();

        // Critic update: bootstrap on the next latent with the actor's next action.
        let (next_actions, next_log_prob) =
            self.actor.sample_with_log_prob(&feature_action_next)?;
        let min_next_q = self.critic_target.forward_min(&z_next, &next_actions.detach())?;
        let next_value = (min_next_q - next_log_prob.detach().broadcast_mul(&alpha)?)?;
        let not_done = dones.affine(-1., 1.)?;
        let target = (&rewards + not_done.mul(&next_value)?.affine(self.config.gamma, 0.)?)?
            .detach();
        let (q1, q2) = self.critic.forward(&z, last_action)?;
        let critic_loss =
            ((q1 - &target)?.sqr()?.mean_all()? + (q2 - &target)?.sqr()?.mean_all()?)?;
        self.critic_optimizer.backward_step(&critic_loss)?;

        // Actor update on the current feature-action history.
        let (new_actions, log_prob) = self.actor.sample_with_log_prob(&feature_action)?;
        let min_q = self.critic.forward_min(&z, &new_actions)?;
        let actor_loss = (log_prob.broadcast_mul(&alpha)? - min_q)?.mean_all()?;
        self.actor_optimizer.backward_step(&actor_loss)?;

        let entropy_gap = log_prob.detach().affine(1., self.target_entropy)?.mean_all()?;
        let alpha_loss = self
            .log_alpha
            .broadcast_mul(&entropy_gap)?
            .neg()?
            .mean_all()?;
        self.alpha_optimizer.backward_step(&alpha_loss)?;

        soft_update(
            &self.critic_target_varmap,
            &self.critic_optimizer.varmap,
            self.config.tau,
        )?;
        Ok(())
    }
}

impl Algorithm for Slac {
    fn name(&self) -> &'static str {
        "slac"
    }

    fn observation_window(&self) -> ObservationWindow {
        ObservationWindow::new(
            self.config.num_sequences,
            self.env_description.action_size(),
            self.device.clone(),
        )
    }

    fn step(&mut self, env: &mut dyn Env, window: &mut ObservationWindow) -> Result<StepOutcome> {
        if self.buffer.needs_reset() {
            self.buffer.reset_episode(window.state().clone());
        }
        self.step_count += 1;
        let action = if self.step_count <= self.config.start_steps {
            self.env_description.action_space.sample(&self.device)?
        } else {
            self.explore(window)?
        };
        let snap_shot = env.step(&action)?;
        self.buffer.append(
            action.clone(),
            snap_shot.reward,
            snap_shot.terminated,
            snap_shot.state.clone(),
        )?;
        let episode_done = snap_shot.episode_over();
        if episode_done {
            let next_state = env.reset(rng::with_rng(|rng| rng.random()))?;
            window.reset_episode(next_state.clone());
            self.buffer.reset_episode(next_state);
        } else {
            window.append(action, snap_shot.state);
        }
        Ok(StepOutcome {
            reward: snap_shot.reward,
            episode_done,
        })
    }

    fn select_action(&self, window: &ObservationWindow) -> Result<Tensor> {
        let feature_action = self.feature_action(window)?;
        Ok(self.actor.mode(&feature_action)?)
    }

    fn explore(&self, window: &ObservationWindow) -> Result<Tensor> {
        let feature_action = self.feature_action(window)?;
        Ok(self.actor.sample(&feature_action)?)
    }

    fn is_update(&self) -> bool {
        self.step_count % self.config.update_interval == 0
            && self.step_count >= self.config.start_steps
            && self.buffer.len() >= self.config.batch_size
    }

    fn update(&mut self) -> Result<()> {
        self.update_model()?;
        self.update_sac()?;
        Ok(())
    }

    fn save_params(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.model_optimizer
            .varmap
            .save(dir.join("model.safetensors"))?;
        self.actor_optimizer
            .varmap
            .save(dir.join("actor.safetensors"))?;
        self.critic_optimizer
            .varmap
            .save(dir.join("critic.safetensors"))?;
        self.alpha_optimizer
            .varmap
            .save(dir.join("alpha.safetensors"))?;
        Ok(())
    }
}

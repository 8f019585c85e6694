use crate::twin_critic::TwinCritic;
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, Init, ParamsAdamW, VarBuilder, VarMap};
use rand::Rng;
use rlx_core::buffers::ExperienceBuffer;
use rlx_core::buffers::replay_buffer::ReplayBuffer;
use rlx_core::distributions::{Distribution, SquashedDiagGaussian};
use rlx_core::env::{Env, EnvironmentDescription};
use rlx_core::observation::ObservationWindow;
use rlx_core::optim::{OptimizerWithMaxGrad, hard_update, soft_update};
use rlx_core::rng;
use rlx_core::{Algorithm, StepOutcome};
use std::path::Path;

pub struct SacConfig {
    pub buffer_size: usize,
    pub batch_size: usize,
    pub gamma: f64,
    pub lr_actor: f64,
    pub lr_critic: f64,
    pub lr_alpha: f64,
    pub layers: Vec<usize>,
    pub start_steps: usize,
    pub update_interval: usize,
    pub tau: f64,
    pub max_grad_norm: Option<f32>,
}

impl Default for SacConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100_000,
            batch_size: 64,
            gamma: 0.99,
            lr_actor: 3e-4,
            lr_critic: 3e-4,
            lr_alpha: 3e-4,
            layers: vec![256, 256],
            start_steps: 10_000,
            update_interval: 1,
            tau: 5e-3,
            max_grad_norm: None,
        }
    }
}

/// Soft actor-critic for continuous control: squashed Gaussian actor, clipped double-Q
/// critics and an entropy temperature tuned against `-|A|`.
pub struct Sac {
    config: SacConfig,
    env_description: EnvironmentDescription,
    actor: SquashedDiagGaussian,
    actor_optimizer: OptimizerWithMaxGrad,
    critic: TwinCritic,
    critic_optimizer: OptimizerWithMaxGrad,
    critic_target: TwinCritic,
    critic_target_varmap: VarMap,
    log_alpha: Tensor,
    alpha_optimizer: OptimizerWithMaxGrad,
    target_entropy: f64,
    buffer: ReplayBuffer,
    step_count: usize,
    device: Device,
}

impl Sac {
    pub fn new(
        config: SacConfig,
        env_description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<Self> {
        let obs_size = env_description.observation_size();
        let action_size = env_description.action_size();

        let actor_varmap = VarMap::new();
        let actor_vb = VarBuilder::from_varmap(&actor_varmap, DType::F32, device);
        let actor =
            SquashedDiagGaussian::build(obs_size, action_size, &config.layers, &actor_vb, "pi")?;
        let actor_optimizer = OptimizerWithMaxGrad::new(
            AdamW::new(
                actor_varmap.all_vars(),
                ParamsAdamW {
                    lr: config.lr_actor,
                    ..Default::default()
                },
            )?,
            config.max_grad_norm,
            actor_varmap,
        );

        let critic_varmap = VarMap::new();
        let critic_vb = VarBuilder::from_varmap(&critic_varmap, DType::F32, device);
        let critic = TwinCritic::build(obs_size + action_size, &config.layers, &critic_vb)?;
        let critic_target_varmap = VarMap::new();
        let target_vb = VarBuilder::from_varmap(&critic_target_varmap, DType::F32, device);
        let critic_target = TwinCritic::build(obs_size + action_size, &config.layers, &target_vb)?;
        hard_update(&critic_target_varmap, &critic_varmap)?;
        let critic_optimizer = OptimizerWithMaxGrad::new(
            AdamW::new(
                critic_varmap.all_vars(),
                ParamsAdamW {
                    lr: config.lr_critic,
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

        let buffer = ReplayBuffer::new(config.buffer_size);
        Ok(Self {
            config,
            env_description: env_description.clone(),
            actor,
            actor_optimizer,
            critic,
            critic_optimizer,
            critic_target,
            critic_target_varmap,
            log_alpha,
            alpha_optimizer,
            target_entropy: -(action_size as f64),
            buffer,
            step_count: 0,
            device: device.clone(),
        })
    }
}

impl Algorithm for Sac {
    fn name(&self) -> &'static str {
        "sac"
    }

    fn observation_window(&self) -> ObservationWindow {
        ObservationWindow::new(1, self.env_description.action_size(), self.device.clone())
    }

    fn step(&mut self, env: &mut dyn Env, window: &mut ObservationWindow) -> Result<StepOutcome> {
        self.step_count += 1;
        let state = window.state().clone();
        let action = if self.step_count <= self.config.start_steps {
            self.env_description.action_space.sample(&self.device)?
        } else {
            self.explore(window)?
        };
        let snap_shot = env.step(&action)?;
        self.buffer.push(
            state,
            action.clone(),
            snap_shot.reward,
            snap_shot.terminated,
            snap_shot.state.clone(),
        );
        let episode_done = snap_shot.episode_over();
        if episode_done {
            let next_state = env.reset(rng::with_rng(|rng| rng.random()))?;
            window.reset_episode(next_state);
        } else {
            window.append(action, snap_shot.state);
        }
        Ok(StepOutcome {
            reward: snap_shot.reward,
            episode_done,
        })
    }

    fn select_action(&self, window: &ObservationWindow) -> Result<Tensor> {
        Ok(self.actor.mode(window.state())?)
    }

    fn explore(&self, window: &ObservationWindow) -> Result<Tensor> {
        Ok(self.actor.sample(window.state())?)
    }

    fn is_update(&self) -> bool {
        self.step_count % self.config.update_interval == 0
            && self.step_count >= self.config.start_steps
            && self.buffer.len() >= self.config.batch_size
    }

    fn update(&mut self) -> Result<()> {
        let batch = self.buffer.sample(self.config.batch_size)?;
        let alpha = self.log_alpha.exp()?.detach();

        // Critic update against the entropy-regularized bootstrap.
        let (next_actions, next_log_prob) = self.actor.sample_with_log_prob(&batch.next_states)?;
        let min_next_q = self
            .critic_target
            .forward_min(&batch.next_states, &next_actions.detach())?;
        let next_value = (min_next_q - next_log_prob.detach().broadcast_mul(&alpha)?)?;
        let not_done = batch.dones.affine(-1., 1.)?;
        let target =
            (&batch.rewards + not_done.mul(&next_value)?.affine(self.config.gamma, 0.)?)?.detach();
        let (q1, q2) = self.critic.forward(&batch.states, &batch.actions)?;
        let critic_loss =
            ((q1 - &target)?.sqr()?.mean_all()? + (q2 - &target)?.sqr()?.mean_all()?)?;
        self.critic_optimizer.backward_step(&critic_loss)?;

        // Actor update on reparameterized actions.
        let (actions, log_prob) = self.actor.sample_with_log_prob(&batch.states)?;
        let min_q = self.critic.forward_min(&batch.states, &actions)?;
        let actor_loss = (log_prob.broadcast_mul(&alpha)? - min_q)?.mean_all()?;
        self.actor_optimizer.backward_step(&actor_loss)?;

        // Temperature update toward the target entropy.
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

    fn save_params(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
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

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, Init, Module, ParamsAdamW, VarBuilder, VarMap};
use rand::Rng;
use rlx_core::buffers::ExperienceBuffer;
use rlx_core::buffers::replay_buffer::ReplayBuffer;
use rlx_core::distributions::{Categorical, Distribution};
use rlx_core::env::{Env, EnvironmentDescription};
use rlx_core::nets::{Mlp, build_mlp};
use rlx_core::observation::ObservationWindow;
use rlx_core::optim::{OptimizerWithMaxGrad, hard_update};
use rlx_core::rng;
use rlx_core::{Algorithm, StepOutcome};
use std::path::Path;

pub struct SacDiscreteConfig {
    pub buffer_size: usize,
    pub batch_size: usize,
    pub gamma: f64,
    pub lr_actor: f64,
    pub lr_critic: f64,
    pub lr_alpha: f64,
    pub layers: Vec<usize>,
    pub start_steps: usize,
    pub update_interval: usize,
    pub target_update_interval: usize,
    /// The target entropy is this fraction of the uniform-policy entropy `ln |A|`.
    pub target_entropy_ratio: f64,
    pub max_grad_norm: Option<f32>,
}

impl Default for SacDiscreteConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100_000,
            batch_size: 64,
            gamma: 0.99,
            lr_actor: 3e-4,
            lr_critic: 3e-4,
            lr_alpha: 3e-4,
            layers: vec![256, 256],
            start_steps: 1_000,
            update_interval: 4,
            target_update_interval: 400,
            target_entropy_ratio: 0.98,
            max_grad_norm: None,
        }
    }
}

/// Critic pair over all discrete actions at once: each head maps a state to `|A|` values.
struct DiscreteTwinCritic {
    q1: Mlp,
    q2: Mlp,
}

impl DiscreteTwinCritic {
    fn build(
        obs_size: usize,
        action_size: usize,
        layers: &[usize],
        vb: &VarBuilder,
    ) -> candle_core::Result<Self> {
        let mut layers = layers.to_vec();
        layers.push(action_size);
        Ok(Self {
            q1: build_mlp(obs_size, &layers, vb, "q1_")?,
            q2: build_mlp(obs_size, &layers, vb, "q2_")?,
        })
    }

    fn forward(&self, states: &Tensor) -> candle_core::Result<(Tensor, Tensor)> {
        Ok((self.q1.forward(states)?, self.q2.forward(states)?))
    }
}

/// Soft actor-critic over a discrete action space: categorical actor, twin discrete critics
/// and tuned entropy temperature. The expectation over actions is exact, no reparameterization
/// trick needed.
pub struct SacDiscrete {
    config: SacDiscreteConfig,
    env_description: EnvironmentDescription,
    actor: Categorical,
    actor_optimizer: OptimizerWithMaxGrad,
    critic: DiscreteTwinCritic,
    critic_optimizer: OptimizerWithMaxGrad,
    critic_target: DiscreteTwinCritic,
    critic_target_varmap: VarMap,
    log_alpha: Tensor,
    alpha_optimizer: OptimizerWithMaxGrad,
    target_entropy: f64,
    buffer: ReplayBuffer,
    step_count: usize,
    learning_steps: usize,
    device: Device,
}

impl SacDiscrete {
    pub fn new(
        config: SacDiscreteConfig,
        env_description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<Self> {
        let obs_size = env_description.observation_size();
        let action_size = env_description.action_size();

        let actor_varmap = VarMap::new();
        let actor_vb = VarBuilder::from_varmap(&actor_varmap, DType::F32, device);
        let actor = Categorical::build(obs_size, action_size, &config.layers, &actor_vb, "pi")?;
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
        let critic = DiscreteTwinCritic::build(obs_size, action_size, &config.layers, &critic_vb)?;
        let critic_target_varmap = VarMap::new();
        let target_vb = VarBuilder::from_varmap(&critic_target_varmap, DType::F32, device);
        let critic_target =
            DiscreteTwinCritic::build(obs_size, action_size, &config.layers, &target_vb)?;
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

        let target_entropy = config.target_entropy_ratio * (action_size as f64).ln();
        Ok(Self {
            buffer: ReplayBuffer::new(config.buffer_size),
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
            target_entropy,
            step_count: 0,
            learning_steps: 0,
            device: device.clone(),
        })
    }
}

impl Algorithm for SacDiscrete {
    fn name(&self) -> &'static str {
        "sac_discrete"
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

        // Critic update: the next-state value is an exact expectation over actions.
        let (next_probs, next_log_probs) = self.actor.probs_and_log_probs(&batch.next_states)?;
        let (q1_target, q2_target) = self.critic_target.forward(&batch.next_states)?;
        let min_q_target = q1_target.minimum(&q2_target)?;
        let entropy_term = next_log_probs.detach().broadcast_mul(&alpha)?;
        let next_value = next_probs
            .detach()
            .mul(&(min_q_target - entropy_term)?)?
            .sum_keepdim(1)?;
        let not_done = batch.dones.affine(-1., 1.)?;
        let target =
            (&batch.rewards + not_done.mul(&next_value)?.affine(self.config.gamma, 0.)?)?.detach();
        let (q1_all, q2_all) = self.critic.forward(&batch.states)?;
        let q1 = q1_all.gather(&batch.actions, 1)?;
        let q2 = q2_all.gather(&batch.actions, 1)?;
        let critic_loss =
            ((q1 - &target)?.sqr()?.mean_all()? + (q2 - &target)?.sqr()?.mean_all()?)?;
        self.critic_optimizer.backward_step(&critic_loss)?;

        // Actor update on the exact expected soft value.
        let (probs, log_probs) = self.actor.probs_and_log_probs(&batch.states)?;
        let (q1_all, q2_all) = self.critic.forward(&batch.states)?;
        let min_q = q1_all.minimum(&q2_all)?.detach();
        let actor_loss = probs
            .mul(&(log_probs.broadcast_mul(&alpha)? - min_q)?)?
            .sum(1)?
            .mean_all()?;
        self.actor_optimizer.backward_step(&actor_loss)?;

        // Temperature update: pull the policy entropy toward the target.
        let entropy = probs
            .detach()
            .mul(&log_probs.detach())?
            .sum(1)?
            .neg()?
            .mean_all()?;
        let alpha_loss = self
            .log_alpha
            .broadcast_mul(&entropy.affine(1., -self.target_entropy)?)?
            .mean_all()?;
        self.alpha_optimizer.backward_step(&alpha_loss)?;

        self.learning_steps += 1;
        if self.learning_steps % self.config.target_update_interval == 0 {
            hard_update(&self.critic_target_varmap, &self.critic_optimizer.varmap)?;
        }
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

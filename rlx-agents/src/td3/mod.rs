use crate::twin_critic::TwinCritic;
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, Module, ParamsAdamW, VarBuilder, VarMap};
use rand::Rng;
use rlx_core::buffers::ExperienceBuffer;
use rlx_core::buffers::replay_buffer::ReplayBuffer;
use rlx_core::env::{Env, EnvironmentDescription};
use rlx_core::nets::{Mlp, build_mlp};
use rlx_core::observation::ObservationWindow;
use rlx_core::optim::{OptimizerWithMaxGrad, hard_update, soft_update};
use rlx_core::rng;
use rlx_core::{Algorithm, StepOutcome};
use std::path::Path;

pub struct Td3Config {
    pub buffer_size: usize,
    pub batch_size: usize,
    pub gamma: f64,
    pub lr: f64,
    pub layers: Vec<usize>,
    pub start_steps: usize,
    pub update_interval: usize,
    pub tau: f64,
    /// Std of the Gaussian exploration noise added to deterministic actions.
    pub explore_noise: f64,
    /// Std of the target-policy smoothing noise.
    pub policy_noise: f64,
    pub noise_clip: f64,
    /// Actor and target sync only every this many critic updates.
    pub policy_delay: usize,
    pub max_grad_norm: Option<f32>,
}

impl Default for Td3Config {
    fn default() -> Self {
        Self {
            buffer_size: 100_000,
            batch_size: 64,
            gamma: 0.99,
            lr: 3e-4,
            layers: vec![256, 256],
            start_steps: 10_000,
            update_interval: 1,
            tau: 5e-3,
            explore_noise: 0.1,
            policy_noise: 0.2,
            noise_clip: 0.5,
            policy_delay: 2,
            max_grad_norm: None,
        }
    }
}

/// Twin-delayed DDPG: deterministic tanh actor, clipped double-Q critics, target-policy
/// smoothing and delayed actor updates.
pub struct Td3 {
    config: Td3Config,
    env_description: EnvironmentDescription,
    actor: Mlp,
    actor_optimizer: OptimizerWithMaxGrad,
    actor_target: Mlp,
    actor_target_varmap: VarMap,
    critic: TwinCritic,
    critic_optimizer: OptimizerWithMaxGrad,
    critic_target: TwinCritic,
    critic_target_varmap: VarMap,
    buffer: ReplayBuffer,
    step_count: usize,
    learning_steps: usize,
    device: Device,
}

impl Td3 {
    pub fn new(
        config: Td3Config,
        env_description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<Self> {
        let obs_size = env_description.observation_size();
        let action_size = env_description.action_size();
        let mut actor_layers = config.layers.clone();
        actor_layers.push(action_size);

        let actor_varmap = VarMap::new();
        let actor_vb = VarBuilder::from_varmap(&actor_varmap, DType::F32, device);
        let actor = build_mlp(obs_size, &actor_layers, &actor_vb, "pi")?;
        let actor_target_varmap = VarMap::new();
        let actor_target_vb = VarBuilder::from_varmap(&actor_target_varmap, DType::F32, device);
        let actor_target = build_mlp(obs_size, &actor_layers, &actor_target_vb, "pi")?;
        hard_update(&actor_target_varmap, &actor_varmap)?;
        let actor_optimizer = OptimizerWithMaxGrad::new(
            AdamW::new(
                actor_varmap.all_vars(),
                ParamsAdamW {
                    lr: config.lr,
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
        let critic_target_vb = VarBuilder::from_varmap(&critic_target_varmap, DType::F32, device);
        let critic_target =
            TwinCritic::build(obs_size + action_size, &config.layers, &critic_target_vb)?;
        hard_update(&critic_target_varmap, &critic_varmap)?;
        let critic_optimizer = OptimizerWithMaxGrad::new(
            AdamW::new(
                critic_varmap.all_vars(),
                ParamsAdamW {
                    lr: config.lr,
                    ..Default::default()
                },
            )?,
            config.max_grad_norm,
            critic_varmap,
        );

        Ok(Self {
            env_description: env_description.clone(),
            buffer: ReplayBuffer::new(config.buffer_size),
            config,
            actor,
            actor_optimizer,
            actor_target,
            actor_target_varmap,
            critic,
            critic_optimizer,
            critic_target,
            critic_target_varmap,
            step_count: 0,
            learning_steps: 0,
            device: device.clone(),
        })
    }

    fn deterministic_action(&self, state: &Tensor) -> Result<Tensor> {
        let action = self.actor.forward(&state.unsqueeze(0)?)?.tanh()?;
        Ok(action.squeeze(0)?.detach())
    }
}

impl Algorithm for Td3 {
    fn name(&self) -> &'static str {
        "td3"
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
        self.deterministic_action(window.state())
    }

    fn explore(&self, window: &ObservationWindow) -> Result<Tensor> {
        let action = self.deterministic_action(window.state())?;
        let noise = action.randn_like(0., self.config.explore_noise)?;
        Ok((action + noise)?.clamp(-1., 1.)?)
    }

    fn is_update(&self) -> bool {
        self.step_count % self.config.update_interval == 0
            && self.step_count >= self.config.start_steps
            && self.buffer.len() >= self.config.batch_size
    }

    fn update(&mut self) -> Result<()> {
        let batch = self.buffer.sample(self.config.batch_size)?;

        // Smoothed target actions keep the bootstrap from exploiting critic error spikes.
        let noise = batch
            .actions
            .randn_like(0., self.config.policy_noise)?
            .clamp(-self.config.noise_clip, self.config.noise_clip)?;
        let next_actions = (self.actor_target.forward(&batch.next_states)?.tanh()? + noise)?
            .clamp(-1., 1.)?;
        let min_next_q = self
            .critic_target
            .forward_min(&batch.next_states, &next_actions)?;
        let not_done = batch.dones.affine(-1., 1.)?;
        let target =
            (&batch.rewards + not_done.mul(&min_next_q)?.affine(self.config.gamma, 0.)?)?.detach();
        let (q1, q2) = self.critic.forward(&batch.states, &batch.actions)?;
        let critic_loss =
            ((q1 - &target)?.sqr()?.mean_all()? + (q2 - &target)?.sqr()?.mean_all()?)?;
        self.critic_optimizer.backward_step(&critic_loss)?;

        self.learning_steps += 1;
        if self.learning_steps % self.config.policy_delay == 0 {
            let actions = self.actor.forward(&batch.states)?.tanh()?;
            let (q1, _) = self.critic.forward(&batch.states, &actions)?;
            let actor_loss = q1.mean_all()?.neg()?;
            self.actor_optimizer.backward_step(&actor_loss)?;
            soft_update(
                &self.actor_target_varmap,
                &self.actor_optimizer.varmap,
                self.config.tau,
            )?;
            soft_update(
                &self.critic_target_varmap,
                &self.critic_optimizer.varmap,
                self.config.tau,
            )?;
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
        Ok(())
    }
}

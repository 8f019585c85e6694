use anyhow::Result;
use candle_core::{D, Device, Tensor};
use candle_nn::{AdamW, Optimizer, Module, ParamsAdamW, VarBuilder, VarMap};
use rand::Rng;
use rlx_core::buffers::prioritized::PrioritizedReplayBuffer;
use rlx_core::buffers::replay_buffer::ReplayBuffer;
use rlx_core::buffers::{ExperienceBuffer, ReplayBufferKind};
use rlx_core::env::{Env, EnvironmentDescription};
use rlx_core::nets::{Mlp, build_mlp};
use rlx_core::observation::ObservationWindow;
use rlx_core::optim::{OptimizerWithMaxGrad, hard_update, huber};
use rlx_core::rng;
use rlx_core::{Algorithm, StepOutcome};
use std::path::Path;

pub struct DqnConfig {
    pub buffer_size: usize,
    pub batch_size: usize,
    pub gamma: f64,
    pub lr: f64,
    pub layers: Vec<usize>,
    /// Ticks driven by uniform random actions before the policy takes over.
    pub start_steps: usize,
    pub update_interval: usize,
    /// Hard target sync cadence, counted in learning steps.
    pub target_update_interval: usize,
    pub eps_init: f64,
    pub eps_final: f64,
    pub eps_decay_steps: usize,
    pub double_q: bool,
    pub use_per: bool,
    pub per_alpha: f64,
    pub per_beta: f64,
    pub per_beta_steps: usize,
    pub max_grad_norm: Option<f32>,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100_000,
            batch_size: 64,
            gamma: 0.99,
            lr: 3e-4,
            layers: vec![256, 256],
            start_steps: 1_000,
            update_interval: 4,
            target_update_interval: 400,
            eps_init: 1.,
            eps_final: 0.01,
            eps_decay_steps: 25_000,
            double_q: false,
            use_per: false,
            per_alpha: 0.6,
            per_beta: 0.4,
            per_beta_steps: 100_000,
            max_grad_norm: Some(10.),
        }
    }
}

/// Deep Q-learning over a discrete action space, with optional double-Q targets and optional
/// prioritized replay.
pub struct Dqn {
    config: DqnConfig,
    env_description: EnvironmentDescription,
    online: Mlp,
    target: Mlp,
    target_varmap: VarMap,
    optimizer: OptimizerWithMaxGrad,
    buffer: ReplayBufferKind,
    step_count: usize,
    learning_steps: usize,
    device: Device,
}

impl Dqn {
    pub fn new(
        config: DqnConfig,
        env_description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<Self> {
        let obs_size = env_description.observation_size();
        let action_size = env_description.action_size();
        let mut layers = config.layers.clone();
        layers.push(action_size);

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, candle_core::DType::F32, device);
        let online = build_mlp(obs_size, &layers, &vb, "q")?;
        let target_varmap = VarMap::new();
        let target_vb = VarBuilder::from_varmap(&target_varmap, candle_core::DType::F32, device);
        let target = build_mlp(obs_size, &layers, &target_vb, "q")?;
        hard_update(&target_varmap, &varmap)?;

        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: config.lr,
                ..Default::default()
            },
        )?;
        let optimizer = OptimizerWithMaxGrad::new(optimizer, config.max_grad_norm, varmap);

        let buffer = if config.use_per {
            ReplayBufferKind::Prioritized(PrioritizedReplayBuffer::new(
                config.buffer_size,
                config.per_alpha,
                config.per_beta,
                config.per_beta_steps,
            ))
        } else {
            ReplayBufferKind::Uniform(ReplayBuffer::new(config.buffer_size))
        };

        Ok(Self {
            config,
            env_description: env_description.clone(),
            online,
            target,
            target_varmap,
            optimizer,
            buffer,
            step_count: 0,
            learning_steps: 0,
            device: device.clone(),
        })
    }

    pub fn buffer(&self) -> &ReplayBufferKind {
        &self.buffer
    }

    fn epsilon(&self) -> f64 {
        let elapsed = self.step_count.saturating_sub(self.config.start_steps) as f64;
        let frac = (elapsed / self.config.eps_decay_steps as f64).min(1.);
        self.config.eps_init + frac * (self.config.eps_final - self.config.eps_init)
    }

    fn greedy(&self, state: &Tensor) -> Result<Tensor> {
        let q_values = self.online.forward(&state.unsqueeze(0)?)?;
        Ok(q_values.argmax(D::Minus1)?)
    }
}

impl Algorithm for Dqn {
    fn name(&self) -> &'static str {
        if self.config.double_q { "double_dqn" } else { "dqn" }
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
        // Time-limit cuts are not terminal states, so they must not zero the bootstrap.
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
        Ok(self.greedy(window.state())?)
    }

    fn explore(&self, window: &ObservationWindow) -> Result<Tensor> {
        if rng::with_rng(|rng| rng.random::<f64>()) < self.epsilon() {
            self.env_description.action_space.sample(&self.device)
        } else {
            self.select_action(window)
        }
    }

    fn is_update(&self) -> bool {
        self.step_count % self.config.update_interval == 0
            && self.step_count >= self.config.start_steps
            && self.buffer.len() >= self.config.batch_size
    }

    fn update(&mut self) -> Result<()> {
        let batch = self.buffer.sample(self.config.batch_size)?;
        let q_values = self.online.forward(&batch.states)?.gather(&batch.actions, 1)?;
        let next_q = if self.config.double_q {
            let next_actions = self
                .online
                .forward(&batch.next_states)?
                .argmax_keepdim(D::Minus1)?;
            self.target
                .forward(&batch.next_states)?
                .gather(&next_actions, 1)?
        } else {
            self.target
                .forward(&batch.next_states)?
                .max_keepdim(D::Minus1)?
        };
        let not_done = batch.dones.affine(-1., 1.)?;
        let target = (&batch.rewards + not_done.mul(&next_q)?.affine(self.config.gamma, 0.)?)?
            .detach();
        let td = (q_values - target)?;
        let loss_elems = huber(&td)?;
        let loss = match &batch.weights {
            Some(weights) => loss_elems.mul(weights)?.mean_all()?,
            None => loss_elems.mean_all()?,
        };
        self.optimizer.backward_step(&loss)?;

        if let Some(indexes) = &batch.indexes {
            let td_abs: Vec<f32> = td.detach().abs()?.flatten_all()?.to_vec1()?;
            self.buffer.update_priorities(indexes, &td_abs);
        }

        self.learning_steps += 1;
        if self.learning_steps % self.config.target_update_interval == 0 {
            hard_update(&self.target_varmap, &self.optimizer.varmap)?;
        }
        Ok(())
    }

    fn save_params(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.optimizer.varmap.save(dir.join("q_net.safetensors"))?;
        Ok(())
    }
}

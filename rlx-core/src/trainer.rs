use crate::env::Env;
use crate::rng;
use crate::{Algorithm, StepOutcome};
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

macro_rules! break_on_hook_res {
    ($hook_res:expr) => {
        if $hook_res {
            break;
        }
    };
}

/// Observation points on the training loop. Returning `true` from a non-shutdown hook stops
/// training early.
pub trait TrainerHooks {
    fn init_hook(&mut self) -> bool;

    fn post_step_hook(&mut self, step: usize, outcome: &StepOutcome) -> bool;

    fn post_eval_hook(&mut self, step: usize, mean_return: f32) -> bool;

    fn shutdown_hook(&mut self) -> Result<()>;
}

#[derive(Default)]
pub struct DefaultTrainerHooks {
    episode_idx: usize,
    episode_return: f32,
    best_return: Option<f32>,
}

impl TrainerHooks for DefaultTrainerHooks {
    fn init_hook(&mut self) -> bool {
        false
    }

    fn post_step_hook(&mut self, step: usize, outcome: &StepOutcome) -> bool {
        self.episode_return += outcome.reward;
        if outcome.episode_done {
            println!(
                "episode: {:<5} steps: {:<9} return: {:<8.2}",
                self.episode_idx, step, self.episode_return
            );
            self.episode_idx += 1;
            self.episode_return = 0.;
        }
        false
    }

    fn post_eval_hook(&mut self, step: usize, mean_return: f32) -> bool {
        let best = self.best_return.get_or_insert(mean_return);
        if mean_return >= *best {
            *best = mean_return;
        }
        println!(
            "eval at step {:<9} mean return: {:<8.2} best: {:.2}",
            step, mean_return, best
        );
        false
    }

    fn shutdown_hook(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct TrainerConfig {
    pub num_steps: usize,
    pub eval_interval: usize,
    pub num_eval_episodes: usize,
    pub log_dir: PathBuf,
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            num_steps: 100_000,
            eval_interval: 10_000,
            num_eval_episodes: 5,
            log_dir: PathBuf::from("logs/run"),
            seed: 0,
        }
    }
}

// Eval envs get their own seed block so evaluation episodes never replay training seeds.
const EVAL_SEED_OFFSET: u64 = 1 << 31;

/// Drives the fixed-cadence control loop: step the algorithm against the training env, gate
/// updates on its cadence check, and periodically run deterministic evaluation episodes
/// against a separate env instance, persisting results and parameters as it goes.
pub struct Trainer<A: Algorithm, E: Env, H: TrainerHooks = DefaultTrainerHooks> {
    pub env: E,
    pub env_eval: E,
    pub algo: A,
    pub hooks: H,
    pub config: TrainerConfig,
    eval_results: Vec<(usize, f32)>,
}

impl<A: Algorithm, E: Env> Trainer<A, E, DefaultTrainerHooks> {
    pub fn new(env: E, env_eval: E, algo: A, config: TrainerConfig) -> Self {
        Self::with_hooks(env, env_eval, algo, DefaultTrainerHooks::default(), config)
    }
}

impl<A: Algorithm, E: Env, H: TrainerHooks> Trainer<A, E, H> {
    pub fn with_hooks(env: E, env_eval: E, algo: A, hooks: H, config: TrainerConfig) -> Self {
        Self {
            env,
            env_eval,
            algo,
            hooks,
            config,
            eval_results: vec![],
        }
    }

    pub fn eval_results(&self) -> &[(usize, f32)] {
        &self.eval_results
    }

    pub fn train(&mut self) -> Result<()> {
        rng::set_seed(self.config.seed);
        fs::create_dir_all(self.config.log_dir.join("params"))
            .with_context(|| format!("creating log dir {:?}", self.config.log_dir))?;
        if self.hooks.init_hook() {
            return Ok(());
        }
        let mut window = self.algo.observation_window();
        let state = self.env.reset(self.config.seed)?;
        window.reset_episode(state);
        for step in 1..=self.config.num_steps {
            let outcome = self.algo.step(&mut self.env, &mut window)?;
            if self.algo.is_update() {
                self.algo.update()?;
            }
            break_on_hook_res!(self.hooks.post_step_hook(step, &outcome));
            if step % self.config.eval_interval == 0 {
                let mean_return = self.evaluate()?;
                self.eval_results.push((step, mean_return));
                self.write_summary()?;
                let params_dir = self
                    .config
                    .log_dir
                    .join("params")
                    .join(format!("step{step}"));
                self.algo.save_params(&params_dir)?;
                break_on_hook_res!(self.hooks.post_eval_hook(step, mean_return));
            }
        }
        self.hooks.shutdown_hook()
    }

    /// Runs the policy deterministically against the eval env; training state is untouched.
    fn evaluate(&mut self) -> Result<f32> {
        let mut window = self.algo.observation_window();
        let mut total_return = 0.;
        for episode in 0..self.config.num_eval_episodes {
            let seed = self.config.seed + EVAL_SEED_OFFSET + episode as u64;
            let state = self.env_eval.reset(seed)?;
            window.reset_episode(state);
            loop {
                let action = self.algo.select_action(&window)?;
                let snap_shot = self.env_eval.step(&action)?;
                total_return += snap_shot.reward;
                if snap_shot.episode_over() {
                    break;
                }
                window.append(action, snap_shot.state);
            }
        }
        Ok(total_return / self.config.num_eval_episodes as f32)
    }

    fn write_summary(&self) -> Result<()> {
        let mut rows = String::from("step,mean_return\n");
        for (step, mean_return) in &self.eval_results {
            rows.push_str(&format!("{step},{mean_return}\n"));
        }
        let path = self.config.log_dir.join("summary.csv");
        fs::write(&path, rows).with_context(|| format!("writing {path:?}"))?;
        Ok(())
    }
}

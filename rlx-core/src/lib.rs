pub mod buffers;
pub mod distributions;
pub mod env;
pub mod nets;
pub mod observation;
pub mod optim;
pub mod rng;
pub mod trainer;

use crate::env::Env;
use crate::observation::ObservationWindow;
use anyhow::Result;
use candle_core::Tensor;
use std::path::Path;

/// A learning algorithm driven by the [`trainer::Trainer`]. Implementors own their network
/// parameters, their experience buffer and a step counter; the trainer owns the control loop.
pub trait Algorithm {
    /// Short identifier, also used as the registry key and in log directory names.
    fn name(&self) -> &'static str;

    /// Builds an observation window shaped for this algorithm. Flat algorithms look at a single
    /// observation, latent ones at a fixed window of recent observations and actions.
    fn observation_window(&self) -> ObservationWindow;

    /// Advances the environment by one tick: pick an exploratory action, step the env, store the
    /// transition, reset env and window at episode boundaries.
    fn step(&mut self, env: &mut dyn Env, window: &mut ObservationWindow) -> Result<StepOutcome>;

    /// Deterministic action for evaluation. Must lie within the env's action space.
    fn select_action(&self, window: &ObservationWindow) -> Result<Tensor>;

    /// Stochastic action used while training.
    fn explore(&self, window: &ObservationWindow) -> Result<Tensor>;

    /// Cadence gate: have enough steps elapsed for a parameter update? No side effects.
    fn is_update(&self) -> bool;

    /// One gradient update from a buffer sample.
    fn update(&mut self) -> Result<()>;

    /// Persists network parameters under `dir` as safetensors files.
    fn save_params(&self, dir: &Path) -> Result<()>;
}

/// What a single environment tick produced, for progress accounting in the trainer.
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    pub reward: f32,
    /// True when the episode ended this tick, whether terminated or truncated.
    pub episode_done: bool,
}

use anyhow::Result;
use candle_core::{Device, Tensor};
use rlx_core::env::{Env, EnvironmentDescription, SnapShot, Space};

const LINE_WALK_OBS: usize = 3;
const LINE_WALK_MAX_STEPS: usize = 200;

/// A one-dimensional control problem: the agent nudges a point along a line and is rewarded
/// for staying near the origin. Deterministic, so tests can rely on exact rollouts.
pub struct LineWalkEnv {
    x: f32,
    steps: usize,
    device: Device,
}

impl LineWalkEnv {
    pub fn new(device: &Device) -> Self {
        Self {
            x: 0.,
            steps: 0,
            device: device.clone(),
        }
    }

    fn observe(&self) -> Result<Tensor> {
        let obs = vec![self.x, self.x.abs(), self.steps as f32 / LINE_WALK_MAX_STEPS as f32];
        Ok(Tensor::from_vec(obs, LINE_WALK_OBS, &self.device)?)
    }
}

impl Env for LineWalkEnv {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        // A crude hash keeps distinct seeds at distinct starting points.
        self.x = ((seed % 41) as f32 - 20.) / 20.;
        self.steps = 0;
        self.observe()
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let a = action.flatten_all()?.to_vec1::<f32>()?[0].clamp(-1., 1.);
        self.x += 0.1 * a;
        self.steps += 1;
        Ok(SnapShot {
            state: self.observe()?,
            reward: -self.x.abs(),
            terminated: self.x.abs() > 10.,
            truncated: self.steps >= LINE_WALK_MAX_STEPS,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(
            Space::continuous_from_dims(vec![LINE_WALK_OBS]),
            Space::Continuous {
                low: Some(vec![-1.]),
                high: Some(vec![1.]),
                size: 1,
            },
        )
    }
}

const GRID_CELLS: usize = 5;
const GRID_MAX_STEPS: usize = 50;

/// A one-hot corridor of five cells with left/right actions. Reaching the right end pays 1
/// and terminates; everything else pays nothing. The optimal return is easy to compute, which
/// makes it a good smoke test for value-based agents.
pub struct GridEnv {
    position: usize,
    steps: usize,
    device: Device,
}

impl GridEnv {
    pub fn new(device: &Device) -> Self {
        Self {
            position: 0,
            steps: 0,
            device: device.clone(),
        }
    }

    fn observe(&self) -> Result<Tensor> {
        let mut obs = vec![0f32; GRID_CELLS];
        obs[self.position] = 1.;
        Ok(Tensor::from_vec(obs, GRID_CELLS, &self.device)?)
    }
}

impl Env for GridEnv {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        self.position = (seed as usize) % (GRID_CELLS - 1);
        self.steps = 0;
        self.observe()
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let index = action.flatten_all()?.to_vec1::<u32>()?[0];
        if index == 0 {
            self.position = self.position.saturating_sub(1);
        } else {
            self.position = (self.position + 1).min(GRID_CELLS - 1);
        }
        self.steps += 1;
        let terminated = self.position == GRID_CELLS - 1;
        Ok(SnapShot {
            state: self.observe()?,
            reward: if terminated { 1. } else { 0. },
            terminated,
            truncated: self.steps >= GRID_MAX_STEPS,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(
            Space::continuous_from_dims(vec![GRID_CELLS]),
            Space::Discrete(2),
        )
    }
}

use anyhow::Result;
use candle_core::{Device, Tensor};
use pyo3::{
    PyObject, PyResult, Python,
    types::{PyAnyMethods, PyDict},
};
use rlx_core::env::{Env, EnvironmentDescription, SnapShot, Space};

/// A gymnasium environment behind the `Env` trait. Observations come back as rank-1 f32
/// tensors on the given device; continuous actions are clipped to the declared box before
/// being handed to python.
pub struct GymEnv {
    env: PyObject,
    action_space: Space,
    observation_space: Space,
    device: Device,
}

impl GymEnv {
    pub fn new(name: &str, render_mode: Option<String>, device: &Device) -> Result<GymEnv> {
        let env = Python::with_gil(|py| {
            let gym = py.import("gymnasium")?;
            let kwargs = PyDict::new(py);
            if let Some(render_mode) = render_mode {
                kwargs.set_item("render_mode", render_mode)?;
            }
            let make = gym.getattr("make")?;
            let env = make.call((name,), Some(&kwargs))?;
            let gym_spaces = py.import("gymnasium.spaces")?;
            let action_space = env.getattr("action_space")?;
            let action_space = if action_space.is_instance(&gym_spaces.getattr("Discrete")?)? {
                Space::Discrete(action_space.getattr("n")?.extract()?)
            } else if action_space.is_instance(&gym_spaces.getattr("Box")?)? {
                let low: Vec<f32> = action_space.getattr("low")?.extract()?;
                let high: Vec<f32> = action_space.getattr("high")?.extract()?;
                let size = low.len();
                Space::Continuous {
                    low: Some(low),
                    high: Some(high),
                    size,
                }
            } else {
                todo!("other action spaces are not yet supported");
            };
            let observation_shape: Vec<usize> =
                env.getattr("observation_space")?.getattr("shape")?.extract()?;
            let observation_space = Space::continuous_from_dims(observation_shape);
            PyResult::Ok(GymEnv {
                env: env.into(),
                action_space,
                observation_space,
                device: device.clone(),
            })
        })?;
        Ok(env)
    }

    pub fn observation_size(&self) -> usize {
        self.observation_space.size()
    }

    pub fn action_size(&self) -> usize {
        self.action_space.size()
    }
}

impl Env for GymEnv {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        let state: Vec<f32> = Python::with_gil(|py| {
            let kwargs = PyDict::new(py);
            kwargs.set_item("seed", seed)?;
            let state = self.env.call_method(py, "reset", (), Some(&kwargs))?;
            PyResult::Ok(state.bind(py).get_item(0)?.extract()?)
        })?;
        let size = state.len();
        Ok(Tensor::from_vec(state, size, &self.device)?)
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let (state, reward, terminated, truncated) = Python::with_gil(|py| {
            let step = match &self.action_space {
                Space::Discrete(_) => {
                    let index = action.flatten_all()?.to_vec1::<u32>()?[0] as usize;
                    self.env.call_method(py, "step", (index,), None)?
                }
                Space::Continuous { low, high, .. } => {
                    let mut values: Vec<f32> = action.flatten_all()?.to_vec1::<f32>()?;
                    if let (Some(low), Some(high)) = (low, high) {
                        for (i, value) in values.iter_mut().enumerate() {
                            *value = value.clamp(low[i], high[i]);
                        }
                    }
                    self.env.call_method(py, "step", (values,), None)?
                }
            };
            let step = step.bind(py);
            let state: Vec<f32> = step.get_item(0)?.extract()?;
            let reward: f32 = step.get_item(1)?.extract()?;
            let terminated: bool = step.get_item(2)?.extract()?;
            let truncated: bool = step.get_item(3)?.extract()?;
            anyhow::Ok((state, reward, terminated, truncated))
        })?;
        let size = state.len();
        Ok(SnapShot {
            state: Tensor::from_vec(state, size, &self.device)?,
            reward,
            terminated,
            truncated,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription {
            observation_space: self.observation_space.clone(),
            action_space: self.action_space.clone(),
        }
    }
}

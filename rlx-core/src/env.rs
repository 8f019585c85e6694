use crate::rng;
use anyhow::Result;
use candle_core::{Device, Tensor};
use rand::Rng;

#[derive(Debug, Clone)]
pub enum Space {
    Discrete(usize),
    Continuous {
        low: Option<Vec<f32>>,
        high: Option<Vec<f32>>,
        size: usize,
    },
}

impl Space {
    pub fn continuous_from_dims(dims: Vec<usize>) -> Self {
        Self::Continuous {
            low: None,
            high: None,
            size: dims.iter().product(),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Discrete(size) => *size,
            Self::Continuous { size, .. } => *size,
        }
    }

    /// Membership predicate. Discrete actions are a single index tensor, continuous actions a
    /// rank-1 f32 vector within the declared bounds.
    pub fn contains(&self, action: &Tensor) -> bool {
        match self {
            Self::Discrete(size) => match action.flatten_all().and_then(|a| a.to_vec1::<u32>()) {
                Ok(idx) => idx.len() == 1 && (idx[0] as usize) < *size,
                Err(_) => false,
            },
            Self::Continuous { low, high, size } => {
                let Ok(values) = action.flatten_all().and_then(|a| a.to_vec1::<f32>()) else {
                    return false;
                };
                if values.len() != *size {
                    return false;
                }
                let above = low
                    .as_ref()
                    .is_none_or(|lo| values.iter().zip(lo).all(|(v, l)| v >= l));
                let below = high
                    .as_ref()
                    .is_none_or(|hi| values.iter().zip(hi).all(|(v, h)| v <= h));
                above && below
            }
        }
    }

    /// Draws a uniform random action, used for warm-up steps before the policy takes over.
    pub fn sample(&self, device: &Device) -> Result<Tensor> {
        match self {
            Self::Discrete(size) => {
                let idx = rng::with_rng(|rng| rng.random_range(0..*size)) as u32;
                Ok(Tensor::new(&[idx], device)?)
            }
            Self::Continuous { low, high, size } => {
                let values: Vec<f32> = (0..*size)
                    .map(|i| {
                        // Gym boxes can be unbounded; fall back to the unit interval there,
                        // same as for missing bounds.
                        let lo = low.as_ref().map_or(-1., |l| l[i]);
                        let lo = if lo.is_finite() { lo } else { -1. };
                        let hi = high.as_ref().map_or(1., |h| h[i]);
                        let hi = if hi.is_finite() { hi } else { 1. };
                        rng::with_rng(|rng| rng.random_range(lo..=hi))
                    })
                    .collect();
                Ok(Tensor::from_vec(values, *size, device)?)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentDescription {
    pub observation_space: Space,
    pub action_space: Space,
}

impl EnvironmentDescription {
    pub fn new(observation_space: Space, action_space: Space) -> Self {
        Self {
            observation_space,
            action_space,
        }
    }

    pub fn action_size(&self) -> usize {
        self.action_space.size()
    }

    pub fn observation_size(&self) -> usize {
        self.observation_space.size()
    }
}

/// What one environment tick returns. `terminated` is an environment-defined terminal state,
/// `truncated` a time-limit cut; the distinction matters for bootstrapping.
pub struct SnapShot {
    pub state: Tensor,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
}

impl SnapShot {
    pub fn episode_over(&self) -> bool {
        self.terminated || self.truncated
    }
}

pub trait Env {
    fn reset(&mut self, seed: u64) -> Result<Tensor>;
    fn step(&mut self, action: &Tensor) -> Result<SnapShot>;
    fn env_description(&self) -> EnvironmentDescription;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuous_sample_stays_within_bounds() -> Result<()> {
        let device = Device::Cpu;
        let space = Space::Continuous {
            low: Some(vec![-2., 0.]),
            high: Some(vec![2., 0.5]),
            size: 2,
        };
        for _ in 0..32 {
            let action = space.sample(&device)?;
            assert!(space.contains(&action));
        }
        Ok(())
    }

    #[test]
    fn continuous_sample_tolerates_unbounded_boxes() -> Result<()> {
        let device = Device::Cpu;
        let space = Space::Continuous {
            low: Some(vec![f32::NEG_INFINITY, -1.]),
            high: Some(vec![f32::INFINITY, 1.]),
            size: 2,
        };
        for _ in 0..32 {
            let values = space.sample(&device)?.to_vec1::<f32>()?;
            assert!(values.iter().all(|v| v.is_finite()));
            assert!((-1. ..=1.).contains(&values[0]));
        }
        Ok(())
    }
}

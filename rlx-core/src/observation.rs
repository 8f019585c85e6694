use anyhow::Result;
use candle_core::{Device, Tensor};
use std::collections::VecDeque;

/// Per-episode accumulator of the most recent observations and actions. Owned by the rollout
/// loop and reset at episode boundaries; algorithms only read from it. Flat algorithms use a
/// window of one, latent-sequence algorithms a longer one where the action history matters.
#[derive(Debug, Clone)]
pub struct ObservationWindow {
    states: VecDeque<Tensor>,
    actions: VecDeque<Tensor>,
    num_sequences: usize,
    action_size: usize,
    device: Device,
}

impl ObservationWindow {
    pub fn new(num_sequences: usize, action_size: usize, device: Device) -> Self {
        assert!(num_sequences >= 1, "window needs at least one observation");
        Self {
            states: VecDeque::with_capacity(num_sequences),
            actions: VecDeque::with_capacity(num_sequences.saturating_sub(1)),
            num_sequences,
            action_size,
            device,
        }
    }

    /// Fills the window with the initial observation repeated and zero actions, the same way a
    /// frame stack is primed on reset.
    pub fn reset_episode(&mut self, state: Tensor) {
        self.states.clear();
        self.actions.clear();
        for _ in 0..self.num_sequences {
            self.states.push_back(state.clone());
        }
        if self.num_sequences > 1 {
            let zero = Tensor::zeros(self.action_size, candle_core::DType::F32, &self.device)
                .expect("zero action allocation");
            for _ in 0..self.num_sequences - 1 {
                self.actions.push_back(zero.clone());
            }
        }
    }

    pub fn append(&mut self, action: Tensor, state: Tensor) {
        self.states.pop_front();
        self.states.push_back(state);
        if self.num_sequences > 1 {
            self.actions.pop_front();
            self.actions.push_back(action);
        }
    }

    /// The most recent observation.
    pub fn state(&self) -> &Tensor {
        self.states.back().expect("window used before reset_episode")
    }

    pub fn num_sequences(&self) -> usize {
        self.num_sequences
    }

    /// Recent observations stacked to `(num_sequences, obs_dim)`, oldest first.
    pub fn stacked_states(&self) -> Result<Tensor> {
        let states: Vec<Tensor> = self.states.iter().cloned().collect();
        Ok(Tensor::stack(&states, 0)?)
    }

    /// Recent actions stacked to `(num_sequences - 1, action_size)`, oldest first.
    pub fn stacked_actions(&self) -> Result<Tensor> {
        let actions: Vec<Tensor> = self.actions.iter().cloned().collect();
        Ok(Tensor::stack(&actions, 0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_primes_on_reset_and_slides() -> Result<()> {
        let device = Device::Cpu;
        let mut window = ObservationWindow::new(3, 2, device.clone());
        let s0 = Tensor::from_vec(vec![0f32, 0.], 2, &device)?;
        window.reset_episode(s0);
        assert_eq!(window.stacked_states()?.dims(), &[3, 2]);
        assert_eq!(window.stacked_actions()?.dims(), &[2, 2]);

        let a = Tensor::from_vec(vec![1f32, 1.], 2, &device)?;
        let s1 = Tensor::from_vec(vec![5f32, 5.], 2, &device)?;
        window.append(a, s1);
        assert_eq!(window.state().to_vec1::<f32>()?, vec![5., 5.]);
        assert_eq!(window.stacked_states()?.dims(), &[3, 2]);
        Ok(())
    }
}

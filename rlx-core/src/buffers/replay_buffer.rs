use crate::buffers::ExperienceBuffer;
use crate::rng;
use candle_core::{Result, Tensor};
use rand::Rng;

/// A stacked uniform sample. Discrete actions come out as `(B, 1)` index tensors, continuous
/// ones as `(B, act_dim)`; rewards and done masks are `(B, 1)` f32.
pub struct Batch {
    pub states: Tensor,
    pub actions: Tensor,
    pub rewards: Tensor,
    pub dones: Tensor,
    pub next_states: Tensor,
    /// Importance weights, `(B, 1)`; only set by the prioritized buffer.
    pub weights: Option<Tensor>,
    /// Storage slots of the sampled transitions; only set by the prioritized buffer.
    pub indexes: Option<Vec<usize>>,
}

/// Fixed-capacity circular transition store with uniform sampling.
pub struct ReplayBuffer {
    capacity: usize,
    next: usize,
    size: usize,
    states: Vec<Tensor>,
    actions: Vec<Tensor>,
    rewards: Vec<f32>,
    dones: Vec<bool>,
    next_states: Vec<Tensor>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay buffer needs a positive capacity");
        Self {
            capacity,
            next: 0,
            size: 0,
            states: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
            next_states: Vec::with_capacity(capacity),
        }
    }

    /// Inserts one transition and returns the slot it landed in.
    pub(crate) fn push_slot(
        &mut self,
        state: Tensor,
        action: Tensor,
        reward: f32,
        done: bool,
        next_state: Tensor,
    ) -> usize {
        let slot = self.next;
        if self.size < self.capacity {
            self.states.push(state);
            self.actions.push(action);
            self.rewards.push(reward);
            self.dones.push(done);
            self.next_states.push(next_state);
            self.size += 1;
        } else {
            self.states[slot] = state;
            self.actions[slot] = action;
            self.rewards[slot] = reward;
            self.dones[slot] = done;
            self.next_states[slot] = next_state;
        }
        self.next = (self.next + 1) % self.capacity;
        slot
    }

    pub(crate) fn gather(&self, indexes: &[usize]) -> Result<Batch> {
        let device = self.states[indexes[0]].device().clone();
        let states: Vec<Tensor> = indexes.iter().map(|i| self.states[*i].clone()).collect();
        let actions: Vec<Tensor> = indexes.iter().map(|i| self.actions[*i].clone()).collect();
        let next_states: Vec<Tensor> = indexes
            .iter()
            .map(|i| self.next_states[*i].clone())
            .collect();
        let rewards: Vec<f32> = indexes.iter().map(|i| self.rewards[*i]).collect();
        let dones: Vec<f32> = indexes
            .iter()
            .map(|i| if self.dones[*i] { 1f32 } else { 0f32 })
            .collect();
        let n = indexes.len();
        Ok(Batch {
            states: Tensor::stack(&states, 0)?,
            actions: Tensor::stack(&actions, 0)?,
            rewards: Tensor::from_vec(rewards, (n, 1), &device)?,
            dones: Tensor::from_vec(dones, (n, 1), &device)?,
            next_states: Tensor::stack(&next_states, 0)?,
            weights: None,
            indexes: None,
        })
    }
}

impl ExperienceBuffer for ReplayBuffer {
    fn push(&mut self, state: Tensor, action: Tensor, reward: f32, done: bool, next_state: Tensor) {
        self.push_slot(state, action, reward, done, next_state);
    }

    fn sample(&mut self, batch_size: usize) -> Result<Batch> {
        let indexes: Vec<usize> =
            rng::with_rng(|rng| (0..batch_size).map(|_| rng.random_range(0..self.size)).collect());
        self.gather(&indexes)
    }

    fn update_priorities(&mut self, _indexes: &[usize], _td_errors: &[f32]) {}

    fn len(&self) -> usize {
        self.size
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

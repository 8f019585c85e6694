use crate::rng;
use candle_core::{Result, Tensor};
use rand::Rng;
use std::collections::VecDeque;

/// A stacked sequence sample for latent-model training. States span one more step than
/// actions so the model sees the observation both sides of every transition.
pub struct SequenceBatch {
    /// `(B, L + 1, obs_dim)`
    pub states: Tensor,
    /// `(B, L, act_dim)`
    pub actions: Tensor,
    /// `(B, L, 1)`
    pub rewards: Tensor,
    /// `(B, L, 1)`
    pub dones: Tensor,
}

/// Circular store of fixed-length transition sequences. A per-episode accumulator slides a
/// window over the live episode and materializes one stored sequence per step once the window
/// is full, so consecutive stored sequences overlap by all but one step.
pub struct SequenceBuffer {
    capacity: usize,
    next: usize,
    size: usize,
    num_sequences: usize,
    states: Vec<Tensor>,
    actions: Vec<Tensor>,
    rewards: Vec<Tensor>,
    dones: Vec<Tensor>,
    ep_states: VecDeque<Tensor>,
    ep_actions: VecDeque<Tensor>,
    ep_rewards: VecDeque<f32>,
    ep_dones: VecDeque<bool>,
}

impl SequenceBuffer {
    pub fn new(capacity: usize, num_sequences: usize) -> Self {
        assert!(capacity > 0 && num_sequences > 0);
        Self {
            capacity,
            next: 0,
            size: 0,
            num_sequences,
            states: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
            ep_states: VecDeque::new(),
            ep_actions: VecDeque::new(),
            ep_rewards: VecDeque::new(),
            ep_dones: VecDeque::new(),
        }
    }

    /// True until `reset_episode` seeds the live-episode accumulator.
    pub fn needs_reset(&self) -> bool {
        self.ep_states.is_empty()
    }

    pub fn reset_episode(&mut self, state: Tensor) {
        self.ep_states.clear();
        self.ep_actions.clear();
        self.ep_rewards.clear();
        self.ep_dones.clear();
        self.ep_states.push_back(state);
    }

    pub fn append(
        &mut self,
        action: Tensor,
        reward: f32,
        done: bool,
        next_state: Tensor,
    ) -> Result<()> {
        self.ep_states.push_back(next_state);
        self.ep_actions.push_back(action);
        self.ep_rewards.push_back(reward);
        self.ep_dones.push_back(done);
        if self.ep_actions.len() == self.num_sequences {
            self.materialize()?;
            self.ep_states.pop_front();
            self.ep_actions.pop_front();
            self.ep_rewards.pop_front();
            self.ep_dones.pop_front();
        }
        Ok(())
    }

    fn materialize(&mut self) -> Result<()> {
        let device = self.ep_states[0].device().clone();
        let states: Vec<Tensor> = self.ep_states.iter().cloned().collect();
        let actions: Vec<Tensor> = self.ep_actions.iter().cloned().collect();
        let states = Tensor::stack(&states, 0)?;
        let actions = Tensor::stack(&actions, 0)?;
        let rewards = Tensor::from_vec(
            self.ep_rewards.iter().copied().collect::<Vec<f32>>(),
            (self.num_sequences, 1),
            &device,
        )?;
        let dones = Tensor::from_vec(
            self.ep_dones
                .iter()
                .map(|d| if *d { 1f32 } else { 0f32 })
                .collect::<Vec<f32>>(),
            (self.num_sequences, 1),
            &device,
        )?;
        let slot = self.next;
        if self.size < self.capacity {
            self.states.push(states);
            self.actions.push(actions);
            self.rewards.push(rewards);
            self.dones.push(dones);
            self.size += 1;
        } else {
            self.states[slot] = states;
            self.actions[slot] = actions;
            self.rewards[slot] = rewards;
            self.dones[slot] = dones;
        }
        self.next = (self.next + 1) % self.capacity;
        Ok(())
    }

    pub fn sample(&self, batch_size: usize) -> Result<SequenceBatch> {
        let indexes: Vec<usize> =
            rng::with_rng(|rng| (0..batch_size).map(|_| rng.random_range(0..self.size)).collect());
        let states: Vec<Tensor> = indexes.iter().map(|i| self.states[*i].clone()).collect();
        let actions: Vec<Tensor> = indexes.iter().map(|i| self.actions[*i].clone()).collect();
        let rewards: Vec<Tensor> = indexes.iter().map(|i| self.rewards[*i].clone()).collect();
        let dones: Vec<Tensor> = indexes.iter().map(|i| self.dones[*i].clone()).collect();
        Ok(SequenceBatch {
            states: Tensor::stack(&states, 0)?,
            actions: Tensor::stack(&actions, 0)?,
            rewards: Tensor::stack(&rewards, 0)?,
            dones: Tensor::stack(&dones, 0)?,
        })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

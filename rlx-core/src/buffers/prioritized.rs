use crate::buffers::ExperienceBuffer;
use crate::buffers::replay_buffer::{Batch, ReplayBuffer};
use crate::rng;
use candle_core::{Result, Tensor};
use rand::Rng;

const PRIORITY_EPS: f64 = 1e-4;

/// Binary indexed tree over leaf priorities. Leaves live at `capacity..2 * capacity`, the root
/// holds the total mass, and prefix descent gives proportional sampling in log time.
pub(crate) struct SumTree {
    nodes: Vec<f64>,
    capacity: usize,
}

impl SumTree {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            nodes: vec![0.; 2 * capacity],
            capacity,
        }
    }

    pub(crate) fn set(&mut self, index: usize, priority: f64) {
        let mut node = index + self.capacity;
        self.nodes[node] = priority;
        node /= 2;
        while node >= 1 {
            self.nodes[node] = self.nodes[2 * node] + self.nodes[2 * node + 1];
            node /= 2;
        }
    }

    pub(crate) fn get(&self, index: usize) -> f64 {
        self.nodes[index + self.capacity]
    }

    pub(crate) fn total(&self) -> f64 {
        self.nodes[1]
    }

    pub(crate) fn retrieve(&self, mut prefix: f64) -> usize {
        let mut node = 1;
        while node < self.capacity {
            let left = 2 * node;
            if prefix <= self.nodes[left] {
                node = left;
            } else {
                prefix -= self.nodes[left];
                node = left + 1;
            }
        }
        node - self.capacity
    }
}

/// Proportional prioritized replay. New transitions enter at the running maximum priority so
/// they are sampled at least once; the TD errors reported back through `update_priorities`
/// take over from there.
pub struct PrioritizedReplayBuffer {
    storage: ReplayBuffer,
    tree: SumTree,
    alpha: f64,
    beta: f64,
    beta_growth: f64,
    max_priority: f64,
}

impl PrioritizedReplayBuffer {
    pub fn new(capacity: usize, alpha: f64, beta: f64, beta_steps: usize) -> Self {
        Self {
            storage: ReplayBuffer::new(capacity),
            tree: SumTree::new(capacity),
            alpha,
            beta,
            beta_growth: (1. - beta) / beta_steps.max(1) as f64,
            max_priority: 1.,
        }
    }
}

impl ExperienceBuffer for PrioritizedReplayBuffer {
    fn push(&mut self, state: Tensor, action: Tensor, reward: f32, done: bool, next_state: Tensor) {
        let slot = self
            .storage
            .push_slot(state, action, reward, done, next_state);
        self.tree.set(slot, self.max_priority.powf(self.alpha));
    }

    fn sample(&mut self, batch_size: usize) -> Result<Batch> {
        let total = self.tree.total();
        let len = self.storage.len();
        // Stratified prefixes keep the sample spread over the priority mass.
        let indexes: Vec<usize> = rng::with_rng(|rng| {
            (0..batch_size)
                .map(|k| {
                    let prefix = (k as f64 + rng.random::<f64>()) / batch_size as f64 * total;
                    self.tree.retrieve(prefix).min(len - 1)
                })
                .collect()
        });
        let mut weights: Vec<f32> = indexes
            .iter()
            .map(|i| {
                let prob = self.tree.get(*i) / total;
                ((len as f64 * prob).max(f64::MIN_POSITIVE)).powf(-self.beta) as f32
            })
            .collect();
        let max_weight = weights.iter().cloned().fold(f32::MIN_POSITIVE, f32::max);
        for w in weights.iter_mut() {
            *w /= max_weight;
        }
        self.beta = (self.beta + self.beta_growth).min(1.);

        let mut batch = self.storage.gather(&indexes)?;
        let device = batch.states.device().clone();
        batch.weights = Some(Tensor::from_vec(weights, (batch_size, 1), &device)?);
        batch.indexes = Some(indexes);
        Ok(batch)
    }

    fn update_priorities(&mut self, indexes: &[usize], td_errors: &[f32]) {
        for (index, td) in indexes.iter().zip(td_errors) {
            let priority = td.abs() as f64 + PRIORITY_EPS;
            self.max_priority = self.max_priority.max(priority);
            self.tree.set(*index, priority.powf(self.alpha));
        }
    }

    fn len(&self) -> usize {
        self.storage.len()
    }

    fn capacity(&self) -> usize {
        self.storage.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_tree_tracks_totals_and_prefixes() {
        let mut tree = SumTree::new(8);
        tree.set(0, 1.);
        tree.set(3, 2.);
        tree.set(7, 1.);
        assert!((tree.total() - 4.).abs() < 1e-12);
        assert_eq!(tree.retrieve(0.5), 0);
        assert_eq!(tree.retrieve(1.5), 3);
        assert_eq!(tree.retrieve(3.5), 7);
    }
}

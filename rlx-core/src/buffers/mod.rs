pub mod prioritized;
pub mod replay_buffer;
pub mod sequence_buffer;

use candle_core::{Result, Tensor};
use enum_dispatch::enum_dispatch;
use prioritized::PrioritizedReplayBuffer;
use replay_buffer::{Batch, ReplayBuffer};

/// A bounded store of past transitions. Insertion wraps around once full, so the oldest
/// transition is overwritten; sampling never mutates stored entries.
#[enum_dispatch]
pub trait ExperienceBuffer {
    fn push(&mut self, state: Tensor, action: Tensor, reward: f32, done: bool, next_state: Tensor);

    /// Draws a training batch. Takes `&mut self` because the prioritized variant anneals its
    /// importance-weight exponent per sample.
    fn sample(&mut self, batch_size: usize) -> Result<Batch>;

    /// Feedback channel for prioritized replay; a no-op for the uniform buffer.
    fn update_priorities(&mut self, indexes: &[usize], td_errors: &[f32]);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;
}

#[enum_dispatch(ExperienceBuffer)]
pub enum ReplayBufferKind {
    Uniform(ReplayBuffer),
    Prioritized(PrioritizedReplayBuffer),
}

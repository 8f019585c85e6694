pub mod categorical;
pub mod squashed_gaussian;

pub use categorical::Categorical;
pub use squashed_gaussian::SquashedDiagGaussian;

use candle_core::{Result, Tensor};

/// The action-selection surface stochastic policies share. Both methods take a single rank-1
/// observation and return a detached action tensor; anything gradient-carrying stays on the
/// concrete distribution types.
pub trait Distribution {
    /// Stochastic draw, used while exploring.
    fn sample(&self, observation: &Tensor) -> Result<Tensor>;

    /// Deterministic draw (argmax / squashed mean), used while evaluating.
    fn mode(&self, observation: &Tensor) -> Result<Tensor>;
}

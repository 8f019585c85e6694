pub mod dqn;
pub mod sac;
pub mod sac_discrete;
pub mod slac;
pub mod td3;
pub mod twin_critic;

pub use dqn::Dqn;
pub use sac::Sac;
pub use sac_discrete::SacDiscrete;
pub use slac::Slac;
pub use td3::Td3;

use anyhow::Result;
use candle_core::Tensor;
use rlx_core::env::Env;
use rlx_core::observation::ObservationWindow;
use rlx_core::{Algorithm, StepOutcome};
use std::path::Path;

// NOTE: enum_dispatch cannot bridge the crate boundary to the trait in rlx-core, so this is a
// hand-rolled dispatch like the policy kinds elsewhere.
macro_rules! dispatch {
    ($self:ident, $algo:ident => $body:expr) => {
        match $self {
            Self::Dqn($algo) => $body,
            Self::Sac($algo) => $body,
            Self::SacDiscrete($algo) => $body,
            Self::Td3($algo) => $body,
            Self::Slac($algo) => $body,
        }
    };
}

/// All shipped algorithms behind one type, so registries and trainers do not need a type
/// parameter per algorithm.
pub enum AlgorithmKind {
    Dqn(Dqn),
    Sac(Sac),
    SacDiscrete(SacDiscrete),
    Td3(Td3),
    Slac(Slac),
}

impl std::fmt::Debug for AlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Dqn(_) => "Dqn",
            Self::Sac(_) => "Sac",
            Self::SacDiscrete(_) => "SacDiscrete",
            Self::Td3(_) => "Td3",
            Self::Slac(_) => "Slac",
        };
        f.write_str(name)
    }
}

impl Algorithm for AlgorithmKind {
    fn name(&self) -> &'static str {
        dispatch!(self, algo => algo.name())
    }

    fn observation_window(&self) -> ObservationWindow {
        dispatch!(self, algo => algo.observation_window())
    }

    fn step(&mut self, env: &mut dyn Env, window: &mut ObservationWindow) -> Result<StepOutcome> {
        dispatch!(self, algo => algo.step(env, window))
    }

    fn select_action(&self, window: &ObservationWindow) -> Result<Tensor> {
        dispatch!(self, algo => algo.select_action(window))
    }

    fn explore(&self, window: &ObservationWindow) -> Result<Tensor> {
        dispatch!(self, algo => algo.explore(window))
    }

    fn is_update(&self) -> bool {
        dispatch!(self, algo => algo.is_update())
    }

    fn update(&mut self) -> Result<()> {
        dispatch!(self, algo => algo.update())
    }

    fn save_params(&self, dir: &Path) -> Result<()> {
        dispatch!(self, algo => algo.save_params(dir))
    }
}

use anyhow::{Result, bail, ensure};
use candle_core::Device;
use rlx_agents::AlgorithmKind;
use rlx_agents::dqn::{Dqn, DqnConfig};
use rlx_agents::sac::{Sac, SacConfig};
use rlx_agents::sac_discrete::{SacDiscrete, SacDiscreteConfig};
use rlx_agents::slac::{Slac, SlacConfig};
use rlx_agents::td3::{Td3, Td3Config};
use rlx_core::env::{EnvironmentDescription, Space};
use rlx_core::rng;

pub const DISCRETE_ALGORITHMS: &[&str] = &["dqn", "double_dqn", "sac_discrete"];
pub const CONTINUOUS_ALGORITHMS: &[&str] = &["sac", "td3", "slac"];

/// Builds a discrete-action algorithm by name with default hyperparameters. Schedules that
/// span the whole run (epsilon decay, importance-weight annealing) stretch over `num_steps`.
pub fn discrete_algorithm(
    name: &str,
    env_description: &EnvironmentDescription,
    num_steps: usize,
    seed: u64,
    device: &Device,
) -> Result<AlgorithmKind> {
    ensure!(
        matches!(env_description.action_space, Space::Discrete(_)),
        "{name} expects a discrete action space"
    );
    rng::set_seed(seed);
    let algo = match name {
        "dqn" => AlgorithmKind::Dqn(Dqn::new(
            DqnConfig {
                eps_decay_steps: (num_steps / 4).max(1),
                ..Default::default()
            },
            env_description,
            device,
        )?),
        "double_dqn" => AlgorithmKind::Dqn(Dqn::new(
            DqnConfig {
                double_q: true,
                use_per: true,
                eps_decay_steps: (num_steps / 4).max(1),
                per_beta_steps: num_steps.max(1),
                ..Default::default()
            },
            env_description,
            device,
        )?),
        "sac_discrete" => AlgorithmKind::SacDiscrete(SacDiscrete::new(
            SacDiscreteConfig::default(),
            env_description,
            device,
        )?),
        _ => bail!("unknown discrete algorithm: {name}"),
    };
    Ok(algo)
}

/// Builds a continuous-action algorithm by name with default hyperparameters.
pub fn continuous_algorithm(
    name: &str,
    env_description: &EnvironmentDescription,
    _num_steps: usize,
    seed: u64,
    device: &Device,
) -> Result<AlgorithmKind> {
    ensure!(
        matches!(env_description.action_space, Space::Continuous { .. }),
        "{name} expects a continuous action space"
    );
    rng::set_seed(seed);
    let algo = match name {
        "sac" => AlgorithmKind::Sac(Sac::new(SacConfig::default(), env_description, device)?),
        "td3" => AlgorithmKind::Td3(Td3::new(Td3Config::default(), env_description, device)?),
        "slac" => AlgorithmKind::Slac(Slac::new(SlacConfig::default(), env_description, device)?),
        _ => bail!("unknown continuous algorithm: {name}"),
    };
    Ok(algo)
}

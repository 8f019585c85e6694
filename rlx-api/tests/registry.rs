use anyhow::Result;
use candle_core::Device;
use rlx_api::test_utils::{GridEnv, LineWalkEnv};
use rlx_api::{
    CONTINUOUS_ALGORITHMS, DISCRETE_ALGORITHMS, continuous_algorithm, discrete_algorithm,
};
use rlx_core::Algorithm;
use rlx_core::env::Env;

#[test]
fn discrete_registry_builds_every_algorithm() -> Result<()> {
    let device = Device::Cpu;
    let description = GridEnv::new(&device).env_description();
    for name in DISCRETE_ALGORITHMS {
        let algo = discrete_algorithm(name, &description, 10_000, 0, &device)?;
        assert_eq!(algo.name(), *name);
    }
    Ok(())
}

#[test]
fn continuous_registry_builds_every_algorithm() -> Result<()> {
    let device = Device::Cpu;
    let description = LineWalkEnv::new(&device).env_description();
    for name in CONTINUOUS_ALGORITHMS {
        let algo = continuous_algorithm(name, &description, 10_000, 0, &device)?;
        assert_eq!(algo.name(), *name);
    }
    Ok(())
}

#[test]
fn unknown_algorithm_names_are_rejected() {
    let device = Device::Cpu;
    let discrete = GridEnv::new(&device).env_description();
    let err = discrete_algorithm("ppo", &discrete, 10_000, 0, &device).unwrap_err();
    assert!(err.to_string().contains("ppo"));

    let continuous = LineWalkEnv::new(&device).env_description();
    let err = continuous_algorithm("ddpg", &continuous, 10_000, 0, &device).unwrap_err();
    assert!(err.to_string().contains("ddpg"));
}

#[test]
fn registries_reject_mismatched_action_spaces() {
    let device = Device::Cpu;
    let continuous = LineWalkEnv::new(&device).env_description();
    assert!(discrete_algorithm("dqn", &continuous, 10_000, 0, &device).is_err());

    let discrete = GridEnv::new(&device).env_description();
    assert!(continuous_algorithm("sac", &discrete, 10_000, 0, &device).is_err());
}

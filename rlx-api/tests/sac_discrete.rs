use anyhow::Result;
use candle_core::Device;
use rlx_agents::sac_discrete::{SacDiscrete, SacDiscreteConfig};
use rlx_api::test_utils::GridEnv;
use rlx_core::Algorithm;
use rlx_core::env::Env;

#[test]
fn sac_discrete_steps_updates_and_acts_within_space() -> Result<()> {
    let device = Device::Cpu;
    let mut env = GridEnv::new(&device);
    let description = env.env_description();
    let mut algo = SacDiscrete::new(
        SacDiscreteConfig {
            buffer_size: 500,
            batch_size: 8,
            layers: vec![16],
            start_steps: 20,
            update_interval: 2,
            target_update_interval: 10,
            ..Default::default()
        },
        &description,
        &device,
    )?;

    let mut window = algo.observation_window();
    window.reset_episode(env.reset(0)?);

    let mut updates = 0;
    for _ in 0..60 {
        algo.step(&mut env, &mut window)?;
        if algo.is_update() {
            algo.update()?;
            updates += 1;
        }
    }
    assert!(updates > 0);

    let action = algo.select_action(&window)?;
    assert!(description.action_space.contains(&action));
    let explored = algo.explore(&window)?;
    assert!(description.action_space.contains(&explored));
    Ok(())
}

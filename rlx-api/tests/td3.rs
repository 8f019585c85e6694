use anyhow::Result;
use candle_core::Device;
use rlx_agents::td3::{Td3, Td3Config};
use rlx_api::test_utils::LineWalkEnv;
use rlx_core::Algorithm;
use rlx_core::env::Env;

#[test]
fn td3_steps_updates_and_acts_within_bounds() -> Result<()> {
    let device = Device::Cpu;
    let mut env = LineWalkEnv::new(&device);
    let description = env.env_description();
    let mut algo = Td3::new(
        Td3Config {
            buffer_size: 500,
            batch_size: 8,
            layers: vec![16],
            start_steps: 10,
            update_interval: 2,
            policy_delay: 2,
            ..Default::default()
        },
        &description,
        &device,
    )?;

    let mut window = algo.observation_window();
    window.reset_episode(env.reset(0)?);
    assert!(!algo.is_update());

    let mut updates = 0;
    for _ in 0..40 {
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

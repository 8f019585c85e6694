use anyhow::Result;
use candle_core::Device;
use rlx_agents::slac::{Slac, SlacConfig};
use rlx_api::test_utils::LineWalkEnv;
use rlx_core::Algorithm;
use rlx_core::env::Env;
use std::fs;

#[test]
fn slac_fills_sequences_and_updates() -> Result<()> {
    let device = Device::Cpu;
    let mut env = LineWalkEnv::new(&device);
    let description = env.env_description();
    let mut algo = Slac::new(
        SlacConfig {
            buffer_size: 200,
            batch_size: 4,
            layers: vec![16],
            model_layers: vec![16],
            feature_dim: 8,
            latent_dim: 4,
            num_sequences: 3,
            start_steps: 20,
            ..Default::default()
        },
        &description,
        &device,
    )?;

    let mut window = algo.observation_window();
    assert_eq!(window.num_sequences(), 3);
    window.reset_episode(env.reset(0)?);
    assert!(!algo.is_update());

    for _ in 0..40 {
        algo.step(&mut env, &mut window)?;
    }
    // One 3-step sequence materializes per step once the episode is 3 steps deep.
    assert!(algo.buffer.len() >= 4);
    assert!(algo.is_update());
    algo.update()?;

    let action = algo.select_action(&window)?;
    assert!(description.action_space.contains(&action));
    let explored = algo.explore(&window)?;
    assert!(description.action_space.contains(&explored));

    let params_dir = std::env::temp_dir().join("rlx-test-slac-params");
    let _ = fs::remove_dir_all(&params_dir);
    algo.save_params(&params_dir)?;
    assert!(params_dir.join("model.safetensors").exists());
    assert!(params_dir.join("actor.safetensors").exists());
    fs::remove_dir_all(&params_dir)?;
    Ok(())
}

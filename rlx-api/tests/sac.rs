use anyhow::Result;
use candle_core::Device;
use rlx_agents::sac::{Sac, SacConfig};
use rlx_api::test_utils::LineWalkEnv;
use rlx_core::Algorithm;
use rlx_core::env::Env;
use rlx_core::trainer::{Trainer, TrainerConfig};
use std::fs;

#[test]
fn sac_trains_end_to_end() -> Result<()> {
    let device = Device::Cpu;
    let env = LineWalkEnv::new(&device);
    let env_eval = LineWalkEnv::new(&device);
    let description = env.env_description();
    let algo = Sac::new(
        SacConfig {
            buffer_size: 1_000,
            batch_size: 8,
            layers: vec![16],
            start_steps: 20,
            update_interval: 10,
            ..Default::default()
        },
        &description,
        &device,
    )?;

    let log_dir = std::env::temp_dir().join("rlx-test-sac-trainer");
    let _ = fs::remove_dir_all(&log_dir);
    let config = TrainerConfig {
        num_steps: 60,
        eval_interval: 30,
        num_eval_episodes: 1,
        log_dir: log_dir.clone(),
        seed: 3,
    };
    let mut trainer = Trainer::new(env, env_eval, algo, config);
    trainer.train()?;

    assert_eq!(trainer.eval_results().len(), 2);
    assert!(log_dir.join("params/step60/actor.safetensors").exists());
    assert!(log_dir.join("params/step60/alpha.safetensors").exists());

    let mut window = trainer.algo.observation_window();
    window.reset_episode(trainer.env.reset(0)?);
    let action = trainer.algo.select_action(&window)?;
    assert!(description.action_space.contains(&action));
    let explored = trainer.algo.explore(&window)?;
    assert!(description.action_space.contains(&explored));

    fs::remove_dir_all(&log_dir)?;
    Ok(())
}

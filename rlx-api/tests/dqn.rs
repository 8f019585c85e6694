use anyhow::Result;
use candle_core::Device;
use rlx_agents::dqn::{Dqn, DqnConfig};
use rlx_api::test_utils::GridEnv;
use rlx_core::Algorithm;
use rlx_core::buffers::ExperienceBuffer;
use rlx_core::env::Env;
use rlx_core::trainer::{Trainer, TrainerConfig};
use std::fs;

fn small_config() -> DqnConfig {
    DqnConfig {
        buffer_size: 1_000,
        batch_size: 16,
        layers: vec![32],
        start_steps: 50,
        update_interval: 4,
        target_update_interval: 20,
        eps_decay_steps: 100,
        ..Default::default()
    }
}

#[test]
fn dqn_trains_end_to_end_and_logs_checkpoints() -> Result<()> {
    let device = Device::Cpu;
    let env = GridEnv::new(&device);
    let env_eval = GridEnv::new(&device);
    let description = env.env_description();
    let algo = Dqn::new(small_config(), &description, &device)?;

    let log_dir = std::env::temp_dir().join("rlx-test-dqn-trainer");
    let _ = fs::remove_dir_all(&log_dir);
    let config = TrainerConfig {
        num_steps: 300,
        eval_interval: 100,
        num_eval_episodes: 2,
        log_dir: log_dir.clone(),
        seed: 7,
    };
    let mut trainer = Trainer::new(env, env_eval, algo, config);
    trainer.train()?;

    assert_eq!(trainer.eval_results().len(), 3);
    let summary = fs::read_to_string(log_dir.join("summary.csv"))?;
    assert!(summary.starts_with("step,mean_return\n"));
    assert_eq!(summary.lines().count(), 4);
    assert!(log_dir.join("params/step300/q_net.safetensors").exists());

    fs::remove_dir_all(&log_dir)?;
    Ok(())
}

#[test]
fn double_dqn_with_per_feeds_priorities_back() -> Result<()> {
    let device = Device::Cpu;
    let mut env = GridEnv::new(&device);
    let description = env.env_description();
    let mut algo = Dqn::new(
        DqnConfig {
            double_q: true,
            use_per: true,
            per_beta_steps: 100,
            ..small_config()
        },
        &description,
        &device,
    )?;

    let mut window = algo.observation_window();
    window.reset_episode(env.reset(0)?);
    for _ in 0..120 {
        algo.step(&mut env, &mut window)?;
        if algo.is_update() {
            algo.update()?;
        }
    }
    assert!(algo.buffer().len() > 0);

    let action = algo.select_action(&window)?;
    assert!(description.action_space.contains(&action));
    Ok(())
}

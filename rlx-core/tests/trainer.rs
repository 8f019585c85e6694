use anyhow::Result;
use candle_core::{Device, Tensor};
use rlx_api::test_utils::LineWalkEnv;
use rlx_core::env::{Env, EnvironmentDescription};
use rlx_core::observation::ObservationWindow;
use rlx_core::rng;
use rlx_core::trainer::{Trainer, TrainerConfig, TrainerHooks};
use rlx_core::{Algorithm, StepOutcome};
use rand::Rng;
use std::fs;
use std::path::Path;

/// Policy-free algorithm that just walks the env randomly; enough to drive the loop.
struct RandomWalk {
    env_description: EnvironmentDescription,
    device: Device,
    step_count: usize,
}

impl RandomWalk {
    fn new(env_description: EnvironmentDescription, device: Device) -> Self {
        Self {
            env_description,
            device,
            step_count: 0,
        }
    }
}

impl Algorithm for RandomWalk {
    fn name(&self) -> &'static str {
        "random_walk"
    }

    fn observation_window(&self) -> ObservationWindow {
        ObservationWindow::new(1, self.env_description.action_size(), self.device.clone())
    }

    fn step(&mut self, env: &mut dyn Env, window: &mut ObservationWindow) -> Result<StepOutcome> {
        self.step_count += 1;
        let action = self.env_description.action_space.sample(&self.device)?;
        let snap_shot = env.step(&action)?;
        let episode_done = snap_shot.episode_over();
        if episode_done {
            let next_state = env.reset(rng::with_rng(|rng| rng.random()))?;
            window.reset_episode(next_state);
        } else {
            window.append(action, snap_shot.state);
        }
        Ok(StepOutcome {
            reward: snap_shot.reward,
            episode_done,
        })
    }

    fn select_action(&self, _window: &ObservationWindow) -> Result<Tensor> {
        self.env_description.action_space.sample(&self.device)
    }

    fn explore(&self, _window: &ObservationWindow) -> Result<Tensor> {
        self.env_description.action_space.sample(&self.device)
    }

    fn is_update(&self) -> bool {
        false
    }

    fn update(&mut self) -> Result<()> {
        Ok(())
    }

    fn save_params(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        Ok(())
    }
}

#[test]
fn trainer_evaluates_on_cadence_and_writes_summary() -> Result<()> {
    let device = Device::Cpu;
    let env = LineWalkEnv::new(&device);
    let env_eval = LineWalkEnv::new(&device);
    let description = env.env_description();
    let algo = RandomWalk::new(description, device);

    let log_dir = std::env::temp_dir().join("rlx-test-trainer-cadence");
    let _ = fs::remove_dir_all(&log_dir);
    let config = TrainerConfig {
        num_steps: 120,
        eval_interval: 40,
        num_eval_episodes: 1,
        log_dir: log_dir.clone(),
        seed: 5,
    };
    let mut trainer = Trainer::new(env, env_eval, algo, config);
    trainer.train()?;

    let steps: Vec<usize> = trainer.eval_results().iter().map(|(s, _)| *s).collect();
    assert_eq!(steps, vec![40, 80, 120]);
    let summary = fs::read_to_string(log_dir.join("summary.csv"))?;
    assert_eq!(summary.lines().count(), 4);
    assert!(log_dir.join("params/step40").is_dir());
    assert!(log_dir.join("params/step120").is_dir());

    fs::remove_dir_all(&log_dir)?;
    Ok(())
}

struct StopEarly {
    steps_seen: usize,
    stop_at: usize,
}

impl TrainerHooks for StopEarly {
    fn init_hook(&mut self) -> bool {
        false
    }

    fn post_step_hook(&mut self, step: usize, _outcome: &StepOutcome) -> bool {
        self.steps_seen = step;
        step >= self.stop_at
    }

    fn post_eval_hook(&mut self, _step: usize, _mean_return: f32) -> bool {
        false
    }

    fn shutdown_hook(&mut self) -> Result<()> {
        Ok(())
    }
}

#[test]
fn hooks_stop_training_early() -> Result<()> {
    let device = Device::Cpu;
    let env = LineWalkEnv::new(&device);
    let env_eval = LineWalkEnv::new(&device);
    let description = env.env_description();
    let algo = RandomWalk::new(description, device);

    let log_dir = std::env::temp_dir().join("rlx-test-trainer-early-stop");
    let _ = fs::remove_dir_all(&log_dir);
    let config = TrainerConfig {
        num_steps: 1_000,
        eval_interval: 500,
        num_eval_episodes: 1,
        log_dir: log_dir.clone(),
        seed: 5,
    };
    let hooks = StopEarly {
        steps_seen: 0,
        stop_at: 10,
    };
    let mut trainer = Trainer::with_hooks(env, env_eval, algo, hooks, config);
    trainer.train()?;

    assert_eq!(trainer.hooks.steps_seen, 10);
    assert!(trainer.eval_results().is_empty());

    fs::remove_dir_all(&log_dir)?;
    Ok(())
}

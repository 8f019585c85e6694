use anyhow::Result;
use candle_core::Device;
use clap::Parser;
use rlx_api::continuous_algorithm;
use rlx_core::env::Env;
use rlx_core::trainer::{Trainer, TrainerConfig};
use rlx_examples::log_dir;
use rlx_gym::GymEnv;

#[derive(Parser, Debug)]
struct Args {
    /// One of: sac, td3, slac
    #[arg(long, default_value = "sac")]
    algo: String,

    #[arg(long = "env_id", default_value = "Pendulum-v1")]
    env_id: String,

    #[arg(long = "num_steps", default_value_t = 100_000)]
    num_steps: usize,

    #[arg(long = "eval_interval", default_value_t = 10_000)]
    eval_interval: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let device = Device::Cpu;
    let env = GymEnv::new(&args.env_id, None, &device)?;
    let env_eval = GymEnv::new(&args.env_id, None, &device)?;
    let description = env.env_description();
    let algo = continuous_algorithm(&args.algo, &description, args.num_steps, args.seed, &device)?;
    let config = TrainerConfig {
        num_steps: args.num_steps,
        eval_interval: args.eval_interval,
        log_dir: log_dir(&args.env_id, &args.algo, args.seed),
        seed: args.seed,
        ..Default::default()
    };
    Trainer::new(env, env_eval, algo, config).train()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_keep_underscore_flag_names() {
        let args = Args::parse_from([
            "train_continuous",
            "--algo",
            "slac",
            "--env_id",
            "Pendulum-v1",
            "--num_steps",
            "2000",
            "--eval_interval",
            "500",
        ]);
        assert_eq!(args.algo, "slac");
        assert_eq!(args.env_id, "Pendulum-v1");
        assert_eq!(args.num_steps, 2000);
        assert_eq!(args.eval_interval, 500);
        assert_eq!(args.seed, 0);
    }
}

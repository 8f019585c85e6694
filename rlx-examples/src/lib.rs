use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Run directory layout: `logs/{env_id}/{algo}-seed{seed}-{timestamp}`.
pub fn log_dir(env_id: &str, algo: &str, seed: u64) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    PathBuf::from("logs")
        .join(env_id)
        .join(format!("{algo}-seed{seed}-{stamp}"))
}

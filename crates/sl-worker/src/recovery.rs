use std::time::Duration;

use sqlx::PgPool;
use tracing::{debug, error, info};

/// Spawn the background task that returns stale claims to pending. Runs
/// every `interval_secs`; a claim is stale when its lock is older than
/// `threshold_minutes`.
pub fn spawn_recovery_loop(
    pool: PgPool,
    interval_secs: u64,
    threshold_minutes: i64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        // First tick fires immediately; skip it so startup isn't noisy.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sl_db::jobs::recover_stale(&pool, threshold_minutes).await {
                Ok(0) => {}
                Ok(n) => info!(recovered = n, "returned stale jobs to pending"),
                Err(e) => error!(error = %e, "stale-claim recovery failed"),
            }
        }
    })
}

/// Spawn the integrity refresh task: recompute each network's contiguous
/// tip and progress row on an interval so /status stays honest.
pub fn spawn_progress_loop(
    pool: PgPool,
    networks: Vec<String>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for network in &networks {
                match sl_db::progress::refresh_progress(&pool, network).await {
                    Ok(()) => debug!(network, "index progress refreshed"),
                    Err(e) => error!(network, error = %e, "progress refresh failed"),
                }
            }
        }
    })
}

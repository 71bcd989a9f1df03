//! sl-worker entry point: spawn the worker loops and the stale-claim
//! recovery task, then wait for ctrl-c and drain gracefully.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use sl_worker::{run_worker, spawn_progress_loop, spawn_recovery_loop, WorkerContext};

#[derive(Parser, Debug)]
#[command(name = "sl-worker", about = "secondlayer delivery worker")]
struct Args {
    /// Worker loops to run in this process.
    #[arg(long, env = "WORKER_COUNT", default_value_t = 1)]
    workers: usize,

    /// Seconds between stale-claim recovery passes.
    #[arg(long, env = "RECOVERY_INTERVAL_SECS", default_value_t = 60)]
    recovery_interval_secs: u64,

    /// Minutes before a processing lock counts as stale.
    #[arg(long, env = "STALE_CLAIM_MINUTES", default_value_t = 5)]
    stale_claim_minutes: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sl_config::bootstrap_env();
    let args = Args::parse();
    let config = sl_config::Config::from_env().context("configuration failed")?;
    sl_config::init_tracing(&config);

    let pool = sl_db::connect(&config.database_url).await?;
    let ctx = WorkerContext::new(pool.clone(), config.primary_network().to_string());

    let workers = args.workers.max(1);
    info!(
        workers,
        network = config.primary_network(),
        "starting worker process"
    );
    // The token buckets live in this process: the fleet-wide delivery rate
    // scales with the number of worker processes.
    warn!("per-stream rate limits are per-process; aggregate rate = processes x limit");

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let recovery = spawn_recovery_loop(
        pool.clone(),
        args.recovery_interval_secs,
        args.stale_claim_minutes,
    );
    let progress = spawn_progress_loop(
        pool.clone(),
        config.networks.clone(),
        args.recovery_interval_secs,
    );

    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
    let mut handles = Vec::with_capacity(workers);
    for i in 0..workers {
        let ctx = ctx.clone();
        let worker_id = format!("{hostname}-{i}");
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(run_worker(ctx, worker_id, shutdown_rx)));
    }

    tokio::signal::ctrl_c().await.context("signal wait failed")?;
    info!("shutdown signal received; draining workers");
    let _ = shutdown_tx.send(());

    // Each loop finishes its in-flight job, then exits.
    let drain = async {
        for handle in handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(30), drain).await.is_err() {
        warn!("drain timed out; exiting with jobs in flight (recovery will reclaim)");
    }
    recovery.abort();
    progress.abort();

    info!("worker process stopped");
    Ok(())
}

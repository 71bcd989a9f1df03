use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use sl_db::deliveries::NewDelivery;
use sl_db::jobs::{JobListener, JobRow};
use sl_db::streams::StreamRow;
use sl_dispatch::{DispatchOptions, DispatchResult};
use sl_schemas::{
    Block, BlockSummary, DeliveryOutcome, EventMatch, MatchPayload, StreamStatus, TransactionMatch,
    WebhookPayload,
};

use crate::context::WorkerContext;
use crate::{FAILURE_WINDOW_MINUTES, IDLE_WAIT_SECS, JOB_MAX_ATTEMPTS, MAX_CONSECUTIVE_FAILURES};

/// Main worker loop. Claims until the queue is empty, then blocks on the
/// notification channel with a bounded wait before re-polling. Finishes the
/// in-flight job on shutdown.
pub async fn run_worker(
    ctx: WorkerContext,
    worker_id: String,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    info!(%worker_id, "worker loop started");

    let mut listener = match JobListener::connect(&ctx.pool).await {
        Ok(l) => Some(l),
        Err(e) => {
            // Polling still makes progress; wakeups are just slower.
            warn!(%worker_id, error = %e, "job listener unavailable; falling back to polling");
            None
        }
    };

    loop {
        if shutdown.try_recv().is_ok() {
            break;
        }

        match sl_db::jobs::claim(&ctx.pool, &worker_id).await {
            Ok(Some(job)) => {
                if let Err(e) = process_job(&ctx, &job).await {
                    // Infrastructure failure mid-job: record and requeue.
                    error!(%worker_id, job_id = job.id, error = %e, "job processing error");
                    if let Err(e) =
                        sl_db::jobs::fail(&ctx.pool, job.id, &e.to_string(), JOB_MAX_ATTEMPTS).await
                    {
                        error!(%worker_id, job_id = job.id, error = %e, "failed to fail job");
                    }
                }
            }
            Ok(None) => {
                let idle = Duration::from_secs(IDLE_WAIT_SECS);
                match listener.as_mut() {
                    Some(l) => {
                        if l.wait_for_job(idle).await {
                            debug!(%worker_id, "woken by new-job notification");
                        }
                    }
                    None => tokio::time::sleep(idle).await,
                }
            }
            Err(e) => {
                error!(%worker_id, error = %e, "claim failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    info!(%worker_id, "worker loop stopped");
}

/// Process one claimed job end to end. Job bookkeeping (complete/fail) is
/// handled here; an `Err` return means an infrastructure failure the caller
/// should record via `fail`.
pub async fn process_job(ctx: &WorkerContext, job: &JobRow) -> Result<()> {
    let Some(stream) = sl_db::streams::fetch_stream(&ctx.pool, job.stream_id).await? else {
        debug!(job_id = job.id, stream_id = %job.stream_id, "stream gone; completing job");
        sl_db::jobs::complete(&ctx.pool, job.id).await?;
        return Ok(());
    };

    if stream.status != StreamStatus::Active {
        debug!(
            job_id = job.id,
            stream_id = %stream.id,
            status = stream.status.as_str(),
            "stream not active; skipping"
        );
        sl_db::jobs::complete(&ctx.pool, job.id).await?;
        return Ok(());
    }

    let Some(block) = sl_db::chain::fetch_canonical_block(&ctx.pool, job.block_height).await? else {
        debug!(job_id = job.id, height = job.block_height, "no canonical block; skipping");
        sl_db::jobs::complete(&ctx.pool, job.id).await?;
        return Ok(());
    };

    let txs = sl_db::chain::transactions_for_height(&ctx.pool, job.block_height).await?;
    let events = sl_db::chain::events_for_height(&ctx.pool, job.block_height).await?;

    let matches = sl_matcher::evaluate(&stream.filters, &txs, &events);
    if !matches.any_match {
        sl_db::jobs::complete(&ctx.pool, job.id).await?;
        return Ok(());
    }

    let payload = build_payload(&stream, &block, &matches, job.is_backfill, &ctx.network);
    let payload_json = serde_json::to_value(&payload).context("payload serialize failed")?;

    ctx.limiter.acquire(stream.id, stream.options.rate_limit).await;

    let opts = DispatchOptions {
        max_attempts: stream.options.max_retries,
        timeout_ms: stream.options.timeout_ms,
        ..DispatchOptions::default()
    };
    let result = ctx
        .dispatcher
        .dispatch(
            &stream.webhook_url,
            &payload_json,
            stream.webhook_secret.as_deref(),
            &opts,
        )
        .await;

    record_outcome(ctx, job, &stream, &payload_json, &result).await
}

async fn record_outcome(
    ctx: &WorkerContext,
    job: &JobRow,
    stream: &StreamRow,
    payload_json: &serde_json::Value,
    result: &DispatchResult,
) -> Result<()> {
    let outcome = if result.success {
        DeliveryOutcome::Success
    } else {
        DeliveryOutcome::Failed
    };

    sl_db::deliveries::insert_delivery(
        &ctx.pool,
        &NewDelivery {
            stream_id: stream.id,
            job_id: Some(job.id),
            block_height: job.block_height,
            outcome,
            status_code: result.status_code.map(i32::from),
            response_time_ms: result.response_time_ms as i64,
            attempts: result.attempts as i32,
            error: result.error.clone(),
            payload: payload_json.clone(),
        },
    )
    .await?;

    if let Some(account_id) = sl_db::account_for_key(&ctx.pool, stream.owner_key_id).await? {
        sl_db::usage::increment_deliveries(&ctx.pool, account_id).await?;
    }

    if result.success {
        sl_db::streams::record_delivery_success(
            &ctx.pool,
            stream.id,
            job.block_height,
            job.is_backfill,
        )
        .await?;
        info!(
            job_id = job.id,
            stream_id = %stream.id,
            block_height = job.block_height,
            attempts = result.attempts,
            "delivery succeeded"
        );
        sl_db::jobs::complete(&ctx.pool, job.id).await?;
        return Ok(());
    }

    let error = result.error.as_deref().unwrap_or("delivery failed");
    sl_db::streams::record_delivery_failure(&ctx.pool, stream.id, error).await?;
    check_failure_trip(ctx, stream).await?;

    if is_permanent_rejection(result) {
        // The attempt reached the endpoint; the endpoint said no. The job
        // did its work; only the delivery is failed.
        warn!(
            job_id = job.id,
            stream_id = %stream.id,
            status = result.status_code,
            "permanent webhook rejection"
        );
        sl_db::jobs::complete(&ctx.pool, job.id).await?;
    } else {
        warn!(
            job_id = job.id,
            stream_id = %stream.id,
            error,
            "retryable delivery failure"
        );
        sl_db::jobs::fail(&ctx.pool, job.id, error, JOB_MAX_ATTEMPTS).await?;
    }
    Ok(())
}

/// 4xx means the endpoint rejected the payload; retrying cannot change the
/// answer, so the job completes and only the delivery is failed.
pub fn is_permanent_rejection(result: &DispatchResult) -> bool {
    matches!(result.status_code, Some(code) if (400..500).contains(&code))
}

/// Count failures newer than the last success inside the window; at the
/// threshold, trip the stream to `failed` so further jobs are skipped.
async fn check_failure_trip(ctx: &WorkerContext, stream: &StreamRow) -> Result<()> {
    let failures =
        sl_db::deliveries::count_recent_failures(&ctx.pool, stream.id, FAILURE_WINDOW_MINUTES)
            .await?;
    if failures >= MAX_CONSECUTIVE_FAILURES {
        warn!(
            stream_id = %stream.id,
            failures,
            "consecutive failure threshold reached; failing stream"
        );
        sl_db::streams::set_stream_status(&ctx.pool, stream.id, StreamStatus::Failed).await?;
    }
    Ok(())
}

pub fn build_payload(
    stream: &StreamRow,
    block: &Block,
    matches: &sl_matcher::MatchResult,
    is_backfill: bool,
    network: &str,
) -> WebhookPayload {
    let with_metadata = stream.options.include_block_metadata;
    WebhookPayload {
        stream_id: stream.id,
        stream_name: stream.name.clone(),
        network: network.to_string(),
        block: BlockSummary {
            height: block.height,
            hash: block.hash.clone(),
            parent_hash: block.parent_hash.clone(),
            burn_block_height: with_metadata.then_some(block.burn_height),
            timestamp: with_metadata.then_some(block.timestamp.timestamp()),
        },
        matches: MatchPayload {
            transactions: matches
                .transactions
                .iter()
                .map(|tx| TransactionMatch::from_transaction(tx, stream.options.include_raw_tx))
                .collect(),
            events: matches.events.iter().map(EventMatch::from_event).collect(),
        },
        is_backfill,
        delivered_at: Utc::now(),
    }
}

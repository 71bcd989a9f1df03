//! Durable job queue over the `jobs` table.
//!
//! Claim safety rests on a single atomic statement: a `FOR UPDATE SKIP
//! LOCKED` row pick feeding the status update. Two workers can race the
//! statement; only one sees any given row. Notifications are advisory:
//! enqueue publishes on `streams:new_job`, but workers poll on a timer
//! regardless, so a lost notification costs latency, never correctness.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgListener;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::CHANNEL_NEW_JOB;
use sl_schemas::JobStatus;

#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: i64,
    pub stream_id: Uuid,
    pub block_height: i64,
    pub status: JobStatus,
    pub attempts: i32,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub is_backfill: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<JobRow> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::parse(&status_str)
        .with_context(|| format!("unknown job status in store: {status_str}"))?;
    Ok(JobRow {
        id: row.try_get("id")?,
        stream_id: row.try_get("stream_id")?,
        block_height: row.try_get("block_height")?,
        status,
        attempts: row.try_get("attempts")?,
        locked_at: row.try_get("locked_at")?,
        locked_by: row.try_get("locked_by")?,
        last_error: row.try_get("last_error")?,
        is_backfill: row.try_get("is_backfill")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

const JOB_COLUMNS: &str = "id, stream_id, block_height, status, attempts, locked_at, locked_by, \
                           last_error, is_backfill, created_at, completed_at";

/// Enqueue a job for (stream, block). Fire-and-forget safe: an open job for
/// the same pair is not duplicated, and the wakeup notification is published
/// in the same transaction but is non-fatal.
///
/// Returns the new job id, or `None` when an open duplicate already covers
/// the work.
pub async fn enqueue(
    pool: &PgPool,
    stream_id: Uuid,
    block_height: i64,
    is_backfill: bool,
) -> Result<Option<i64>> {
    let mut tx = pool.begin().await.context("enqueue begin failed")?;

    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        insert into jobs (stream_id, block_height, is_backfill)
        select $1, $2, $3
        where not exists (
            select 1 from jobs
            where stream_id = $1
              and block_height = $2
              and status in ('pending', 'processing')
        )
        returning id
        "#,
    )
    .bind(stream_id)
    .bind(block_height)
    .bind(is_backfill)
    .fetch_optional(&mut *tx)
    .await
    .context("enqueue insert failed")?;

    if row.is_some() {
        // Workers fall back to the poll timer if this is lost.
        if let Err(e) = sqlx::query("select pg_notify($1, $2)")
            .bind(CHANNEL_NEW_JOB)
            .bind(stream_id.to_string())
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(error = %e, %stream_id, "pg_notify failed; workers will poll");
        }
    }

    tx.commit().await.context("enqueue commit failed")?;
    Ok(row.map(|(id,)| id))
}

/// Atomically claim the next pending job for exclusive processing.
///
/// Ordering: live traffic before backfill, then oldest block, then oldest
/// job. `FOR UPDATE SKIP LOCKED` guarantees that concurrent claimers never
/// see the same row. Returns `None` when no work is available.
pub async fn claim(pool: &PgPool, worker_id: &str) -> Result<Option<JobRow>> {
    let row = sqlx::query(&format!(
        r#"
        with next_job as (
            select id
            from jobs
            where status = 'pending'
            order by is_backfill asc, block_height asc, created_at asc, id asc
            limit 1
            for update skip locked
        )
        update jobs
           set status    = 'processing',
               attempts  = attempts + 1,
               locked_at = now(),
               locked_by = $1
         where id in (select id from next_job)
        returning {JOB_COLUMNS}
        "#
    ))
    .bind(worker_id)
    .fetch_optional(pool)
    .await
    .context("claim failed")?;

    row.as_ref().map(job_from_row).transpose()
}

/// Mark a job completed and release its lock.
pub async fn complete(pool: &PgPool, job_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        update jobs
           set status       = 'completed',
               locked_at    = null,
               locked_by    = null,
               completed_at = now()
         where id = $1
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await
    .context("complete failed")?;
    Ok(())
}

/// Record a failure. Below the attempt ceiling the job returns to pending
/// for another worker; at the ceiling it is terminally failed.
pub async fn fail(pool: &PgPool, job_id: i64, error: &str, max_attempts: i32) -> Result<JobStatus> {
    let (status_str,): (String,) = sqlx::query_as(
        r#"
        update jobs
           set status       = case when attempts < $3 then 'pending' else 'failed' end,
               last_error   = $2,
               locked_at    = null,
               locked_by    = null,
               completed_at = case when attempts < $3 then null else now() end
         where id = $1
        returning status
        "#,
    )
    .bind(job_id)
    .bind(error)
    .bind(max_attempts)
    .fetch_one(pool)
    .await
    .context("fail failed")?;

    JobStatus::parse(&status_str).context("fail returned unknown status")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
}

pub async fn stats(pool: &PgPool) -> Result<QueueStats> {
    let row = sqlx::query(
        r#"
        select
          count(*) filter (where status = 'pending')    as pending,
          count(*) filter (where status = 'processing') as processing,
          count(*) filter (where status = 'completed')  as completed,
          count(*) filter (where status = 'failed')     as failed,
          count(*)                                      as total
        from jobs
        "#,
    )
    .fetch_one(pool)
    .await
    .context("stats failed")?;

    Ok(QueueStats {
        pending: row.try_get("pending")?,
        processing: row.try_get("processing")?,
        completed: row.try_get("completed")?,
        failed: row.try_get("failed")?,
        total: row.try_get("total")?,
    })
}

/// Return all stale processing jobs (lock older than the threshold) to
/// pending, clearing their locks. Compensates for worker crashes mid-job.
pub async fn recover_stale(pool: &PgPool, threshold_minutes: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        update jobs
           set status    = 'pending',
               locked_at = null,
               locked_by = null
         where status = 'processing'
           and locked_at < now() - ($1 * interval '1 minute')
        "#,
    )
    .bind(threshold_minutes)
    .execute(pool)
    .await
    .context("recover_stale failed")?;
    Ok(result.rows_affected())
}

/// Publish a wakeup outside of enqueue (replays, manual nudges).
pub async fn notify_new_job(pool: &PgPool, stream_id: Option<Uuid>) -> Result<()> {
    sqlx::query("select pg_notify($1, $2)")
        .bind(CHANNEL_NEW_JOB)
        .bind(stream_id.map(|id| id.to_string()).unwrap_or_default())
        .execute(pool)
        .await
        .context("notify_new_job failed")?;
    Ok(())
}

pub async fn fetch_job(pool: &PgPool, job_id: i64) -> Result<Option<JobRow>> {
    let row = sqlx::query(&format!(
        r#"
        select {JOB_COLUMNS}
        from jobs
        where id = $1
        "#
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await
    .context("fetch_job failed")?;

    row.as_ref().map(job_from_row).transpose()
}

/// Dedicated LISTEN subscription for worker wakeups. Each listener holds its
/// own connection; the queue stays correct if it drops.
pub struct JobListener {
    inner: PgListener,
}

impl JobListener {
    pub async fn connect(pool: &PgPool) -> Result<Self> {
        let mut inner = PgListener::connect_with(pool)
            .await
            .context("job listener connect failed")?;
        inner
            .listen(CHANNEL_NEW_JOB)
            .await
            .context("job listener subscribe failed")?;
        Ok(Self { inner })
    }

    /// Block until a new-job notification arrives or `timeout` elapses.
    /// Returns true when woken by a notification. Connection errors count as
    /// a timeout: the caller re-polls either way.
    pub async fn wait_for_job(&mut self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.inner.recv()).await,
            Ok(Ok(_))
        )
    }
}

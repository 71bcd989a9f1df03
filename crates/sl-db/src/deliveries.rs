use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use sl_schemas::DeliveryOutcome;

/// Append-only record of one dispatch outcome, with the full payload
/// snapshot for replay-failed and audit.
#[derive(Debug, Clone)]
pub struct DeliveryRow {
    pub id: i64,
    pub stream_id: Uuid,
    pub job_id: Option<i64>,
    pub block_height: i64,
    pub outcome: DeliveryOutcome,
    pub status_code: Option<i32>,
    pub response_time_ms: i64,
    pub attempts: i32,
    pub error: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub stream_id: Uuid,
    pub job_id: Option<i64>,
    pub block_height: i64,
    pub outcome: DeliveryOutcome,
    pub status_code: Option<i32>,
    pub response_time_ms: i64,
    pub attempts: i32,
    pub error: Option<String>,
    pub payload: Value,
}

const DELIVERY_COLUMNS: &str = "id, stream_id, job_id, block_height, outcome, status_code, \
                                response_time_ms, attempts, error, payload, created_at";

fn delivery_from_row(row: &sqlx::postgres::PgRow) -> Result<DeliveryRow> {
    let outcome_str: String = row.try_get("outcome")?;
    let outcome = DeliveryOutcome::parse(&outcome_str)
        .with_context(|| format!("unknown delivery outcome in store: {outcome_str}"))?;
    Ok(DeliveryRow {
        id: row.try_get("id")?,
        stream_id: row.try_get("stream_id")?,
        job_id: row.try_get("job_id")?,
        block_height: row.try_get("block_height")?,
        outcome,
        status_code: row.try_get("status_code")?,
        response_time_ms: row.try_get("response_time_ms")?,
        attempts: row.try_get("attempts")?,
        error: row.try_get("error")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert_delivery(pool: &PgPool, new: &NewDelivery) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into deliveries (
          stream_id, job_id, block_height, outcome, status_code,
          response_time_ms, attempts, error, payload
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        returning id
        "#,
    )
    .bind(new.stream_id)
    .bind(new.job_id)
    .bind(new.block_height)
    .bind(new.outcome.as_str())
    .bind(new.status_code)
    .bind(new.response_time_ms)
    .bind(new.attempts)
    .bind(&new.error)
    .bind(&new.payload)
    .fetch_one(pool)
    .await
    .context("insert_delivery failed")?;
    Ok(id)
}

/// Paged listing, newest first, optionally filtered by outcome. Returns the
/// page plus the total matching count.
pub async fn list_deliveries(
    pool: &PgPool,
    stream_id: Uuid,
    outcome: Option<DeliveryOutcome>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<DeliveryRow>, i64)> {
    let outcome_str = outcome.map(|o| o.as_str());

    let rows = sqlx::query(&format!(
        r#"
        select {DELIVERY_COLUMNS}
        from deliveries
        where stream_id = $1
          and ($2::text is null or outcome = $2)
        order by created_at desc, id desc
        limit $3 offset $4
        "#
    ))
    .bind(stream_id)
    .bind(outcome_str)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("list_deliveries failed")?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        select count(*)::bigint
        from deliveries
        where stream_id = $1
          and ($2::text is null or outcome = $2)
        "#,
    )
    .bind(stream_id)
    .bind(outcome_str)
    .fetch_one(pool)
    .await
    .context("list_deliveries count failed")?;

    let page = rows
        .iter()
        .map(delivery_from_row)
        .collect::<Result<Vec<_>>>()?;
    Ok((page, total))
}

/// Distinct heights with at least one failed delivery for the stream;
/// replay-failed enqueues one job per height.
pub async fn distinct_failed_heights(pool: &PgPool, stream_id: Uuid) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        select distinct block_height
        from deliveries
        where stream_id = $1 and outcome = 'failed'
        order by block_height asc
        "#,
    )
    .bind(stream_id)
    .fetch_all(pool)
    .await
    .context("distinct_failed_heights failed")?;
    Ok(rows.into_iter().map(|(h,)| h).collect())
}

pub async fn recent_delivery_count(pool: &PgPool, window_minutes: i64) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        select count(*)::bigint
        from deliveries
        where created_at > now() - ($1 * interval '1 minute')
        "#,
    )
    .bind(window_minutes)
    .fetch_one(pool)
    .await
    .context("recent_delivery_count failed")?;
    Ok(n)
}

/// Failures newer than the stream's most recent success, bounded by the
/// window. This is the breaker input: a success resets the run, and stale
/// failures age out of the window.
pub async fn count_recent_failures(
    pool: &PgPool,
    stream_id: Uuid,
    window_minutes: i64,
) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        select count(*)::bigint
        from deliveries
        where stream_id = $1
          and outcome = 'failed'
          and created_at > now() - ($2 * interval '1 minute')
          and created_at > coalesce(
              (select max(created_at)
               from deliveries
               where stream_id = $1 and outcome = 'success'),
              'epoch'::timestamptz)
        "#,
    )
    .bind(stream_id)
    .bind(window_minutes)
    .fetch_one(pool)
    .await
    .context("count_recent_failures failed")?;
    Ok(n)
}

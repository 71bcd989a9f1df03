use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use sl_schemas::{Filter, StreamOptions, StreamStatus};

#[derive(Debug, Clone)]
pub struct StreamRow {
    pub id: Uuid,
    pub name: String,
    pub status: StreamStatus,
    pub filters: Vec<Filter>,
    pub options: StreamOptions,
    pub webhook_url: String,
    pub webhook_secret: Option<String>,
    pub owner_key_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStream {
    pub name: String,
    pub filters: Vec<Filter>,
    pub options: StreamOptions,
    pub webhook_url: String,
    pub webhook_secret: Option<String>,
    pub owner_key_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct StreamUpdate {
    pub name: Option<String>,
    pub filters: Option<Vec<Filter>>,
    pub options: Option<StreamOptions>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<Option<String>>,
}

const STREAM_COLUMNS: &str = "id, name, status, filters, options, webhook_url, webhook_secret, \
                              owner_key_id, created_at, updated_at";

fn stream_from_row(row: &sqlx::postgres::PgRow) -> Result<StreamRow> {
    let status_str: String = row.try_get("status")?;
    let status = StreamStatus::parse(&status_str)
        .with_context(|| format!("unknown stream status in store: {status_str}"))?;
    let filters: serde_json::Value = row.try_get("filters")?;
    let options: serde_json::Value = row.try_get("options")?;
    Ok(StreamRow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status,
        filters: serde_json::from_value(filters).context("malformed filters in store")?,
        options: serde_json::from_value(options).context("malformed options in store")?,
        webhook_url: row.try_get("webhook_url")?,
        webhook_secret: row.try_get("webhook_secret")?,
        owner_key_id: row.try_get("owner_key_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a stream (status defaults to active) plus its 1:1 metrics row.
pub async fn insert_stream(pool: &PgPool, new: &NewStream) -> Result<StreamRow> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await.context("insert_stream begin failed")?;

    let row = sqlx::query(&format!(
        r#"
        insert into streams (id, name, filters, options, webhook_url, webhook_secret, owner_key_id)
        values ($1, $2, $3, $4, $5, $6, $7)
        returning {STREAM_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&new.name)
    .bind(serde_json::to_value(&new.filters).context("filters serialize failed")?)
    .bind(serde_json::to_value(&new.options).context("options serialize failed")?)
    .bind(&new.webhook_url)
    .bind(&new.webhook_secret)
    .bind(new.owner_key_id)
    .fetch_one(&mut *tx)
    .await
    .context("insert_stream failed")?;

    sqlx::query(
        r#"
        insert into stream_metrics (stream_id)
        values ($1)
        on conflict (stream_id) do nothing
        "#,
    )
    .bind(id)
    .execute(&mut *tx)
    .await
    .context("insert_stream metrics row failed")?;

    tx.commit().await.context("insert_stream commit failed")?;
    stream_from_row(&row)
}

pub async fn fetch_stream(pool: &PgPool, id: Uuid) -> Result<Option<StreamRow>> {
    let row = sqlx::query(&format!(
        r#"
        select {STREAM_COLUMNS}
        from streams
        where id = $1
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("fetch_stream failed")?;

    row.as_ref().map(stream_from_row).transpose()
}

/// List streams, newest first. `owner_keys = None` denotes admin/dev mode
/// (no ownership scoping).
pub async fn list_streams(pool: &PgPool, owner_keys: Option<&[Uuid]>) -> Result<Vec<StreamRow>> {
    let rows = match owner_keys {
        Some(keys) => {
            sqlx::query(&format!(
                r#"
                select {STREAM_COLUMNS}
                from streams
                where owner_key_id = any($1)
                order by created_at desc
                "#
            ))
            .bind(keys)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(&format!(
                r#"
                select {STREAM_COLUMNS}
                from streams
                order by created_at desc
                "#
            ))
            .fetch_all(pool)
            .await
        }
    }
    .context("list_streams failed")?;

    rows.iter().map(stream_from_row).collect()
}

pub async fn update_stream(
    pool: &PgPool,
    id: Uuid,
    update: &StreamUpdate,
) -> Result<Option<StreamRow>> {
    let filters = update
        .filters
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .context("filters serialize failed")?;
    let options = update
        .options
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .context("options serialize failed")?;

    let row = sqlx::query(&format!(
        r#"
        update streams
           set name           = coalesce($2, name),
               filters        = coalesce($3, filters),
               options        = coalesce($4, options),
               webhook_url    = coalesce($5, webhook_url),
               webhook_secret = case when $6 then $7 else webhook_secret end,
               updated_at     = now()
         where id = $1
        returning {STREAM_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&update.name)
    .bind(filters)
    .bind(options)
    .bind(&update.webhook_url)
    .bind(update.webhook_secret.is_some())
    .bind(update.webhook_secret.clone().flatten())
    .fetch_optional(pool)
    .await
    .context("update_stream failed")?;

    row.as_ref().map(stream_from_row).transpose()
}

pub async fn delete_stream(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("delete from streams where id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("delete_stream failed")?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_stream_status(pool: &PgPool, id: Uuid, status: StreamStatus) -> Result<bool> {
    let result = sqlx::query(
        r#"
        update streams
           set status = $2,
               updated_at = now()
         where id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .execute(pool)
    .await
    .context("set_stream_status failed")?;
    Ok(result.rows_affected() > 0)
}

pub async fn rotate_secret(pool: &PgPool, id: Uuid, secret: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        update streams
           set webhook_secret = $2,
               updated_at = now()
         where id = $1
        "#,
    )
    .bind(id)
    .bind(secret)
    .execute(pool)
    .await
    .context("rotate_secret failed")?;
    Ok(result.rows_affected() > 0)
}

/// Bulk pause/resume scoped to an owner's key set (`None` = every stream,
/// admin/dev mode). Only rows currently in `from` move.
pub async fn bulk_transition(
    pool: &PgPool,
    owner_keys: Option<&[Uuid]>,
    from: StreamStatus,
    to: StreamStatus,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        update streams
           set status = $3,
               updated_at = now()
         where ($1::uuid[] is null or owner_key_id = any($1))
           and status = $2
        "#,
    )
    .bind(owner_keys)
    .bind(from.as_str())
    .bind(to.as_str())
    .execute(pool)
    .await
    .context("bulk_transition failed")?;
    Ok(result.rows_affected())
}

pub async fn count_streams(pool: &PgPool, owner_keys: &[Uuid]) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        select count(*)::bigint from streams where owner_key_id = any($1)
        "#,
    )
    .bind(owner_keys)
    .fetch_one(pool)
    .await
    .context("count_streams failed")?;
    Ok(n)
}

/// Stream counts by status for the status endpoint.
pub async fn stream_status_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        select status, count(*)::bigint
        from streams
        group by status
        order by status
        "#,
    )
    .fetch_all(pool)
    .await
    .context("stream_status_counts failed")?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Stream metrics (1:1)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StreamMetricsRow {
    pub stream_id: Uuid,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_triggered_block: Option<i64>,
    pub total_deliveries: i64,
    pub failed_deliveries: i64,
    pub last_error_message: Option<String>,
}

pub async fn fetch_metrics(pool: &PgPool, stream_id: Uuid) -> Result<Option<StreamMetricsRow>> {
    let row = sqlx::query(
        r#"
        select stream_id, last_triggered_at, last_triggered_block,
               total_deliveries, failed_deliveries, last_error_message
        from stream_metrics
        where stream_id = $1
        "#,
    )
    .bind(stream_id)
    .fetch_optional(pool)
    .await
    .context("fetch_metrics failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(StreamMetricsRow {
        stream_id: row.try_get("stream_id")?,
        last_triggered_at: row.try_get("last_triggered_at")?,
        last_triggered_block: row.try_get("last_triggered_block")?,
        total_deliveries: row.try_get("total_deliveries")?,
        failed_deliveries: row.try_get("failed_deliveries")?,
        last_error_message: row.try_get("last_error_message")?,
    }))
}

/// Successful delivery: bump the counter and, for live (non-backfill)
/// traffic, stamp the last-triggered marks.
pub async fn record_delivery_success(
    pool: &PgPool,
    stream_id: Uuid,
    block_height: i64,
    is_backfill: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into stream_metrics (stream_id, total_deliveries, last_triggered_at, last_triggered_block)
        values ($1, 1, case when $3 then null else now() end, case when $3 then null else $2 end)
        on conflict (stream_id) do update
            set total_deliveries     = stream_metrics.total_deliveries + 1,
                last_triggered_at    = case when $3 then stream_metrics.last_triggered_at else now() end,
                last_triggered_block = case when $3 then stream_metrics.last_triggered_block else $2 end
        "#,
    )
    .bind(stream_id)
    .bind(block_height)
    .bind(is_backfill)
    .execute(pool)
    .await
    .context("record_delivery_success failed")?;
    Ok(())
}

pub async fn record_delivery_failure(pool: &PgPool, stream_id: Uuid, error: &str) -> Result<()> {
    sqlx::query(
        r#"
        insert into stream_metrics (stream_id, failed_deliveries, last_error_message)
        values ($1, 1, $2)
        on conflict (stream_id) do update
            set failed_deliveries  = stream_metrics.failed_deliveries + 1,
                last_error_message = $2
        "#,
    )
    .bind(stream_id)
    .bind(error)
    .execute(pool)
    .await
    .context("record_delivery_failure failed")?;
    Ok(())
}

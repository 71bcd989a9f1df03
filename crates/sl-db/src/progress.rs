//! Integrity tracking over canonical block heights: gap windows, contiguous
//! tip, and the per-network progress row that feeds the status endpoint.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Gap {
    pub gap_start: i64,
    pub gap_end: i64,
    pub size: i64,
}

/// Windowed gap analysis: for each adjacent canonical pair (h, next) with
/// next − h > 1, emit [h+1, next−1]. `limit = None` returns every gap.
pub async fn find_gaps(pool: &PgPool, limit: Option<i64>) -> Result<Vec<Gap>> {
    let rows = sqlx::query(
        r#"
        with ordered as (
            select height, lead(height) over (order by height) as next_height
            from blocks
            where canonical
        )
        select height + 1        as gap_start,
               next_height - 1   as gap_end,
               next_height - height - 1 as size
        from ordered
        where next_height - height > 1
        order by gap_start asc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("find_gaps failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(Gap {
            gap_start: row.try_get("gap_start")?,
            gap_end: row.try_get("gap_end")?,
            size: row.try_get("size")?,
        });
    }
    Ok(out)
}

/// Total missing heights: the sum of all gap sizes.
pub async fn count_missing(pool: &PgPool) -> Result<i64> {
    let (n,): (Option<i64>,) = sqlx::query_as(
        r#"
        with ordered as (
            select height, lead(height) over (order by height) as next_height
            from blocks
            where canonical
        )
        select sum(next_height - height - 1)::bigint
        from ordered
        where next_height - height > 1
        "#,
    )
    .fetch_one(pool)
    .await
    .context("count_missing failed")?;
    Ok(n.unwrap_or(0))
}

/// Largest height h >= from_height such that every height in
/// [from_height, h] is canonical. When from_height itself is missing the
/// tip cannot advance and from_height is returned.
pub async fn contiguous_tip(pool: &PgPool, from_height: i64) -> Result<i64> {
    let (min_height,): (Option<i64>,) = sqlx::query_as(
        r#"
        select min(height)
        from blocks
        where canonical and height >= $1
        "#,
    )
    .bind(from_height)
    .fetch_one(pool)
    .await
    .context("contiguous_tip min failed")?;

    if min_height != Some(from_height) {
        return Ok(from_height);
    }

    let (tip,): (Option<i64>,) = sqlx::query_as(
        r#"
        with run as (
            select height, lead(height) over (order by height) as next_height
            from blocks
            where canonical and height >= $1
        )
        select min(height)
        from run
        where next_height is null or next_height > height + 1
        "#,
    )
    .bind(from_height)
    .fetch_one(pool)
    .await
    .context("contiguous_tip run failed")?;

    Ok(tip.unwrap_or(from_height))
}

/// Recompute the network's progress row from the blocks table: the highest
/// canonical height, and the contiguous tip measured from the lowest one.
/// A no-op while the chain store is empty.
pub async fn refresh_progress(pool: &PgPool, network: &str) -> Result<()> {
    let (bounds,): (Option<serde_json::Value>,) = sqlx::query_as(
        r#"
        select case when count(*) = 0 then null
                    else json_build_object('min', min(height), 'max', max(height))
               end
        from blocks
        where canonical
        "#,
    )
    .fetch_one(pool)
    .await
    .context("refresh_progress bounds failed")?;

    let Some(bounds) = bounds else { return Ok(()) };
    let min = bounds["min"].as_i64().unwrap_or(0);
    let max = bounds["max"].as_i64().unwrap_or(0);

    let tip = contiguous_tip(pool, min).await?;
    record_progress(pool, network, max, tip, max).await
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexProgressRow {
    pub network: String,
    pub last_indexed_height: i64,
    pub last_contiguous_height: i64,
    pub highest_seen_height: i64,
    pub updated_at: DateTime<Utc>,
}

pub async fn record_progress(
    pool: &PgPool,
    network: &str,
    last_indexed: i64,
    last_contiguous: i64,
    highest_seen: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into index_progress
            (network, last_indexed_height, last_contiguous_height, highest_seen_height, updated_at)
        values ($1, $2, $3, $4, now())
        on conflict (network) do update
            set last_indexed_height    = excluded.last_indexed_height,
                last_contiguous_height = excluded.last_contiguous_height,
                highest_seen_height    = greatest(index_progress.highest_seen_height,
                                                  excluded.highest_seen_height),
                updated_at             = excluded.updated_at
        "#,
    )
    .bind(network)
    .bind(last_indexed)
    .bind(last_contiguous)
    .bind(highest_seen)
    .execute(pool)
    .await
    .context("record_progress failed")?;
    Ok(())
}

pub async fn fetch_progress(pool: &PgPool, network: &str) -> Result<Option<IndexProgressRow>> {
    let row = sqlx::query(
        r#"
        select network, last_indexed_height, last_contiguous_height,
               highest_seen_height, updated_at
        from index_progress
        where network = $1
        "#,
    )
    .bind(network)
    .fetch_optional(pool)
    .await
    .context("fetch_progress failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(IndexProgressRow {
        network: row.try_get("network")?,
        last_indexed_height: row.try_get("last_indexed_height")?,
        last_contiguous_height: row.try_get("last_contiguous_height")?,
        highest_seen_height: row.try_get("highest_seen_height")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

pub async fn list_progress(pool: &PgPool) -> Result<Vec<IndexProgressRow>> {
    let rows = sqlx::query(
        r#"
        select network, last_indexed_height, last_contiguous_height,
               highest_seen_height, updated_at
        from index_progress
        order by network asc
        "#,
    )
    .fetch_all(pool)
    .await
    .context("list_progress failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(IndexProgressRow {
            network: row.try_get("network")?,
            last_indexed_height: row.try_get("last_indexed_height")?,
            last_contiguous_height: row.try_get("last_contiguous_height")?,
            highest_seen_height: row.try_get("highest_seen_height")?,
            updated_at: row.try_get("updated_at")?,
        });
    }
    Ok(out)
}

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Current usage across every plan dimension. Counters are daily/monthly
/// aggregates; storage is the most recent snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct UsageSummary {
    pub api_requests_today: i64,
    pub deliveries_this_month: i64,
    pub storage_bytes: i64,
    pub streams: i64,
    pub views: i64,
}

pub async fn increment_api_requests(pool: &PgPool, account_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        insert into usage_daily (account_id, date, api_requests)
        values ($1, current_date, 1)
        on conflict (account_id, date) do update
            set api_requests = usage_daily.api_requests + 1
        "#,
    )
    .bind(account_id)
    .execute(pool)
    .await
    .context("increment_api_requests failed")?;
    Ok(())
}

pub async fn increment_deliveries(pool: &PgPool, account_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        insert into usage_daily (account_id, date, deliveries)
        values ($1, current_date, 1)
        on conflict (account_id, date) do update
            set deliveries = usage_daily.deliveries + 1
        "#,
    )
    .bind(account_id)
    .execute(pool)
    .await
    .context("increment_deliveries failed")?;
    Ok(())
}

pub async fn record_storage_snapshot(
    pool: &PgPool,
    account_id: Uuid,
    storage_bytes: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into usage_snapshots (account_id, storage_bytes)
        values ($1, $2)
        "#,
    )
    .bind(account_id)
    .bind(storage_bytes)
    .execute(pool)
    .await
    .context("record_storage_snapshot failed")?;
    Ok(())
}

/// Compute the account's usage across all plan dimensions. `owner_keys` is
/// the account's key set (streams/views are owned through keys).
pub async fn usage_summary(
    pool: &PgPool,
    account_id: Uuid,
    owner_keys: &[Uuid],
) -> Result<UsageSummary> {
    let row = sqlx::query(
        r#"
        select
          coalesce((select api_requests
                    from usage_daily
                    where account_id = $1 and date = current_date), 0) as api_requests_today,
          coalesce((select sum(deliveries)
                    from usage_daily
                    where account_id = $1
                      and date >= date_trunc('month', current_date)::date), 0)::bigint
                                                                        as deliveries_this_month,
          coalesce((select storage_bytes
                    from usage_snapshots
                    where account_id = $1
                    order by measured_at desc
                    limit 1), 0)                                        as storage_bytes,
          (select count(*)::bigint from streams where owner_key_id = any($2)) as streams,
          (select count(*)::bigint from views   where owner_key_id = any($2)) as views
        "#,
    )
    .bind(account_id)
    .bind(owner_keys)
    .fetch_one(pool)
    .await
    .context("usage_summary failed")?;

    Ok(UsageSummary {
        api_requests_today: row.try_get("api_requests_today")?,
        deliveries_this_month: row.try_get("deliveries_this_month")?,
        storage_bytes: row.try_get("storage_bytes")?,
        streams: row.try_get("streams")?,
        views: row.try_get("views")?,
    })
}

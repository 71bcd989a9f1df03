use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

pub mod chain;
pub mod deliveries;
pub mod jobs;
pub mod progress;
pub mod streams;
pub mod usage;

pub const ENV_DB_URL: &str = "DATABASE_URL";

/// Notification channel for new jobs; payload is the stream id when known.
pub const CHANNEL_NEW_JOB: &str = "streams:new_job";
/// Notification channel for view registry changes; payload is the view name.
pub const CHANNEL_VIEW_CHANGES: &str = "view_changes";

/// Connect to Postgres using DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Test helper used by integration tests:
/// - Connect using DATABASE_URL
/// - Ensure migrations are applied
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='jobs'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_jobs_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_jobs_table: bool,
}

/// Resolve the account that owns an API key. `None` means the key id is
/// unknown (the caller surfaces AUTHENTICATION_ERROR).
pub async fn account_for_key(pool: &PgPool, key_id: Uuid) -> Result<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        select account_id
        from api_keys
        where key_id = $1
        "#,
    )
    .bind(key_id)
    .fetch_optional(pool)
    .await
    .context("account_for_key failed")?;
    Ok(row.map(|(id,)| id))
}

/// All key ids belonging to an account. Ownership checks filter by
/// membership in this set so streams survive key rotation.
pub async fn account_key_ids(pool: &PgPool, account_id: Uuid) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        select key_id
        from api_keys
        where account_id = $1
        order by created_at asc
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
    .context("account_key_ids failed")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Register an API key for an account (idempotent; testkit and provisioning
/// path).
pub async fn insert_api_key(pool: &PgPool, key_id: Uuid, account_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        insert into api_keys (key_id, account_id)
        values ($1, $2)
        on conflict (key_id) do nothing
        "#,
    )
    .bind(key_id)
    .bind(account_id)
    .execute(pool)
    .await
    .context("insert_api_key failed")?;
    Ok(())
}

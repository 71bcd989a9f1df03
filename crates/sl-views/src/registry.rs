use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::definition::{is_safe_identifier, schema_hash, ViewDefinition};
use sl_db::CHANNEL_VIEW_CHANGES;

#[derive(Debug, Clone)]
pub struct ViewRow {
    pub id: Uuid,
    pub name: String,
    pub version: i32,
    pub status: String,
    pub definition: ViewDefinition,
    pub schema_hash: String,
    pub schema_name: String,
    pub last_processed_height: Option<i64>,
    pub total_processed: i64,
    pub total_errors: i64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub owner_key_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const VIEW_COLUMNS: &str = "id, name, version, status, definition, schema_hash, schema_name, \
                            last_processed_height, total_processed, total_errors, last_error, \
                            last_error_at, owner_key_id, created_at, updated_at";

pub(crate) fn view_from_row(row: &sqlx::postgres::PgRow) -> Result<ViewRow> {
    let definition: serde_json::Value = row.try_get("definition")?;
    Ok(ViewRow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        version: row.try_get("version")?,
        status: row.try_get("status")?,
        definition: serde_json::from_value(definition).context("malformed view definition")?,
        schema_hash: row.try_get("schema_hash")?,
        schema_name: row.try_get("schema_name")?,
        last_processed_height: row.try_get("last_processed_height")?,
        total_processed: row.try_get("total_processed")?,
        total_errors: row.try_get("total_errors")?,
        last_error: row.try_get("last_error")?,
        last_error_at: row.try_get("last_error_at")?,
        owner_key_id: row.try_get("owner_key_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Tenant-prefixed physical schema: the first 8 hex of the owner key keeps
/// different tenants' same-named views apart.
pub fn schema_name_for(owner_key_id: Uuid, view_name: &str) -> String {
    let key_hex = owner_key_id.simple().to_string();
    format!("v_{}_{view_name}", &key_hex[..8])
}

/// Deploy (create or update) a view. The definition must already have
/// passed `validate_definition`. Re-deploying an identical definition is a
/// no-op returning the stored row.
pub async fn deploy(
    pool: &PgPool,
    owner_key_id: Uuid,
    name: &str,
    definition: &ViewDefinition,
) -> Result<ViewRow> {
    debug_assert!(is_safe_identifier(name));
    let hash = schema_hash(definition);

    if let Some(existing) = fetch_view(pool, name, Some(&[owner_key_id])).await? {
        if existing.schema_hash == hash {
            return Ok(existing);
        }
    }

    let schema_name = schema_name_for(owner_key_id, name);
    let mut tx = pool.begin().await.context("deploy begin failed")?;

    apply_ddl(&mut tx, &schema_name, definition).await?;

    let row = sqlx::query(&format!(
        r#"
        insert into views (id, name, definition, schema_hash, schema_name, owner_key_id)
        values ($1, $2, $3, $4, $5, $6)
        on conflict (name, owner_key_id) do update
            set definition  = excluded.definition,
                schema_hash = excluded.schema_hash,
                version     = views.version + 1,
                updated_at  = now()
        returning {VIEW_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(serde_json::to_value(definition).context("definition serialize failed")?)
    .bind(&hash)
    .bind(&schema_name)
    .bind(owner_key_id)
    .fetch_one(&mut *tx)
    .await
    .context("deploy upsert failed")?;

    sqlx::query("select pg_notify($1, $2)")
        .bind(CHANNEL_VIEW_CHANGES)
        .bind(name)
        .execute(&mut *tx)
        .await
        .context("deploy notify failed")?;

    tx.commit().await.context("deploy commit failed")?;
    let view = view_from_row(&row)?;
    info!(view = name, schema = %schema_name, version = view.version, "view deployed");
    Ok(view)
}

/// DDL for one view schema. Every identifier has passed validation; types
/// come from the allowlist.
async fn apply_ddl(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    schema_name: &str,
    definition: &ViewDefinition,
) -> Result<()> {
    sqlx::query(&format!(r#"create schema if not exists "{schema_name}""#))
        .execute(&mut **tx)
        .await
        .context("create schema failed")?;

    for (table, def) in &definition.tables {
        let mut columns: Vec<String> = vec![
            "_id bigserial primary key".to_string(),
            "_block_height bigint not null".to_string(),
            "_tx_id text not null".to_string(),
            "_event_index integer not null default 0".to_string(),
            "_created_at timestamptz not null default now()".to_string(),
        ];
        for (name, ty) in &def.columns {
            columns.push(format!(r#""{name}" {}"#, ty.as_sql()));
        }
        columns.push(r#"unique ("_block_height", "_tx_id", "_event_index")"#.to_string());

        sqlx::query(&format!(
            r#"create table if not exists "{schema_name}"."{table}" ({})"#,
            columns.join(", ")
        ))
        .execute(&mut **tx)
        .await
        .with_context(|| format!("create table {table} failed"))?;

        for (i, index) in def.indexes.iter().enumerate() {
            let cols: Vec<String> = index.iter().map(|c| format!(r#""{c}""#)).collect();
            sqlx::query(&format!(
                r#"create index if not exists "idx_{table}_{i}" on "{schema_name}"."{table}" ({})"#,
                cols.join(", ")
            ))
            .execute(&mut **tx)
            .await
            .with_context(|| format!("create index on {table} failed"))?;
        }
    }

    Ok(())
}

/// Drop the physical schema (cascading all tables), delete the registry row,
/// publish the change notification.
pub async fn delete_view(pool: &PgPool, view: &ViewRow) -> Result<()> {
    let mut tx = pool.begin().await.context("delete begin failed")?;

    sqlx::query(&format!(
        r#"drop schema if exists "{}" cascade"#,
        view.schema_name
    ))
    .execute(&mut *tx)
    .await
    .context("drop schema failed")?;

    sqlx::query("delete from views where id = $1")
        .bind(view.id)
        .execute(&mut *tx)
        .await
        .context("delete view row failed")?;

    sqlx::query("select pg_notify($1, $2)")
        .bind(CHANNEL_VIEW_CHANGES)
        .bind(&view.name)
        .execute(&mut *tx)
        .await
        .context("delete notify failed")?;

    tx.commit().await.context("delete commit failed")?;
    info!(view = %view.name, schema = %view.schema_name, "view deleted");
    Ok(())
}

/// Fetch a view by name, scoped to the caller's key set. `None` keys denotes
/// admin/dev mode.
pub async fn fetch_view(
    pool: &PgPool,
    name: &str,
    owner_keys: Option<&[Uuid]>,
) -> Result<Option<ViewRow>> {
    let row = match owner_keys {
        Some(keys) => {
            sqlx::query(&format!(
                r#"
                select {VIEW_COLUMNS}
                from views
                where name = $1 and owner_key_id = any($2)
                "#
            ))
            .bind(name)
            .bind(keys)
            .fetch_optional(pool)
            .await
        }
        None => {
            sqlx::query(&format!(
                r#"
                select {VIEW_COLUMNS}
                from views
                where name = $1
                "#
            ))
            .bind(name)
            .fetch_optional(pool)
            .await
        }
    }
    .context("fetch_view failed")?;

    row.as_ref().map(view_from_row).transpose()
}

pub async fn list_views(pool: &PgPool, owner_keys: Option<&[Uuid]>) -> Result<Vec<ViewRow>> {
    let rows = match owner_keys {
        Some(keys) => {
            sqlx::query(&format!(
                r#"
                select {VIEW_COLUMNS}
                from views
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
                select {VIEW_COLUMNS}
                from views
                order by created_at desc
                "#
            ))
            .fetch_all(pool)
            .await
        }
    }
    .context("list_views failed")?;

    rows.iter().map(view_from_row).collect()
}

/// Record one processed block against the view's health counters.
pub async fn record_block_processed(pool: &PgPool, view_id: Uuid, height: i64) -> Result<()> {
    sqlx::query(
        r#"
        update views
           set last_processed_height = greatest(coalesce(last_processed_height, 0), $2),
               total_processed       = total_processed + 1,
               updated_at            = now()
         where id = $1
        "#,
    )
    .bind(view_id)
    .bind(height)
    .execute(pool)
    .await
    .context("record_block_processed failed")?;
    Ok(())
}

pub async fn record_block_error(pool: &PgPool, view_id: Uuid, error: &str) -> Result<()> {
    sqlx::query(
        r#"
        update views
           set total_errors  = total_errors + 1,
               last_error    = $2,
               last_error_at = now(),
               updated_at    = now()
         where id = $1
        "#,
    )
    .bind(view_id)
    .bind(error)
    .execute(pool)
    .await
    .context("record_block_error failed")?;
    Ok(())
}

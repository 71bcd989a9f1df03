use anyhow::{Context, Result};
use sqlx::{PgPool, Row};

use sl_schemas::{Block, Event, EventPayload, Transaction, TxType};

/// Upsert a block row keyed by (height, hash). Reorg resolution flips
/// `canonical` via `set_canonical`, it never rewrites rows.
pub async fn insert_block(pool: &PgPool, block: &Block) -> Result<()> {
    sqlx::query(
        r#"
        insert into blocks (height, hash, parent_hash, burn_height, timestamp, canonical)
        values ($1, $2, $3, $4, $5, $6)
        on conflict (height, hash) do update
            set canonical = excluded.canonical
        "#,
    )
    .bind(block.height)
    .bind(&block.hash)
    .bind(&block.parent_hash)
    .bind(block.burn_height)
    .bind(block.timestamp)
    .bind(block.canonical)
    .execute(pool)
    .await
    .context("insert_block failed")?;
    Ok(())
}

pub async fn set_canonical(pool: &PgPool, height: i64, hash: &str, canonical: bool) -> Result<()> {
    sqlx::query(
        r#"
        update blocks
           set canonical = $3
         where height = $1 and hash = $2
        "#,
    )
    .bind(height)
    .bind(hash)
    .bind(canonical)
    .execute(pool)
    .await
    .context("set_canonical failed")?;
    Ok(())
}

pub async fn fetch_canonical_block(pool: &PgPool, height: i64) -> Result<Option<Block>> {
    let row = sqlx::query(
        r#"
        select height, hash, parent_hash, burn_height, timestamp, canonical
        from blocks
        where height = $1 and canonical
        "#,
    )
    .bind(height)
    .fetch_optional(pool)
    .await
    .context("fetch_canonical_block failed")?;

    let Some(row) = row else { return Ok(None) };

    Ok(Some(Block {
        height: row.try_get("height")?,
        hash: row.try_get("hash")?,
        parent_hash: row.try_get("parent_hash")?,
        burn_height: row.try_get("burn_height")?,
        timestamp: row.try_get("timestamp")?,
        canonical: row.try_get("canonical")?,
    }))
}

/// Canonical heights inside [from, to], ascending. Replay uses this to skip
/// holes instead of enqueueing jobs that can never run.
pub async fn canonical_heights_in_range(pool: &PgPool, from: i64, to: i64) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        select height
        from blocks
        where canonical and height between $1 and $2
        order by height asc
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .context("canonical_heights_in_range failed")?;
    Ok(rows.into_iter().map(|(h,)| h).collect())
}

pub async fn insert_transaction(pool: &PgPool, tx: &Transaction) -> Result<()> {
    sqlx::query(
        r#"
        insert into transactions (
          tx_id, block_height, tx_index, type, sender, status, contract_id, function_name, raw_tx
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        on conflict (tx_id) do nothing
        "#,
    )
    .bind(&tx.tx_id)
    .bind(tx.block_height)
    .bind(tx.tx_index)
    .bind(tx.kind.as_str())
    .bind(&tx.sender)
    .bind(&tx.status)
    .bind(&tx.contract_id)
    .bind(&tx.function_name)
    .bind(&tx.raw_tx)
    .execute(pool)
    .await
    .context("insert_transaction failed")?;
    Ok(())
}

/// Insert an event; dedup on (tx_id, event_index). Returns the surrogate id,
/// or the existing one when the indexer re-delivers.
pub async fn insert_event(
    pool: &PgPool,
    tx_id: &str,
    block_height: i64,
    event_index: i32,
    payload: &EventPayload,
) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        insert into events (tx_id, block_height, event_index, type, data)
        values ($1, $2, $3, $4, $5)
        on conflict (tx_id, event_index) do nothing
        returning id
        "#,
    )
    .bind(tx_id)
    .bind(block_height)
    .bind(event_index)
    .bind(payload.kind().as_str())
    .bind(payload.data_json())
    .fetch_optional(pool)
    .await
    .context("insert_event failed")?;

    if let Some((id,)) = row {
        return Ok(id);
    }

    let (id,): (i64,) = sqlx::query_as(
        r#"
        select id from events where tx_id = $1 and event_index = $2
        "#,
    )
    .bind(tx_id)
    .bind(event_index)
    .fetch_one(pool)
    .await
    .context("insert_event readback failed")?;
    Ok(id)
}

pub async fn transactions_for_height(pool: &PgPool, height: i64) -> Result<Vec<Transaction>> {
    let rows = sqlx::query(
        r#"
        select tx_id, block_height, tx_index, type, sender, status,
               contract_id, function_name, raw_tx
        from transactions
        where block_height = $1
        order by tx_index asc, tx_id asc
        "#,
    )
    .bind(height)
    .fetch_all(pool)
    .await
    .context("transactions_for_height failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let kind_str: String = row.try_get("type")?;
        let kind = TxType::parse(&kind_str)
            .with_context(|| format!("unknown transaction type in store: {kind_str}"))?;
        out.push(Transaction {
            tx_id: row.try_get("tx_id")?,
            block_height: row.try_get("block_height")?,
            tx_index: row.try_get("tx_index")?,
            kind,
            sender: row.try_get("sender")?,
            status: row.try_get("status")?,
            contract_id: row.try_get("contract_id")?,
            function_name: row.try_get("function_name")?,
            raw_tx: row.try_get("raw_tx")?,
        });
    }
    Ok(out)
}

pub async fn events_for_height(pool: &PgPool, height: i64) -> Result<Vec<Event>> {
    let rows = sqlx::query(
        r#"
        select id, tx_id, block_height, event_index, type, data
        from events
        where block_height = $1
        order by event_index asc, id asc
        "#,
    )
    .bind(height)
    .fetch_all(pool)
    .await
    .context("events_for_height failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let type_str: String = row.try_get("type")?;
        let data: serde_json::Value = row.try_get("data")?;
        let payload = EventPayload::from_parts(&type_str, data)
            .with_context(|| format!("malformed event payload of type {type_str}"))?;
        out.push(Event {
            id: row.try_get("id")?,
            tx_id: row.try_get("tx_id")?,
            block_height: row.try_get("block_height")?,
            event_index: row.try_get("event_index")?,
            payload,
        });
    }
    Ok(out)
}

//! Interpretation of handler rules: matched transactions/events become
//! upserted rows in the view's tables. Upserts key on
//! (_block_height, _tx_id, _event_index), so re-running a block is safe.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::definition::{FieldSelector, HandlerSource, TxField};
use crate::registry::{record_block_error, record_block_processed, ViewRow};
use sl_schemas::{Block, Event, Transaction};

/// Run every handler rule of `view` over one block's data. Returns the
/// number of rows written.
pub async fn apply_block(
    pool: &PgPool,
    view: &ViewRow,
    block: &Block,
    txs: &[Transaction],
    events: &[Event],
) -> Result<u64> {
    let mut rows_written = 0u64;

    for rule in &view.definition.handlers {
        let Some(table) = view.definition.tables.get(&rule.table) else {
            // Validated at deploy; a stale row is a registry bug, not fatal.
            warn!(view = %view.name, table = %rule.table, "handler targets missing table");
            continue;
        };

        let matches = sl_matcher::evaluate(std::slice::from_ref(&rule.when), txs, events);

        match rule.source {
            HandlerSource::Transactions => {
                for tx in &matches.transactions {
                    upsert_row(pool, view, rule, table, block, &tx.tx_id, 0, |selector| {
                        select_from_tx(selector, tx)
                    })
                    .await?;
                    rows_written += 1;
                }
            }
            HandlerSource::Events => {
                for ev in &matches.events {
                    let data = ev.payload.data_json();
                    upsert_row(
                        pool,
                        view,
                        rule,
                        table,
                        block,
                        &ev.tx_id,
                        ev.event_index,
                        |selector| select_from_event(selector, &data),
                    )
                    .await?;
                    rows_written += 1;
                }
            }
        }
    }

    Ok(rows_written)
}

#[allow(clippy::too_many_arguments)]
async fn upsert_row<F>(
    pool: &PgPool,
    view: &ViewRow,
    rule: &crate::definition::HandlerRule,
    table: &crate::definition::TableDef,
    block: &Block,
    tx_id: &str,
    event_index: i32,
    select: F,
) -> Result<()>
where
    F: Fn(&FieldSelector) -> Value,
{
    // Deterministic column order from the rule's BTreeMap.
    let mut names = Vec::with_capacity(rule.columns.len());
    let mut placeholders = Vec::with_capacity(rule.columns.len());
    let mut values: Vec<Option<String>> = Vec::with_capacity(rule.columns.len());

    for (column, selector) in &rule.columns {
        let Some(ty) = table.columns.get(column) else {
            continue;
        };
        names.push(format!(r#""{column}""#));
        values.push(value_to_text(&select(selector)));
        // $1..$3 are the system key; user values start at $4.
        placeholders.push(format!("${}{}", values.len() + 3, ty.bind_cast()));
    }

    let updates: Vec<String> = names
        .iter()
        .map(|n| format!("{n} = excluded.{n}"))
        .collect();
    let conflict_action = if updates.is_empty() {
        "nothing".to_string()
    } else {
        format!("update set {}", updates.join(", "))
    };

    let sql = format!(
        r#"
        insert into "{schema}"."{table}" ("_block_height", "_tx_id", "_event_index"{sep}{names})
        values ($1, $2, $3{sep}{placeholders})
        on conflict ("_block_height", "_tx_id", "_event_index") do {conflict_action}
        "#,
        schema = view.schema_name,
        table = rule.table,
        sep = if names.is_empty() { "" } else { ", " },
        names = names.join(", "),
        placeholders = placeholders.join(", "),
    );

    let mut query = sqlx::query(&sql).bind(block.height).bind(tx_id).bind(event_index);
    for value in &values {
        query = query.bind(value);
    }
    query
        .execute(pool)
        .await
        .with_context(|| format!("view {} upsert into {} failed", view.name, rule.table))?;
    Ok(())
}

fn select_from_tx(selector: &FieldSelector, tx: &Transaction) -> Value {
    match selector {
        FieldSelector::Tx { field } => match field {
            TxField::TxId => Value::String(tx.tx_id.clone()),
            TxField::Sender => Value::String(tx.sender.clone()),
            TxField::Status => Value::String(tx.status.clone()),
            TxField::ContractId => tx
                .contract_id
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            TxField::FunctionName => tx
                .function_name
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        },
        FieldSelector::Event { .. } => Value::Null,
        FieldSelector::Literal { value } => value.clone(),
    }
}

fn select_from_event(selector: &FieldSelector, data: &Value) -> Value {
    match selector {
        FieldSelector::Event { path } => {
            let pointer = format!("/{}", path.replace('.', "/"));
            data.pointer(&pointer).cloned().unwrap_or(Value::Null)
        }
        FieldSelector::Tx { .. } => Value::Null,
        FieldSelector::Literal { value } => value.clone(),
    }
}

/// Text form bound with a `::type` cast. NULL for JSON null; objects and
/// arrays keep their compact JSON form (jsonb columns).
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ReindexSummary {
    pub blocks_processed: u64,
    pub rows_written: u64,
    pub errors: u64,
}

/// Re-run the view's handlers over a canonical block range, updating the
/// view's health counters as it goes. Per-block errors are recorded and do
/// not stop the pass.
pub async fn reindex(pool: &PgPool, view: &ViewRow, from: i64, to: i64) -> Result<ReindexSummary> {
    let heights = sl_db::chain::canonical_heights_in_range(pool, from, to).await?;
    let mut summary = ReindexSummary::default();

    for height in heights {
        let Some(block) = sl_db::chain::fetch_canonical_block(pool, height).await? else {
            continue;
        };
        let txs = sl_db::chain::transactions_for_height(pool, height).await?;
        let events = sl_db::chain::events_for_height(pool, height).await?;

        match apply_block(pool, view, &block, &txs, &events).await {
            Ok(rows) => {
                summary.blocks_processed += 1;
                summary.rows_written += rows;
                record_block_processed(pool, view.id, height).await?;
            }
            Err(e) => {
                summary.errors += 1;
                warn!(view = %view.name, height, error = %e, "reindex block failed");
                record_block_error(pool, view.id, &e.to_string()).await?;
            }
        }
    }

    debug!(
        view = %view.name,
        blocks = summary.blocks_processed,
        rows = summary.rows_written,
        errors = summary.errors,
        "reindex pass finished"
    );
    Ok(summary)
}

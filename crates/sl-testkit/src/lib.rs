//! Shared fixtures for DB-backed scenario tests: canonical chain data,
//! accounts/keys, and streams. Everything is deterministic given the inputs;
//! names embed a random uuid so concurrent test runs do not collide.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use sl_schemas::{Block, Event, EventPayload, Filter, StreamOptions, Transaction, TxType};

pub use sl_db::testkit_db_pool;

/// Canonical block at `height` with deterministic hashes.
pub fn block_fixture(height: i64) -> Block {
    Block {
        height,
        hash: format!("0xblock{height}"),
        parent_hash: format!("0xblock{}", height - 1),
        burn_height: height + 90_000,
        timestamp: Utc.timestamp_opt(1_700_000_000 + height, 0).unwrap(),
        canonical: true,
    }
}

pub fn contract_call_fixture(
    tx_id: &str,
    height: i64,
    tx_index: i32,
    contract_id: &str,
    function_name: &str,
    sender: &str,
) -> Transaction {
    Transaction {
        tx_id: tx_id.to_string(),
        block_height: height,
        tx_index,
        kind: TxType::ContractCall,
        sender: sender.to_string(),
        status: "success".to_string(),
        contract_id: Some(contract_id.to_string()),
        function_name: Some(function_name.to_string()),
        raw_tx: format!("00raw{tx_id}"),
    }
}

pub fn token_transfer_fixture(tx_id: &str, height: i64, tx_index: i32, sender: &str) -> Transaction {
    Transaction {
        tx_id: tx_id.to_string(),
        block_height: height,
        tx_index,
        kind: TxType::TokenTransfer,
        sender: sender.to_string(),
        status: "success".to_string(),
        contract_id: None,
        function_name: None,
        raw_tx: format!("00raw{tx_id}"),
    }
}

pub fn stx_transfer_payload(sender: &str, recipient: &str, amount: &str) -> EventPayload {
    EventPayload::StxTransfer {
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        amount: amount.to_string(),
        memo: None,
    }
}

/// Seed a canonical block plus its transactions and events.
pub async fn seed_block(
    pool: &PgPool,
    height: i64,
    txs: &[Transaction],
    events: &[(&str, i32, EventPayload)],
) -> Result<Vec<Event>> {
    sl_db::chain::insert_block(pool, &block_fixture(height)).await?;
    for tx in txs {
        sl_db::chain::insert_transaction(pool, tx).await?;
    }

    let mut out = Vec::with_capacity(events.len());
    for (tx_id, event_index, payload) in events {
        let id = sl_db::chain::insert_event(pool, tx_id, height, *event_index, payload).await?;
        out.push(Event {
            id,
            tx_id: tx_id.to_string(),
            block_height: height,
            event_index: *event_index,
            payload: payload.clone(),
        });
    }
    Ok(out)
}

/// Fresh account with one API key registered.
pub async fn seed_account(pool: &PgPool) -> Result<(Uuid, Uuid)> {
    let account_id = Uuid::new_v4();
    let key_id = Uuid::new_v4();
    sl_db::insert_api_key(pool, key_id, account_id).await?;
    Ok((account_id, key_id))
}

/// Create an active stream with the given filters pointing at `webhook_url`.
pub async fn make_stream(
    pool: &PgPool,
    owner_key_id: Uuid,
    filters: Vec<Filter>,
    webhook_url: &str,
    webhook_secret: Option<&str>,
) -> Result<sl_db::streams::StreamRow> {
    let new = sl_db::streams::NewStream {
        name: format!("test-stream-{}", Uuid::new_v4()),
        filters,
        options: StreamOptions::default(),
        webhook_url: webhook_url.to_string(),
        webhook_secret: webhook_secret.map(str::to_string),
        owner_key_id,
    };
    sl_db::streams::insert_stream(pool, &new).await
}

/// A contract-call filter on one contract id; the most common fixture.
pub fn contract_call_filter(contract_id: &str) -> Filter {
    Filter::ContractCall {
        contract_id: Some(contract_id.to_string()),
        function_name: None,
        caller: None,
    }
}

//! Pure filter evaluation: (filters, transactions, events) → deduplicated
//! match sets. No I/O and no clock; everything here is deterministic.
//!
//! Filters in a stream are OR-combined. Within a variant, every present
//! field must hold. Amount comparisons parse the decimal strings carried in
//! event payloads as u128 so 128-bit chain amounts keep full precision; a
//! missing or malformed amount compares as zero.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;

use sl_schemas::{Event, EventPayload, Filter, Transaction, TxType};

#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub transactions: Vec<Transaction>,
    pub events: Vec<Event>,
    pub any_match: bool,
}

/// Evaluate a stream's filter list against one block's transactions and
/// events. Order within each list is first-filter-first-match; a
/// transaction appears at most once by tx id, an event at most once by
/// event id.
pub fn evaluate(filters: &[Filter], txs: &[Transaction], events: &[Event]) -> MatchResult {
    let mut result = MatchResult::default();
    let mut seen_txs: HashSet<&str> = HashSet::new();
    let mut seen_events: HashSet<i64> = HashSet::new();

    for filter in filters {
        for tx in txs {
            if tx_matches(filter, tx) && seen_txs.insert(tx.tx_id.as_str()) {
                result.transactions.push(tx.clone());
            }
        }
        for ev in events {
            if event_matches(filter, ev) && seen_events.insert(ev.id) {
                result.events.push(ev.clone());
            }
        }
    }

    result.any_match = !result.transactions.is_empty() || !result.events.is_empty();
    result
}

fn tx_matches(filter: &Filter, tx: &Transaction) -> bool {
    match filter {
        Filter::ContractCall {
            contract_id,
            function_name,
            caller,
        } => {
            tx.kind == TxType::ContractCall
                && opt_eq(contract_id, tx.contract_id.as_deref())
                && opt_glob(function_name, tx.function_name.as_deref())
                && opt_eq_str(caller, &tx.sender)
        }
        Filter::ContractDeploy {
            deployer,
            contract_name,
        } => {
            // The deployed name is the component after the dot in the
            // contract id ("SP....my-contract").
            let name = tx
                .contract_id
                .as_deref()
                .and_then(|id| id.split_once('.'))
                .map(|(_, name)| name);
            tx.kind == TxType::SmartContract
                && opt_eq_str(deployer, &tx.sender)
                && opt_glob(contract_name, name)
        }
        _ => false,
    }
}

fn event_matches(filter: &Filter, ev: &Event) -> bool {
    match (filter, &ev.payload) {
        (
            Filter::StxTransfer {
                sender,
                recipient,
                min_amount,
                max_amount,
            },
            EventPayload::StxTransfer {
                sender: ev_sender,
                recipient: ev_recipient,
                amount,
                ..
            },
        ) => {
            opt_eq_str(sender, ev_sender)
                && opt_eq_str(recipient, ev_recipient)
                && min_ok(min_amount, amount)
                && max_ok(max_amount, amount)
        }
        (
            Filter::StxMint {
                recipient,
                min_amount,
            },
            EventPayload::StxMint {
                recipient: ev_recipient,
                amount,
            },
        ) => opt_eq_str(recipient, ev_recipient) && min_ok(min_amount, amount),
        (
            Filter::StxBurn { sender, min_amount },
            EventPayload::StxBurn {
                sender: ev_sender,
                amount,
            },
        ) => opt_eq_str(sender, ev_sender) && min_ok(min_amount, amount),
        (
            Filter::StxLock {
                locked_address,
                min_amount,
            },
            EventPayload::StxLock {
                locked_address: ev_address,
                locked_amount,
                ..
            },
        ) => opt_eq_str(locked_address, ev_address) && min_ok(min_amount, locked_amount),
        (
            Filter::FtTransfer {
                asset_identifier,
                sender,
                recipient,
                min_amount,
            },
            EventPayload::FtTransfer {
                asset_identifier: ev_asset,
                sender: ev_sender,
                recipient: ev_recipient,
                amount,
            },
        ) => {
            opt_eq_str(asset_identifier, ev_asset)
                && opt_eq_str(sender, ev_sender)
                && opt_eq_str(recipient, ev_recipient)
                && min_ok(min_amount, amount)
        }
        (
            Filter::FtMint {
                asset_identifier,
                recipient,
                min_amount,
            },
            EventPayload::FtMint {
                asset_identifier: ev_asset,
                recipient: ev_recipient,
                amount,
            },
        ) => {
            opt_eq_str(asset_identifier, ev_asset)
                && opt_eq_str(recipient, ev_recipient)
                && min_ok(min_amount, amount)
        }
        (
            Filter::FtBurn {
                asset_identifier,
                sender,
                min_amount,
            },
            EventPayload::FtBurn {
                asset_identifier: ev_asset,
                sender: ev_sender,
                amount,
            },
        ) => {
            opt_eq_str(asset_identifier, ev_asset)
                && opt_eq_str(sender, ev_sender)
                && min_ok(min_amount, amount)
        }
        (
            Filter::NftTransfer {
                asset_identifier,
                sender,
                recipient,
                token_id,
            },
            EventPayload::NftTransfer {
                asset_identifier: ev_asset,
                sender: ev_sender,
                recipient: ev_recipient,
                value,
            },
        ) => {
            opt_eq_str(asset_identifier, ev_asset)
                && opt_eq_str(sender, ev_sender)
                && opt_eq_str(recipient, ev_recipient)
                && token_ok(token_id, value)
        }
        (
            Filter::NftMint {
                asset_identifier,
                recipient,
                token_id,
            },
            EventPayload::NftMint {
                asset_identifier: ev_asset,
                recipient: ev_recipient,
                value,
            },
        ) => {
            opt_eq_str(asset_identifier, ev_asset)
                && opt_eq_str(recipient, ev_recipient)
                && token_ok(token_id, value)
        }
        (
            Filter::NftBurn {
                asset_identifier,
                sender,
                token_id,
            },
            EventPayload::NftBurn {
                asset_identifier: ev_asset,
                sender: ev_sender,
                value,
            },
        ) => {
            opt_eq_str(asset_identifier, ev_asset)
                && opt_eq_str(sender, ev_sender)
                && token_ok(token_id, value)
        }
        (
            Filter::PrintEvent {
                contract_id,
                topic,
                contains,
            },
            EventPayload::SmartContractEvent {
                contract_id: ev_contract,
                topic: ev_topic,
                value,
            },
        ) => {
            opt_eq_str(contract_id, ev_contract)
                && opt_eq_str(topic, ev_topic)
                && contains_ok(contains, value)
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Predicate helpers
// ---------------------------------------------------------------------------

fn opt_eq_str(wanted: &Option<String>, actual: &str) -> bool {
    wanted.as_deref().map(|w| w == actual).unwrap_or(true)
}

fn opt_eq(wanted: &Option<String>, actual: Option<&str>) -> bool {
    match wanted.as_deref() {
        None => true,
        Some(w) => actual == Some(w),
    }
}

fn opt_glob(pattern: &Option<String>, actual: Option<&str>) -> bool {
    match pattern.as_deref() {
        None => true,
        Some(p) => match actual {
            Some(a) => glob_matches(p, a),
            None => false,
        },
    }
}

/// `*` matches any substring; everything else is literal. Metacharacters are
/// escaped before compilation so user patterns cannot inject regex syntax.
pub fn glob_matches(pattern: &str, value: &str) -> bool {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    match Regex::new(&format!("^{escaped}$")) {
        Ok(re) => re.is_match(value),
        Err(_) => false,
    }
}

/// Amounts are u128 decimal strings; absent/malformed parses as 0.
pub fn parse_amount(s: &str) -> u128 {
    s.parse::<u128>().unwrap_or(0)
}

fn min_ok(min: &Option<String>, amount: &str) -> bool {
    match min.as_deref() {
        None => true,
        Some(m) => parse_amount(amount) >= parse_amount(m),
    }
}

fn max_ok(max: &Option<String>, amount: &str) -> bool {
    match max.as_deref() {
        None => true,
        Some(m) => parse_amount(amount) <= parse_amount(m),
    }
}

/// Token ids compare exactly: against the string form when the value is a
/// string, otherwise against the compact JSON serialization.
fn token_ok(token_id: &Option<String>, value: &Value) -> bool {
    match token_id.as_deref() {
        None => true,
        Some(id) => match value {
            Value::String(s) => s == id,
            other => other.to_string() == id,
        },
    }
}

/// Substring search over the serialized print value.
fn contains_ok(contains: &Option<String>, value: &Value) -> bool {
    match contains.as_deref() {
        None => true,
        Some(needle) => value.to_string().contains(needle),
    }
}

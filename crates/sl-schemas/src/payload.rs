use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::{Event, EventPayload, Transaction};

/// Wire-stable webhook body. Field names and nesting must not change:
/// receivers sign off on this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub stream_id: Uuid,
    pub stream_name: String,
    pub network: String,
    pub block: BlockSummary,
    pub matches: MatchPayload,
    pub is_backfill: bool,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub height: i64,
    pub hash: String,
    pub parent_hash: String,
    /// Present when the stream's `includeBlockMetadata` option is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burn_block_height: Option<i64>,
    /// Unix seconds; present when `includeBlockMetadata` is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPayload {
    pub transactions: Vec<TransactionMatch>,
    pub events: Vec<EventMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMatch {
    pub tx_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sender: String,
    pub status: String,
    pub contract_id: Option<String>,
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_tx: Option<String>,
}

impl TransactionMatch {
    pub fn from_transaction(tx: &Transaction, include_raw_tx: bool) -> Self {
        Self {
            tx_id: tx.tx_id.clone(),
            kind: tx.kind.as_str().to_string(),
            sender: tx.sender.clone(),
            status: tx.status.clone(),
            contract_id: tx.contract_id.clone(),
            function_name: tx.function_name.clone(),
            raw_tx: include_raw_tx.then(|| tx.raw_tx.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMatch {
    pub tx_id: String,
    pub event_index: i32,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventMatch {
    pub fn from_event(ev: &Event) -> Self {
        Self {
            tx_id: ev.tx_id.clone(),
            event_index: ev.event_index,
            payload: ev.payload.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TxType;

    #[test]
    fn payload_wire_shape_is_camel_case() {
        let tx = Transaction {
            tx_id: "0x01".to_string(),
            block_height: 100,
            tx_index: 0,
            kind: TxType::ContractCall,
            sender: "SP1AAA".to_string(),
            status: "success".to_string(),
            contract_id: Some("SP2X.marketplace".to_string()),
            function_name: Some("list".to_string()),
            raw_tx: "00aa".to_string(),
        };
        let payload = WebhookPayload {
            stream_id: Uuid::nil(),
            stream_name: "s".to_string(),
            network: "mainnet".to_string(),
            block: BlockSummary {
                height: 100,
                hash: "0xb".to_string(),
                parent_hash: "0xa".to_string(),
                burn_block_height: Some(900),
                timestamp: Some(1_700_000_000),
            },
            matches: MatchPayload {
                transactions: vec![TransactionMatch::from_transaction(&tx, false)],
                events: vec![],
            },
            is_backfill: false,
            delivered_at: Utc::now(),
        };

        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["streamId"], Uuid::nil().to_string());
        assert_eq!(v["block"]["parentHash"], "0xa");
        assert_eq!(v["block"]["burnBlockHeight"], 900);
        assert_eq!(v["matches"]["transactions"][0]["txId"], "0x01");
        assert_eq!(v["matches"]["transactions"][0]["type"], "contract_call");
        // rawTx omitted unless includeRawTx was set
        assert!(v["matches"]["transactions"][0].get("rawTx").is_none());
        assert_eq!(v["isBackfill"], false);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A canonical (or orphaned) block as indexed from upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub height: i64,
    pub hash: String,
    pub parent_hash: String,
    pub burn_height: i64,
    pub timestamp: DateTime<Utc>,
    pub canonical: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    TokenTransfer,
    ContractCall,
    SmartContract,
    Coinbase,
    TenureChange,
    PoisonMicroblock,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::TokenTransfer => "token_transfer",
            TxType::ContractCall => "contract_call",
            TxType::SmartContract => "smart_contract",
            TxType::Coinbase => "coinbase",
            TxType::TenureChange => "tenure_change",
            TxType::PoisonMicroblock => "poison_microblock",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "token_transfer" => Some(TxType::TokenTransfer),
            "contract_call" => Some(TxType::ContractCall),
            "smart_contract" => Some(TxType::SmartContract),
            "coinbase" => Some(TxType::Coinbase),
            "tenure_change" => Some(TxType::TenureChange),
            "poison_microblock" => Some(TxType::PoisonMicroblock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: String,
    pub block_height: i64,
    /// Position within the block; drives deterministic payload ordering.
    pub tx_index: i32,
    pub kind: TxType,
    pub sender: String,
    pub status: String,
    pub contract_id: Option<String>,
    pub function_name: Option<String>,
    pub raw_tx: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    StxTransfer,
    StxMint,
    StxBurn,
    StxLock,
    FtTransfer,
    FtMint,
    FtBurn,
    NftTransfer,
    NftMint,
    NftBurn,
    SmartContractEvent,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::StxTransfer => "stx_transfer",
            EventType::StxMint => "stx_mint",
            EventType::StxBurn => "stx_burn",
            EventType::StxLock => "stx_lock",
            EventType::FtTransfer => "ft_transfer",
            EventType::FtMint => "ft_mint",
            EventType::FtBurn => "ft_burn",
            EventType::NftTransfer => "nft_transfer",
            EventType::NftMint => "nft_mint",
            EventType::NftBurn => "nft_burn",
            EventType::SmartContractEvent => "smart_contract_event",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stx_transfer" => Some(EventType::StxTransfer),
            "stx_mint" => Some(EventType::StxMint),
            "stx_burn" => Some(EventType::StxBurn),
            "stx_lock" => Some(EventType::StxLock),
            "ft_transfer" => Some(EventType::FtTransfer),
            "ft_mint" => Some(EventType::FtMint),
            "ft_burn" => Some(EventType::FtBurn),
            "nft_transfer" => Some(EventType::NftTransfer),
            "nft_mint" => Some(EventType::NftMint),
            "nft_burn" => Some(EventType::NftBurn),
            "smart_contract_event" => Some(EventType::SmartContractEvent),
            _ => None,
        }
    }
}

/// Event payload, tagged by event type.
///
/// Amounts are decimal strings: chain amounts are 128-bit and must not lose
/// precision through JSON numbers. The adjacent tagging matches the wire
/// shape `{type, data}` of the webhook payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    StxTransfer {
        sender: String,
        recipient: String,
        amount: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
    },
    StxMint {
        recipient: String,
        amount: String,
    },
    StxBurn {
        sender: String,
        amount: String,
    },
    StxLock {
        locked_address: String,
        locked_amount: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unlock_height: Option<i64>,
    },
    FtTransfer {
        asset_identifier: String,
        sender: String,
        recipient: String,
        amount: String,
    },
    FtMint {
        asset_identifier: String,
        recipient: String,
        amount: String,
    },
    FtBurn {
        asset_identifier: String,
        sender: String,
        amount: String,
    },
    NftTransfer {
        asset_identifier: String,
        sender: String,
        recipient: String,
        value: Value,
    },
    NftMint {
        asset_identifier: String,
        recipient: String,
        value: Value,
    },
    NftBurn {
        asset_identifier: String,
        sender: String,
        value: Value,
    },
    SmartContractEvent {
        contract_id: String,
        topic: String,
        value: Value,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventType {
        match self {
            EventPayload::StxTransfer { .. } => EventType::StxTransfer,
            EventPayload::StxMint { .. } => EventType::StxMint,
            EventPayload::StxBurn { .. } => EventType::StxBurn,
            EventPayload::StxLock { .. } => EventType::StxLock,
            EventPayload::FtTransfer { .. } => EventType::FtTransfer,
            EventPayload::FtMint { .. } => EventType::FtMint,
            EventPayload::FtBurn { .. } => EventType::FtBurn,
            EventPayload::NftTransfer { .. } => EventType::NftTransfer,
            EventPayload::NftMint { .. } => EventType::NftMint,
            EventPayload::NftBurn { .. } => EventType::NftBurn,
            EventPayload::SmartContractEvent { .. } => EventType::SmartContractEvent,
        }
    }

    /// The `data` half of the adjacent `{type, data}` encoding.
    pub fn data_json(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Rebuild from the split columns the store keeps (`type` + `data`).
    pub fn from_parts(event_type: &str, data: Value) -> Option<Self> {
        serde_json::from_value(serde_json::json!({ "type": event_type, "data": data })).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Surrogate id assigned by the store; dedup key for match sets.
    pub id: i64,
    pub tx_id: String,
    pub block_height: i64,
    pub event_index: i32,
    #[serde(flatten)]
    pub payload: EventPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_payload_round_trips_through_split_columns() {
        let p = EventPayload::FtTransfer {
            asset_identifier: "SP2X.token::tok".to_string(),
            sender: "SP1AAA".to_string(),
            recipient: "SP1BBB".to_string(),
            amount: "340282366920938463463374607431768211455".to_string(),
        };
        let data = p.data_json();
        let back = EventPayload::from_parts(p.kind().as_str(), data).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn event_serializes_with_wire_tagging() {
        let ev = Event {
            id: 7,
            tx_id: "0xabc".to_string(),
            block_height: 100,
            event_index: 0,
            payload: EventPayload::SmartContractEvent {
                contract_id: "SP2X.market".to_string(),
                topic: "print".to_string(),
                value: json!({"action": "list"}),
            },
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "smart_contract_event");
        assert_eq!(v["data"]["topic"], "print");
    }
}

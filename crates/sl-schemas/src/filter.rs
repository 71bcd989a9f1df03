use serde::{Deserialize, Serialize};

/// A single stream filter. A stream carries a non-empty ordered list of
/// these; the list is combined with OR and the fields within a variant with
/// AND (absent fields match anything).
///
/// Amount bounds are decimal strings so 128-bit chain amounts survive JSON.
/// `function_name` and `contract_name` accept `*` wildcards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    #[serde(rename_all = "camelCase")]
    StxTransfer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_amount: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_amount: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StxMint {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_amount: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StxBurn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_amount: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StxLock {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        locked_address: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_amount: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    FtTransfer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        asset_identifier: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_amount: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    FtMint {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        asset_identifier: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_amount: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    FtBurn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        asset_identifier: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_amount: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    NftTransfer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        asset_identifier: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    NftMint {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        asset_identifier: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    NftBurn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        asset_identifier: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ContractCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contract_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        function_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caller: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ContractDeploy {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deployer: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contract_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PrintEvent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contract_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contains: Option<String>,
    },
}

pub const MAX_RATE_LIMIT: u32 = 100;
pub const MAX_TIMEOUT_MS: u64 = 30_000;
pub const MAX_RETRIES: u32 = 10;

/// Per-stream delivery options. Out-of-range values are clamped by
/// `normalized`, never rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOptions {
    #[serde(default)]
    pub decode_clarity_values: bool,
    #[serde(default)]
    pub include_raw_tx: bool,
    #[serde(default)]
    pub include_block_metadata: bool,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_rate_limit() -> u32 {
    10
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            decode_clarity_values: false,
            include_raw_tx: false,
            include_block_metadata: false,
            rate_limit: default_rate_limit(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl StreamOptions {
    pub fn normalized(mut self) -> Self {
        self.rate_limit = self.rate_limit.clamp(1, MAX_RATE_LIMIT);
        self.timeout_ms = self.timeout_ms.clamp(1, MAX_TIMEOUT_MS);
        self.max_retries = self.max_retries.clamp(1, MAX_RETRIES);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_json_uses_snake_case_tags_and_camel_case_fields() {
        let f: Filter = serde_json::from_value(serde_json::json!({
            "type": "contract_call",
            "contractId": "SP2X.marketplace",
            "functionName": "list-*"
        }))
        .unwrap();
        match f {
            Filter::ContractCall {
                contract_id,
                function_name,
                caller,
            } => {
                assert_eq!(contract_id.as_deref(), Some("SP2X.marketplace"));
                assert_eq!(function_name.as_deref(), Some("list-*"));
                assert!(caller.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn options_clamp_to_spec_ceilings() {
        let opts = StreamOptions {
            rate_limit: 500,
            timeout_ms: 90_000,
            max_retries: 99,
            ..StreamOptions::default()
        }
        .normalized();
        assert_eq!(opts.rate_limit, MAX_RATE_LIMIT);
        assert_eq!(opts.timeout_ms, MAX_TIMEOUT_MS);
        assert_eq!(opts.max_retries, MAX_RETRIES);
    }

    #[test]
    fn options_default_when_absent_from_json() {
        let opts: StreamOptions = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(opts, StreamOptions::default());
    }
}

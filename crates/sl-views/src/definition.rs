use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use sl_schemas::{ApiError, Filter};

/// System columns every view table carries. `_id` is the surrogate key;
/// (`_block_height`, `_tx_id`, `_event_index`) is the idempotent upsert key.
pub const SYSTEM_COLUMNS: &[&str] = &["_id", "_block_height", "_tx_id", "_event_index", "_created_at"];

/// Allowlisted column types. DDL interpolates `as_sql()` only; user input
/// never reaches the type position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Text,
    Timestamp,
    Bigint,
    Numeric,
    Boolean,
    Bytea,
    Jsonb,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Text => "text",
            ColumnType::Timestamp => "timestamptz",
            ColumnType::Bigint => "bigint",
            ColumnType::Numeric => "numeric",
            ColumnType::Boolean => "boolean",
            ColumnType::Bytea => "bytea",
            ColumnType::Jsonb => "jsonb",
        }
    }

    /// Cast appended to text-bound parameters so Postgres coerces them into
    /// the declared column type.
    pub fn bind_cast(&self) -> &'static str {
        match self {
            ColumnType::Jsonb => "::jsonb",
            ColumnType::Integer => "::integer",
            ColumnType::Text => "::text",
            ColumnType::Timestamp => "::timestamptz",
            ColumnType::Bigint => "::bigint",
            ColumnType::Numeric => "::numeric",
            ColumnType::Boolean => "::boolean",
            ColumnType::Bytea => "::bytea",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    pub columns: BTreeMap<String, ColumnType>,
    #[serde(default)]
    pub indexes: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerSource {
    Transactions,
    Events,
}

/// Which value lands in a column for each matched item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum FieldSelector {
    /// A fixed transaction attribute.
    Tx { field: TxField },
    /// A dot path into the matched event's payload data.
    Event { path: String },
    /// A constant.
    Literal { value: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxField {
    TxId,
    Sender,
    Status,
    ContractId,
    FunctionName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerRule {
    pub table: String,
    pub source: HandlerSource,
    pub when: Filter,
    pub columns: BTreeMap<String, FieldSelector>,
}

/// The whole tenant-declared view: physical tables plus the handler rules
/// that populate them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub tables: BTreeMap<String, TableDef>,
    #[serde(default)]
    pub handlers: Vec<HandlerRule>,
}

/// Identifiers that may be interpolated into DDL/queries. Anything else is
/// rejected before SQL is built.
pub fn is_safe_identifier(name: &str) -> bool {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new("^[a-zA-Z0-9_]+$").expect("identifier regex"));
    !name.is_empty() && name.len() <= 63 && re.is_match(name)
}

/// Shape validation for a deploy request. Returns the first violation as a
/// `VALIDATION_ERROR`.
pub fn validate_definition(definition: &ViewDefinition) -> Result<(), ApiError> {
    if definition.tables.is_empty() {
        return Err(ApiError::validation("view must declare at least one table"));
    }

    for (table, def) in &definition.tables {
        if !is_safe_identifier(table) {
            return Err(ApiError::validation(format!("invalid table name: {table}")));
        }
        if def.columns.is_empty() {
            return Err(ApiError::validation(format!(
                "table {table} must declare at least one column"
            )));
        }
        for column in def.columns.keys() {
            if !is_safe_identifier(column) {
                return Err(ApiError::validation(format!(
                    "invalid column name: {column}"
                )));
            }
            if column.starts_with('_') || SYSTEM_COLUMNS.contains(&column.as_str()) {
                return Err(ApiError::validation(format!(
                    "column {column} collides with the reserved system prefix"
                )));
            }
        }
        for index in &def.indexes {
            for column in index {
                if !def.columns.contains_key(column) {
                    return Err(ApiError::validation(format!(
                        "index references unknown column: {column}"
                    )));
                }
            }
        }
    }

    for rule in &definition.handlers {
        let Some(table) = definition.tables.get(&rule.table) else {
            return Err(ApiError::validation(format!(
                "handler targets unknown table: {}",
                rule.table
            )));
        };
        for column in rule.columns.keys() {
            if !table.columns.contains_key(column) {
                return Err(ApiError::validation(format!(
                    "handler writes unknown column: {column}"
                )));
            }
        }
    }

    Ok(())
}

/// Content hash over the key-sorted canonical JSON of the definition; an
/// unchanged hash makes deploy a no-op.
pub fn schema_hash(definition: &ViewDefinition) -> String {
    let value = serde_json::to_value(definition).unwrap_or(Value::Null);
    let canonical = canonicalize_json(&value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonicalize JSON by sorting all object keys recursively and emitting
/// compact JSON.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing_view() -> ViewDefinition {
        serde_json::from_value(json!({
            "tables": {
                "listings": {
                    "columns": {"price": "numeric", "seller": "text"},
                    "indexes": [["seller"]]
                }
            },
            "handlers": [{
                "table": "listings",
                "source": "transactions",
                "when": {"type": "contract_call", "contractId": "SP2X.marketplace"},
                "columns": {"seller": {"from": "tx", "field": "sender"}}
            }]
        }))
        .unwrap()
    }

    #[test]
    fn identifier_rules() {
        assert!(is_safe_identifier("listings_v2"));
        assert!(is_safe_identifier("A1"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("drop table"));
        assert!(!is_safe_identifier("x;--"));
        assert!(!is_safe_identifier("naïve"));
        assert!(!is_safe_identifier(&"x".repeat(64)));
    }

    #[test]
    fn valid_definition_passes() {
        assert!(validate_definition(&listing_view()).is_ok());
    }

    #[test]
    fn bad_identifiers_and_shapes_are_rejected() {
        let mut v = listing_view();
        v.tables.insert(
            "bad;name".to_string(),
            TableDef {
                columns: BTreeMap::from([("a".to_string(), ColumnType::Text)]),
                indexes: vec![],
            },
        );
        assert!(validate_definition(&v).is_err());

        let mut v = listing_view();
        v.tables.get_mut("listings").unwrap().columns.clear();
        assert!(validate_definition(&v).is_err());

        let mut v = listing_view();
        v.tables
            .get_mut("listings")
            .unwrap()
            .columns
            .insert("_id".to_string(), ColumnType::Text);
        assert!(validate_definition(&v).is_err(), "system prefix is reserved");

        let mut v = listing_view();
        v.handlers[0].table = "nope".to_string();
        assert!(validate_definition(&v).is_err());

        let mut v = listing_view();
        v.handlers[0]
            .columns
            .insert("ghost".to_string(), FieldSelector::Tx { field: TxField::TxId });
        assert!(validate_definition(&v).is_err());
    }

    #[test]
    fn schema_hash_ignores_key_order() {
        let a: ViewDefinition = serde_json::from_value(json!({
            "tables": {"t": {"columns": {"a": "text", "b": "bigint"}}}
        }))
        .unwrap();
        let b: ViewDefinition = serde_json::from_value(json!({
            "tables": {"t": {"columns": {"b": "bigint", "a": "text"}}}
        }))
        .unwrap();
        assert_eq!(schema_hash(&a), schema_hash(&b));

        let c: ViewDefinition = serde_json::from_value(json!({
            "tables": {"t": {"columns": {"a": "text", "b": "numeric"}}}
        }))
        .unwrap();
        assert_ne!(schema_hash(&a), schema_hash(&c));
    }
}

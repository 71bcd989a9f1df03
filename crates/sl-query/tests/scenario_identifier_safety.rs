//! Scenario: identifier safety (pure).
//!
//! Any SQL the engine assembles references only identifiers that match
//! `^[a-zA-Z0-9_]+$` and passed the view-definition check; adversarial keys
//! come back as `INVALID_COLUMN` before SQL exists, and values never appear
//! in the statement text.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use sl_query::{build_list_sql, parse_query, resolve_table, validate};
use sl_schemas::ErrorCode;
use sl_views::{ViewDefinition, ViewRow};

fn test_view() -> ViewRow {
    let definition: ViewDefinition = serde_json::from_value(json!({
        "tables": {
            "listings": {
                "columns": {"price": "numeric", "seller": "text", "active": "boolean"}
            }
        }
    }))
    .unwrap();
    ViewRow {
        id: Uuid::new_v4(),
        name: "v1".to_string(),
        version: 1,
        status: "active".to_string(),
        definition,
        schema_hash: "hash".to_string(),
        schema_name: "v_deadbeef_v1".to_string(),
        last_processed_height: None,
        total_processed: 0,
        total_errors: 0,
        last_error: None,
        last_error_at: None,
        owner_key_id: Uuid::new_v4(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn unknown_filter_column_is_invalid_column() {
    let view = test_view();
    let def = resolve_table(&view, "listings").unwrap();
    let spec = parse_query(&pairs(&[("nonexistent", "foo")])).unwrap();
    let err = validate(def, &spec).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidColumn);
}

#[test]
fn fuzzed_keys_never_reach_sql() {
    let view = test_view();
    let def = resolve_table(&view, "listings").unwrap();
    let hostile = [
        "price; drop table listings--",
        "price\"",
        "price' or '1'='1",
        "p r i c e",
        "price)::text||(select",
        "🦀",
    ];
    for key in hostile {
        let spec = parse_query(&pairs(&[(key, "1")])).unwrap();
        let err = validate(def, &spec).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidColumn, "key {key:?} must be rejected");
    }
}

#[test]
fn sort_and_fields_are_validated_too() {
    let view = test_view();
    let def = resolve_table(&view, "listings").unwrap();

    let spec = parse_query(&pairs(&[("_sort", "seller; drop")])).unwrap();
    assert_eq!(validate(def, &spec).unwrap_err().code, ErrorCode::InvalidColumn);

    let spec = parse_query(&pairs(&[("_fields", "price,ghost")])).unwrap();
    assert_eq!(validate(def, &spec).unwrap_err().code, ErrorCode::InvalidColumn);

    // System columns are queryable.
    let spec = parse_query(&pairs(&[("_sort", "_block_height")])).unwrap();
    assert!(validate(def, &spec).is_ok());
}

#[test]
fn unknown_table_is_table_not_found() {
    let view = test_view();
    assert_eq!(
        resolve_table(&view, "ghost").unwrap_err().code,
        ErrorCode::TableNotFound
    );
    assert_eq!(
        resolve_table(&view, "x; drop schema public").unwrap_err().code,
        ErrorCode::TableNotFound
    );
}

#[test]
fn values_travel_as_placeholders_only() {
    let view = test_view();
    let def = resolve_table(&view, "listings").unwrap();
    let spec = parse_query(&pairs(&[
        ("price.gte", "100"),
        ("seller", "SP1AAA'); drop table listings;--"),
        ("_sort", "price"),
        ("_order", "desc"),
        ("_limit", "10"),
    ]))
    .unwrap();
    validate(def, &spec).unwrap();

    let sql = build_list_sql(&view, "listings", def, &spec);
    assert!(!sql.contains("SP1AAA"), "values must not be interpolated");
    assert!(!sql.contains("drop table"));
    assert!(sql.contains(r#""price" >= $1"#));
    assert!(sql.contains(r#""seller" = $2"#));
    assert!(sql.contains(r#"order by "price" desc, "_id" asc"#));
    assert!(sql.contains("limit $3 offset $4"));
}

#[test]
fn default_sort_is_surrogate_id_ascending() {
    let view = test_view();
    let def = resolve_table(&view, "listings").unwrap();
    let spec = parse_query(&[]).unwrap();
    let sql = build_list_sql(&view, "listings", def, &spec);
    assert!(sql.contains(r#"order by "_id" asc"#));
    assert!(sql.contains("limit $1 offset $2"));
}

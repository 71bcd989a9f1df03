//! Materialized view registry: tenant-declared table schemas populated by a
//! declarative handler DSL over indexed blocks, with an in-memory cache kept
//! coherent through Postgres change notifications.
//!
//! Handlers are data, not code: a rule names a source (transactions or
//! events), a filter (the same algebra streams use), and a column mapping.
//! The registry interprets rules; nothing is ever loaded at runtime.

pub mod cache;
pub mod definition;
pub mod handler;
pub mod registry;

pub use cache::ViewCache;
pub use definition::{
    is_safe_identifier, schema_hash, validate_definition, ColumnType, FieldSelector, HandlerRule,
    HandlerSource, TableDef, ViewDefinition, SYSTEM_COLUMNS,
};
pub use handler::{apply_block, reindex, ReindexSummary};
pub use registry::{delete_view, deploy, fetch_view, list_views, schema_name_for, ViewRow};

//! Read-only query engine over materialized view tables.
//!
//! The grammar is flat query parameters: `_sort`, `_order`, `_limit`,
//! `_offset`, `_fields`, and `<column>[.<op>]=<value>` filters. Identifiers
//! are validated against the view definition before any SQL is assembled;
//! values only ever travel as bound parameters.

pub mod engine;
pub mod params;

pub use engine::{
    build_count_sql, build_list_sql, count_rows, fetch_row, list_rows, resolve_table, validate,
    QueryError, QueryMeta, QueryPage,
};
pub use params::{parse_query, ColumnFilter, FilterOp, QuerySpec, DEFAULT_LIMIT, MAX_LIMIT};

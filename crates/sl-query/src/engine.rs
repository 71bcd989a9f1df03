use serde_json::Value;
use sqlx::PgPool;

use sl_schemas::ApiError;
use sl_views::{is_safe_identifier, ColumnType, TableDef, ViewRow};

use crate::params::QuerySpec;

#[derive(Debug)]
pub enum QueryError {
    Api(ApiError),
    Db(anyhow::Error),
}

impl From<ApiError> for QueryError {
    fn from(e: ApiError) -> Self {
        QueryError::Api(e)
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(e: sqlx::Error) -> Self {
        QueryError::Db(anyhow::Error::new(e))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryMeta {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryPage {
    pub data: Vec<Value>,
    pub meta: QueryMeta,
}

/// System columns present on every view table.
fn system_column_type(column: &str) -> Option<ColumnType> {
    match column {
        "_id" | "_block_height" => Some(ColumnType::Bigint),
        "_event_index" => Some(ColumnType::Integer),
        "_tx_id" => Some(ColumnType::Text),
        "_created_at" => Some(ColumnType::Timestamp),
        _ => None,
    }
}

fn column_type(def: &TableDef, column: &str) -> Option<ColumnType> {
    def.columns
        .get(column)
        .copied()
        .or_else(|| system_column_type(column))
}

/// Resolve the physical table or fail with `TABLE_NOT_FOUND`.
pub fn resolve_table<'a>(view: &'a ViewRow, table: &str) -> Result<&'a TableDef, ApiError> {
    if !is_safe_identifier(table) {
        return Err(ApiError::table_not_found(table));
    }
    view.definition
        .tables
        .get(table)
        .ok_or_else(|| ApiError::table_not_found(table))
}

/// Every identifier the spec references must exist on the table and match
/// the identifier grammar. First unknown column wins (`INVALID_COLUMN`).
pub fn validate(def: &TableDef, spec: &QuerySpec) -> Result<(), ApiError> {
    for filter in &spec.filters {
        if !is_safe_identifier(&filter.column) || column_type(def, &filter.column).is_none() {
            return Err(ApiError::invalid_column(&filter.column));
        }
    }
    if let Some(sort) = &spec.sort {
        if !is_safe_identifier(sort) || column_type(def, sort).is_none() {
            return Err(ApiError::invalid_column(sort));
        }
    }
    if let Some(fields) = &spec.fields {
        for field in fields {
            if !is_safe_identifier(field) || column_type(def, field).is_none() {
                return Err(ApiError::invalid_column(field));
            }
        }
    }
    Ok(())
}

fn where_clause(def: &TableDef, spec: &QuerySpec) -> String {
    if spec.filters.is_empty() {
        return String::new();
    }
    let predicates: Vec<String> = spec
        .filters
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let cast = column_type(def, &f.column)
                .map(|t| t.bind_cast())
                .unwrap_or("");
            format!(r#""{}" {} ${}{}"#, f.column, f.op.as_sql(), i + 1, cast)
        })
        .collect();
    format!("where {}", predicates.join(" and "))
}

fn projection(spec: &QuerySpec) -> String {
    match &spec.fields {
        None => "*".to_string(),
        Some(fields) => fields
            .iter()
            .map(|f| format!(r#""{f}""#))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Assemble the paged list statement. Everything interpolated has passed
/// identifier validation; values arrive via `$n` placeholders only.
pub fn build_list_sql(view: &ViewRow, table: &str, def: &TableDef, spec: &QuerySpec) -> String {
    let sort = spec.sort.as_deref().unwrap_or("_id");
    let direction = if spec.descending { "desc" } else { "asc" };
    let tiebreak = if sort == "_id" {
        String::new()
    } else {
        r#", "_id" asc"#.to_string()
    };
    let n = spec.filters.len();
    format!(
        r#"select to_jsonb(sub) as row from (
  select {projection} from "{schema}"."{table}"
  {where_clause}
  order by "{sort}" {direction}{tiebreak}
  limit ${limit_param} offset ${offset_param}
) sub"#,
        projection = projection(spec),
        schema = view.schema_name,
        where_clause = where_clause(def, spec),
        limit_param = n + 1,
        offset_param = n + 2,
    )
}

pub fn build_count_sql(view: &ViewRow, table: &str, def: &TableDef, spec: &QuerySpec) -> String {
    format!(
        r#"select count(*)::bigint from "{schema}"."{table}" {where_clause}"#,
        schema = view.schema_name,
        where_clause = where_clause(def, spec),
    )
}

pub async fn list_rows(
    pool: &PgPool,
    view: &ViewRow,
    table: &str,
    spec: &QuerySpec,
) -> Result<QueryPage, QueryError> {
    let def = resolve_table(view, table)?;
    validate(def, spec)?;

    let count_sql = build_count_sql(view, table, def, spec);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for filter in &spec.filters {
        count_query = count_query.bind(&filter.value);
    }
    let total = count_query.fetch_one(pool).await?;

    let list_sql = build_list_sql(view, table, def, spec);
    let mut list_query = sqlx::query_scalar::<_, Value>(&list_sql);
    for filter in &spec.filters {
        list_query = list_query.bind(&filter.value);
    }
    let data = list_query
        .bind(spec.limit)
        .bind(spec.offset)
        .fetch_all(pool)
        .await?;

    Ok(QueryPage {
        data,
        meta: QueryMeta {
            total,
            limit: spec.limit,
            offset: spec.offset,
        },
    })
}

pub async fn count_rows(
    pool: &PgPool,
    view: &ViewRow,
    table: &str,
    spec: &QuerySpec,
) -> Result<i64, QueryError> {
    let def = resolve_table(view, table)?;
    validate(def, spec)?;

    let sql = build_count_sql(view, table, def, spec);
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for filter in &spec.filters {
        query = query.bind(&filter.value);
    }
    Ok(query.fetch_one(pool).await?)
}

/// Single row by surrogate `_id`; `ROW_NOT_FOUND` when absent.
pub async fn fetch_row(
    pool: &PgPool,
    view: &ViewRow,
    table: &str,
    id: i64,
) -> Result<Value, QueryError> {
    let _ = resolve_table(view, table)?;

    let sql = format!(
        r#"select to_jsonb(sub) as row from (
  select * from "{schema}"."{table}" where "_id" = $1
) sub"#,
        schema = view.schema_name,
    );
    let row: Option<Value> = sqlx::query_scalar(&sql).bind(id).fetch_optional(pool).await?;
    row.ok_or_else(|| QueryError::Api(ApiError::row_not_found()))
}

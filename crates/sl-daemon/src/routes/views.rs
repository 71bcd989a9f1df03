//! View registry surface: deploy/list/get/delete/reindex plus the read-only
//! query endpoints over materialized tables.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;

use crate::api_types::{DeployViewRequest, ReplayRequest, ViewResponse};
use crate::auth::{resolve_caller, Caller};
use crate::error::{ApiFailure, ApiResult};
use crate::routes::{guard_api_request, guard_creation};
use crate::state::{AppState, SharedState};
use sl_schemas::ApiError;
use sl_views::ViewRow;

async fn load_owned_view(state: &AppState, caller: &Caller, name: &str) -> ApiResult<ViewRow> {
    // The cache answers lookups; fall back to the table on a miss so a
    // fresh deploy is visible before the notification lands.
    if let Some(view) = state.views.get(name, caller.keys()).await {
        return Ok(view);
    }
    sl_views::fetch_view(&state.pool, name, caller.keys())
        .await
        .map_err(ApiFailure::from)?
        .ok_or_else(|| ApiFailure(ApiError::view_not_found(name)))
}

pub(crate) async fn deploy(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<DeployViewRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    guard_api_request(&st, &caller).await?;
    guard_creation(&st, &caller).await?;

    if !sl_views::is_safe_identifier(&body.name) {
        return Err(ApiError::validation(format!("invalid view name: {}", body.name)).into());
    }
    sl_views::validate_definition(&body.definition)?;

    if let Some(range) = &body.reindex {
        if range.from_block > range.to_block {
            return Err(ApiError::validation("fromBlock must be <= toBlock").into());
        }
    }

    let owner_key_id = caller
        .keys()
        .and_then(|k| k.first().copied())
        .unwrap_or_else(uuid::Uuid::new_v4);

    let view = sl_views::deploy(&st.pool, owner_key_id, &body.name, &body.definition)
        .await
        .map_err(ApiFailure::from)?;

    // Keep this process current without waiting for the notification.
    let _ = st.views.refresh(&st.pool).await;

    if let Some(ReplayRequest {
        from_block,
        to_block,
    }) = body.reindex
    {
        let pool = st.pool.clone();
        let background_view = view.clone();
        tokio::spawn(async move {
            if let Err(e) = sl_views::reindex(&pool, &background_view, from_block, to_block).await {
                tracing::error!(view = %background_view.name, error = %e, "deploy reindex failed");
            }
        });
    }

    Ok((StatusCode::CREATED, Json(ViewResponse::from_row(view))))
}

pub(crate) async fn list(
    State(st): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    let views = st.views.get_all(caller.keys()).await;
    let out: Vec<ViewResponse> = views.into_iter().map(ViewResponse::from_row).collect();
    Ok(Json(out))
}

pub(crate) async fn fetch(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    let view = load_owned_view(&st, &caller, &name).await?;
    Ok(Json(ViewResponse::from_row(view)))
}

pub(crate) async fn delete(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    guard_api_request(&st, &caller).await?;
    let view = load_owned_view(&st, &caller, &name).await?;

    sl_views::delete_view(&st.pool, &view)
        .await
        .map_err(ApiFailure::from)?;
    let _ = st.views.refresh(&st.pool).await;
    info!(view = %name, "view deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn reindex(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<ReplayRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    guard_api_request(&st, &caller).await?;
    let view = load_owned_view(&st, &caller, &name).await?;

    if body.from_block > body.to_block {
        return Err(ApiError::validation("fromBlock must be <= toBlock").into());
    }

    let summary = sl_views::reindex(&st.pool, &view, body.from_block, body.to_block)
        .await
        .map_err(ApiFailure::from)?;
    let _ = st.views.refresh(&st.pool).await;
    Ok(Json(summary))
}

// ---------------------------------------------------------------------------
// Queries over materialized tables
// ---------------------------------------------------------------------------

pub(crate) async fn query_table(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path((name, table)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    let view = load_owned_view(&st, &caller, &name).await?;

    let spec = sl_query::parse_query(&params)?;
    let page = sl_query::list_rows(&st.pool, &view, &table, &spec).await?;
    Ok(Json(page))
}

pub(crate) async fn count_table(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path((name, table)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    let view = load_owned_view(&st, &caller, &name).await?;

    let spec = sl_query::parse_query(&params)?;
    let count = sl_query::count_rows(&st.pool, &view, &table, &spec).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

pub(crate) async fn fetch_table_row(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path((name, table, id)): Path<(String, String, i64)>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    let view = load_owned_view(&st, &caller, &name).await?;

    let row = sl_query::fetch_row(&st.pool, &view, &table, id).await?;
    Ok(Json(serde_json::json!({ "data": row })))
}

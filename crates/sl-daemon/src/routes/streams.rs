//! Stream CRUD, state operations, trigger/replay entry points, and the
//! delivery listing.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use crate::api_types::{
    BulkTransitionResponse, CreateStreamRequest, DeliveriesQuery, ReplayFailedResponse,
    ReplayRequest, ReplayResponse, RotateSecretResponse, StreamResponse, TriggerRequest,
    TriggerResponse, UpdateStreamRequest,
};
use crate::auth::resolve_caller;
use crate::error::{ApiFailure, ApiResult};
use crate::routes::{guard_api_request, guard_creation, load_owned_stream};
use crate::state::{BusMsg, SharedState};
use sl_db::streams::{NewStream, StreamUpdate};
use sl_schemas::{apply_action, ApiError, DeliveryOutcome, StreamAction, StreamStatus};

fn generate_secret() -> String {
    format!(
        "whsec_{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

pub(crate) async fn create(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<CreateStreamRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    guard_api_request(&st, &caller).await?;
    guard_creation(&st, &caller).await?;

    if body.name.trim().is_empty() {
        return Err(ApiError::validation("stream name must not be empty").into());
    }
    if body.filters.is_empty() {
        return Err(ApiError::validation("filters must not be empty").into());
    }
    if !body.webhook_url.starts_with("https://") && !body.webhook_url.starts_with("http://") {
        return Err(ApiError::validation("webhookUrl must be an http(s) URL").into());
    }

    // Owner key: the caller's presented key; in dev mode a fresh key id
    // stands in so ownership stays well-formed.
    let owner_key_id = caller
        .keys()
        .and_then(|k| k.first().copied())
        .unwrap_or_else(Uuid::new_v4);

    let stream = sl_db::streams::insert_stream(
        &st.pool,
        &NewStream {
            name: body.name,
            filters: body.filters,
            options: body.options.normalized(),
            webhook_url: body.webhook_url,
            webhook_secret: body.webhook_secret,
            owner_key_id,
        },
    )
    .await
    .map_err(ApiFailure::from)?;

    info!(stream_id = %stream.id, name = %stream.name, "stream created");
    Ok((
        StatusCode::CREATED,
        Json(StreamResponse::from_row(stream, None)),
    ))
}

pub(crate) async fn list(
    State(st): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    let rows = sl_db::streams::list_streams(&st.pool, caller.keys())
        .await
        .map_err(ApiFailure::from)?;
    let out: Vec<StreamResponse> = rows
        .into_iter()
        .map(|row| StreamResponse::from_row(row, None))
        .collect();
    Ok(Json(out))
}

pub(crate) async fn fetch(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    let stream = load_owned_stream(&st, &caller, id).await?;
    let metrics = sl_db::streams::fetch_metrics(&st.pool, id)
        .await
        .map_err(ApiFailure::from)?;
    Ok(Json(StreamResponse::from_row(stream, metrics)))
}

pub(crate) async fn update(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStreamRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    guard_api_request(&st, &caller).await?;
    load_owned_stream(&st, &caller, id).await?;

    if let Some(filters) = &body.filters {
        if filters.is_empty() {
            return Err(ApiError::validation("filters must not be empty").into());
        }
    }

    let updated = sl_db::streams::update_stream(
        &st.pool,
        id,
        &StreamUpdate {
            name: body.name,
            filters: body.filters,
            options: body.options.map(|o| o.normalized()),
            webhook_url: body.webhook_url,
            webhook_secret: body.webhook_secret.map(Some),
        },
    )
    .await
    .map_err(ApiFailure::from)?
    .ok_or_else(|| ApiFailure(ApiError::stream_not_found(id)))?;

    Ok(Json(StreamResponse::from_row(updated, None)))
}

pub(crate) async fn delete(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    guard_api_request(&st, &caller).await?;
    load_owned_stream(&st, &caller, id).await?;

    sl_db::streams::delete_stream(&st.pool, id)
        .await
        .map_err(ApiFailure::from)?;
    info!(stream_id = %id, "stream deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// State operations
// ---------------------------------------------------------------------------

async fn transition(
    st: &SharedState,
    headers: &HeaderMap,
    id: Uuid,
    action: StreamAction,
) -> ApiResult<Json<StreamResponse>> {
    let caller = resolve_caller(st, headers).await?;
    guard_api_request(st, &caller).await?;
    let stream = load_owned_stream(st, &caller, id).await?;

    let Some(next) = apply_action(stream.status, action) else {
        return Err(ApiError::validation(format!(
            "cannot {} a {} stream",
            action.as_str(),
            stream.status.as_str()
        ))
        .into());
    };

    sl_db::streams::set_stream_status(&st.pool, id, next)
        .await
        .map_err(ApiFailure::from)?;
    let refreshed = load_owned_stream(st, &caller, id).await?;
    info!(stream_id = %id, action = action.as_str(), status = next.as_str(), "stream transition");
    Ok(Json(StreamResponse::from_row(refreshed, None)))
}

pub(crate) async fn enable(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    transition(&st, &headers, id, StreamAction::Enable).await
}

pub(crate) async fn disable(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    transition(&st, &headers, id, StreamAction::Disable).await
}

pub(crate) async fn pause(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    transition(&st, &headers, id, StreamAction::Pause).await
}

pub(crate) async fn resume(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    transition(&st, &headers, id, StreamAction::Resume).await
}

pub(crate) async fn rotate_secret(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    guard_api_request(&st, &caller).await?;
    load_owned_stream(&st, &caller, id).await?;

    let secret = generate_secret();
    sl_db::streams::rotate_secret(&st.pool, id, &secret)
        .await
        .map_err(ApiFailure::from)?;
    info!(stream_id = %id, "webhook secret rotated");
    Ok(Json(RotateSecretResponse {
        webhook_secret: secret,
    }))
}

pub(crate) async fn pause_all(
    State(st): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    guard_api_request(&st, &caller).await?;
    let updated = sl_db::streams::bulk_transition(
        &st.pool,
        caller.keys(),
        StreamStatus::Active,
        StreamStatus::Paused,
    )
    .await
    .map_err(ApiFailure::from)?;
    info!(updated, "bulk pause");
    Ok(Json(BulkTransitionResponse { updated }))
}

pub(crate) async fn resume_all(
    State(st): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    guard_api_request(&st, &caller).await?;
    let updated = sl_db::streams::bulk_transition(
        &st.pool,
        caller.keys(),
        StreamStatus::Paused,
        StreamStatus::Active,
    )
    .await
    .map_err(ApiFailure::from)?;
    info!(updated, "bulk resume");
    Ok(Json(BulkTransitionResponse { updated }))
}

// ---------------------------------------------------------------------------
// Trigger / replay
// ---------------------------------------------------------------------------

pub(crate) async fn trigger(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<TriggerRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    guard_api_request(&st, &caller).await?;
    load_owned_stream(&st, &caller, id).await?;

    if body.block_height < 0 {
        return Err(ApiError::validation("blockHeight must be non-negative").into());
    }

    let job_id = sl_db::jobs::enqueue(&st.pool, id, body.block_height, false)
        .await
        .map_err(ApiFailure::from)?;
    if job_id.is_some() {
        let _ = st.bus.send(BusMsg::JobsEnqueued {
            stream_id: id.to_string(),
            count: 1,
        });
    }
    Ok(Json(TriggerResponse {
        job_id,
        block_height: body.block_height,
    }))
}

pub(crate) async fn replay(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<ReplayRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    guard_api_request(&st, &caller).await?;
    load_owned_stream(&st, &caller, id).await?;

    if body.from_block > body.to_block {
        return Err(ApiError::validation("fromBlock must be <= toBlock").into());
    }

    // One job per canonical block in the range; holes are skipped.
    let heights = sl_db::chain::canonical_heights_in_range(&st.pool, body.from_block, body.to_block)
        .await
        .map_err(ApiFailure::from)?;
    let mut job_count = 0u64;
    for height in heights {
        if sl_db::jobs::enqueue(&st.pool, id, height, true)
            .await
            .map_err(ApiFailure::from)?
            .is_some()
        {
            job_count += 1;
        }
    }

    if job_count > 0 {
        let _ = st.bus.send(BusMsg::JobsEnqueued {
            stream_id: id.to_string(),
            count: job_count,
        });
    }
    info!(stream_id = %id, from = body.from_block, to = body.to_block, job_count, "replay enqueued");
    Ok(Json(ReplayResponse {
        job_count,
        from_block: body.from_block,
        to_block: body.to_block,
    }))
}

pub(crate) async fn replay_failed(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    guard_api_request(&st, &caller).await?;
    load_owned_stream(&st, &caller, id).await?;

    let heights = sl_db::deliveries::distinct_failed_heights(&st.pool, id)
        .await
        .map_err(ApiFailure::from)?;
    let mut job_count = 0u64;
    for height in heights {
        if sl_db::jobs::enqueue(&st.pool, id, height, true)
            .await
            .map_err(ApiFailure::from)?
            .is_some()
        {
            job_count += 1;
        }
    }

    if job_count > 0 {
        let _ = st.bus.send(BusMsg::JobsEnqueued {
            stream_id: id.to_string(),
            count: job_count,
        });
    }
    info!(stream_id = %id, job_count, "replay-failed enqueued");
    Ok(Json(ReplayFailedResponse { job_count }))
}

// ---------------------------------------------------------------------------
// Deliveries listing
// ---------------------------------------------------------------------------

pub(crate) async fn deliveries(
    State(st): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(query): Query<DeliveriesQuery>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&st, &headers).await?;
    load_owned_stream(&st, &caller, id).await?;

    let outcome = match query.outcome.as_deref() {
        None => None,
        Some(raw) => Some(DeliveryOutcome::parse(raw).ok_or_else(|| {
            ApiFailure(ApiError::validation("outcome must be success or failed"))
        })?),
    };
    let limit = sl_query::params::clamp_limit(query.limit.unwrap_or(0));
    let offset = query.offset.unwrap_or(0).max(0);

    let (rows, total) = sl_db::deliveries::list_deliveries(&st.pool, id, outcome, limit, offset)
        .await
        .map_err(ApiFailure::from)?;

    let data: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|d| {
            serde_json::json!({
                "id": d.id,
                "streamId": d.stream_id,
                "jobId": d.job_id,
                "blockHeight": d.block_height,
                "outcome": d.outcome.as_str(),
                "statusCode": d.status_code,
                "responseTimeMs": d.response_time_ms,
                "attempts": d.attempts,
                "error": d.error,
                "createdAt": d.created_at,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "data": data,
        "meta": {"total": total, "limit": limit, "offset": offset}
    })))
}

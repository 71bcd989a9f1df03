//! Axum router and the cross-cutting handlers (health, status, SSE).
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers so tests can compose the bare router.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::api_types::HealthResponse;
use crate::auth::Caller;
use crate::error::{ApiFailure, ApiResult};
use crate::state::{uptime_secs, AppState, BusMsg, SharedState};
use sl_schemas::ApiError;

pub mod status;
pub mod streams;
pub mod views;

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/status", get(status::status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/streams", get(streams::list).post(streams::create))
        .route("/v1/streams/pause-all", post(streams::pause_all))
        .route("/v1/streams/resume-all", post(streams::resume_all))
        .route(
            "/v1/streams/:id",
            get(streams::fetch)
                .patch(streams::update)
                .delete(streams::delete),
        )
        .route("/v1/streams/:id/enable", post(streams::enable))
        .route("/v1/streams/:id/disable", post(streams::disable))
        .route("/v1/streams/:id/pause", post(streams::pause))
        .route("/v1/streams/:id/resume", post(streams::resume))
        .route("/v1/streams/:id/rotate-secret", post(streams::rotate_secret))
        .route("/v1/streams/:id/trigger", post(streams::trigger))
        .route("/v1/streams/:id/replay", post(streams::replay))
        .route("/v1/streams/:id/replay-failed", post(streams::replay_failed))
        .route("/v1/streams/:id/deliveries", get(streams::deliveries))
        .route("/v1/views", get(views::list).post(views::deploy))
        .route("/v1/views/:view", get(views::fetch).delete(views::delete))
        .route("/v1/views/:view/reindex", post(views::reindex))
        .route("/v1/views/:view/:table", get(views::query_table))
        .route("/v1/views/:view/:table/count", get(views::count_table))
        .route("/v1/views/:view/:table/:id", get(views::fetch_table_row))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<SharedState>) -> impl IntoResponse {
    // Touch the uptime clock so the first /v1/status reads a sane value.
    let _ = uptime_secs();
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<SharedState>) -> Response {
    let rx = st.bus.subscribe();
    Sse::new(broadcast_to_sse(rx))
        .keep_alive(KeepAlive::new())
        .into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::JobsEnqueued { .. } => "jobs",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}

// ---------------------------------------------------------------------------
// Plan-enforcement guards
// ---------------------------------------------------------------------------

/// Request-scoped guard run by every mutating endpoint: apiRequestsPerDay
/// must have headroom, then the request is counted.
pub(crate) async fn guard_api_request(state: &AppState, caller: &Caller) -> ApiResult<()> {
    let (Some(account_id), Some(keys)) = (caller.account_id, caller.keys()) else {
        return Ok(()); // admin/dev mode
    };

    let usage = sl_db::usage::usage_summary(&state.pool, account_id, keys)
        .await
        .map_err(ApiFailure::from)?;
    if usage.api_requests_today >= state.limits.api_requests_per_day {
        return Err(ApiError::limit_exceeded("apiRequestsPerDay").into());
    }
    sl_db::usage::increment_api_requests(&state.pool, account_id)
        .await
        .map_err(ApiFailure::from)?;
    Ok(())
}

/// Resource-scoped guard for stream/view creation: the full dimension check,
/// first exceeded reported.
pub(crate) async fn guard_creation(state: &AppState, caller: &Caller) -> ApiResult<()> {
    let (Some(account_id), Some(keys)) = (caller.account_id, caller.keys()) else {
        return Ok(());
    };

    let check = sl_limits::enforce(&state.pool, account_id, keys, &state.limits, state.dev_mode)
        .await
        .map_err(ApiFailure::from)?;
    match check.exceeded {
        None => Ok(()),
        Some(dimension) => Err(ApiError::limit_exceeded(dimension.as_str()).into()),
    }
}

/// Shared 404/403 shape for stream lookups.
pub(crate) async fn load_owned_stream(
    state: &AppState,
    caller: &Caller,
    id: Uuid,
) -> ApiResult<sl_db::streams::StreamRow> {
    let stream = sl_db::streams::fetch_stream(&state.pool, id)
        .await
        .map_err(ApiFailure::from)?
        .ok_or_else(|| ApiFailure(ApiError::stream_not_found(id)))?;
    if !caller.owns(stream.owner_key_id) {
        return Err(ApiError::forbidden("stream belongs to another account").into());
    }
    Ok(stream)
}

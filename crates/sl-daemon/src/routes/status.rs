//! Detailed status: DB health, queue stats, per-network progress, integrity
//! summary, stream counts, recent deliveries, per-view health, and a
//! best-effort chain tip from the indexer.

use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ApiFailure, ApiResult};
use crate::state::{uptime_secs, SharedState};

pub(crate) async fn status_handler(State(st): State<SharedState>) -> ApiResult<impl IntoResponse> {
    let db = sl_db::status(&st.pool).await.map_err(ApiFailure::from)?;
    let queue = sl_db::jobs::stats(&st.pool).await.map_err(ApiFailure::from)?;
    let progress = sl_db::progress::list_progress(&st.pool)
        .await
        .map_err(ApiFailure::from)?;
    let missing = sl_db::progress::count_missing(&st.pool)
        .await
        .map_err(ApiFailure::from)?;
    let gaps = sl_db::progress::find_gaps(&st.pool, Some(10))
        .await
        .map_err(ApiFailure::from)?;
    let stream_counts = sl_db::streams::stream_status_counts(&st.pool)
        .await
        .map_err(ApiFailure::from)?;
    let recent_deliveries = sl_db::deliveries::recent_delivery_count(&st.pool, 60)
        .await
        .map_err(ApiFailure::from)?;

    let views: Vec<Value> = st
        .views
        .get_all(None)
        .await
        .into_iter()
        .map(|v| {
            json!({
                "name": v.name,
                "status": v.status,
                "lastProcessedHeight": v.last_processed_height,
                "totalProcessed": v.total_processed,
                "totalErrors": v.total_errors,
                "lastError": v.last_error,
            })
        })
        .collect();

    let streams: Value = stream_counts
        .into_iter()
        .map(|(status, count)| (status, json!(count)))
        .collect::<serde_json::Map<String, Value>>()
        .into();

    Ok(Json(json!({
        "ok": db.ok,
        "uptimeSecs": uptime_secs(),
        "db": {"ok": db.ok, "migrated": db.has_jobs_table},
        "queue": queue,
        "progress": progress,
        "integrity": {"missingBlocks": missing, "gaps": gaps},
        "streams": streams,
        "recentDeliveries": recent_deliveries,
        "views": views,
        "chainTip": chain_tip(&st).await,
    })))
}

/// Best-effort external call; any failure degrades to null.
async fn chain_tip(st: &SharedState) -> Value {
    let Some(base) = &st.indexer_url else {
        return Value::Null;
    };
    let url = format!("{}/v1/tip", base.trim_end_matches('/'));
    match st
        .http
        .get(&url)
        .timeout(Duration::from_secs(2))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => resp.json::<Value>().await.unwrap_or(Value::Null),
        Ok(resp) => {
            debug!(status = resp.status().as_u16(), "chain tip fetch rejected");
            Value::Null
        }
        Err(e) => {
            debug!(error = %e, "chain tip fetch failed");
            Value::Null
        }
    }
}

//! Request/response bodies for the admin surface. Wire names are camelCase;
//! webhook secrets are write-only and never echoed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sl_db::streams::{StreamMetricsRow, StreamRow};
use sl_schemas::{Filter, StreamOptions};
use sl_views::{ViewDefinition, ViewRow};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStreamRequest {
    pub name: String,
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub options: StreamOptions,
    pub webhook_url: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStreamRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub filters: Option<Vec<Filter>>,
    #[serde(default)]
    pub options: Option<StreamOptions>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamResponse {
    pub id: Uuid,
    pub name: String,
    pub status: &'static str,
    pub filters: Vec<Filter>,
    pub options: StreamOptions,
    pub webhook_url: String,
    pub has_secret: bool,
    pub owner_key_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<StreamMetricsResponse>,
}

impl StreamResponse {
    pub fn from_row(row: StreamRow, metrics: Option<StreamMetricsRow>) -> Self {
        Self {
            id: row.id,
            name: row.name,
            status: row.status.as_str(),
            filters: row.filters,
            options: row.options,
            webhook_url: row.webhook_url,
            has_secret: row.webhook_secret.is_some(),
            owner_key_id: row.owner_key_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            metrics: metrics.map(StreamMetricsResponse::from_row),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetricsResponse {
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_triggered_block: Option<i64>,
    pub total_deliveries: i64,
    pub failed_deliveries: i64,
    pub last_error_message: Option<String>,
}

impl StreamMetricsResponse {
    pub fn from_row(row: StreamMetricsRow) -> Self {
        Self {
            last_triggered_at: row.last_triggered_at,
            last_triggered_block: row.last_triggered_block,
            total_deliveries: row.total_deliveries,
            failed_deliveries: row.failed_deliveries,
            last_error_message: row.last_error_message,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub block_height: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub job_id: Option<i64>,
    pub block_height: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    pub from_block: i64,
    pub to_block: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResponse {
    pub job_count: u64,
    pub from_block: i64,
    pub to_block: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFailedResponse {
    pub job_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateSecretResponse {
    pub webhook_secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTransitionResponse {
    pub updated: u64,
}

#[derive(Debug, Deserialize)]
pub struct DeliveriesQuery {
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default, rename = "_limit")]
    pub limit: Option<i64>,
    #[serde(default, rename = "_offset")]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployViewRequest {
    pub name: String,
    pub definition: ViewDefinition,
    #[serde(default)]
    pub reindex: Option<ReplayRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResponse {
    pub id: Uuid,
    pub name: String,
    pub version: i32,
    pub status: String,
    pub schema_name: String,
    pub definition: ViewDefinition,
    pub last_processed_height: Option<i64>,
    pub total_processed: i64,
    pub total_errors: i64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ViewResponse {
    pub fn from_row(row: ViewRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            version: row.version,
            status: row.status,
            schema_name: row.schema_name,
            definition: row.definition,
            last_processed_height: row.last_processed_height,
            total_processed: row.total_processed,
            total_errors: row.total_errors,
            last_error: row.last_error,
            last_error_at: row.last_error_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

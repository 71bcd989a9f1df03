use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use sl_schemas::ApiError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

/// Handler error type: a typed API error, or an internal failure that maps
/// to a 500 without leaking detail.
#[derive(Debug)]
pub struct ApiFailure(pub ApiError);

impl From<ApiError> for ApiFailure {
    fn from(e: ApiError) -> Self {
        ApiFailure(e)
    }
}

impl From<anyhow::Error> for ApiFailure {
    fn from(e: anyhow::Error) -> Self {
        error!(error = %format!("{e:#}"), "internal error");
        ApiFailure(ApiError::internal("internal error"))
    }
}

impl From<sl_query::QueryError> for ApiFailure {
    fn from(e: sl_query::QueryError) -> Self {
        match e {
            sl_query::QueryError::Api(api) => ApiFailure(api),
            sl_query::QueryError::Db(db) => db.into(),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(ErrorBody {
                error: self.0.message,
                code: self.0.code.as_str(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiFailure>;

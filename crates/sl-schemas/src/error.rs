use serde::{Deserialize, Serialize};

/// Stable error codes surfaced as `{"error": ..., "code": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    StreamNotFound,
    ViewNotFound,
    TableNotFound,
    RowNotFound,
    InvalidColumn,
    ValidationError,
    LimitExceeded,
    AuthenticationError,
    AuthorizationError,
    RateLimitError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::StreamNotFound => "STREAM_NOT_FOUND",
            ErrorCode::ViewNotFound => "VIEW_NOT_FOUND",
            ErrorCode::TableNotFound => "TABLE_NOT_FOUND",
            ErrorCode::RowNotFound => "ROW_NOT_FOUND",
            ErrorCode::InvalidColumn => "INVALID_COLUMN",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::LimitExceeded => "LIMIT_EXCEEDED",
            ErrorCode::AuthenticationError => "AUTHENTICATION_ERROR",
            ErrorCode::AuthorizationError => "AUTHORIZATION_ERROR",
            ErrorCode::RateLimitError => "RATE_LIMIT_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ValidationError | ErrorCode::InvalidColumn => 400,
            ErrorCode::AuthenticationError => 401,
            ErrorCode::AuthorizationError => 403,
            ErrorCode::StreamNotFound
            | ErrorCode::ViewNotFound
            | ErrorCode::TableNotFound
            | ErrorCode::RowNotFound => 404,
            ErrorCode::LimitExceeded | ErrorCode::RateLimitError => 429,
            ErrorCode::InternalError => 500,
        }
    }
}

/// Typed API error carried from the inner crates up to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn invalid_column(column: &str) -> Self {
        Self::new(ErrorCode::InvalidColumn, format!("unknown column: {column}"))
    }

    pub fn stream_not_found(id: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::StreamNotFound, format!("stream not found: {id}"))
    }

    pub fn view_not_found(name: &str) -> Self {
        Self::new(ErrorCode::ViewNotFound, format!("view not found: {name}"))
    }

    pub fn table_not_found(table: &str) -> Self {
        Self::new(ErrorCode::TableNotFound, format!("table not found: {table}"))
    }

    pub fn row_not_found() -> Self {
        Self::new(ErrorCode::RowNotFound, "row not found")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthorizationError, message)
    }

    pub fn limit_exceeded(dimension: &str) -> Self {
        Self::new(
            ErrorCode::LimitExceeded,
            format!("plan limit exceeded: {dimension}"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_api_contract() {
        assert_eq!(ErrorCode::ValidationError.http_status(), 400);
        assert_eq!(ErrorCode::AuthenticationError.http_status(), 401);
        assert_eq!(ErrorCode::AuthorizationError.http_status(), 403);
        assert_eq!(ErrorCode::StreamNotFound.http_status(), 404);
        assert_eq!(ErrorCode::RowNotFound.http_status(), 404);
        assert_eq!(ErrorCode::LimitExceeded.http_status(), 429);
        assert_eq!(ErrorCode::RateLimitError.http_status(), 429);
        assert_eq!(ErrorCode::InternalError.http_status(), 500);
    }

    #[test]
    fn codes_serialize_screaming_snake() {
        let s = serde_json::to_string(&ErrorCode::StreamNotFound).unwrap();
        assert_eq!(s, "\"STREAM_NOT_FOUND\"");
    }
}

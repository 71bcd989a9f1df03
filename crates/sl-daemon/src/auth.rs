//! Caller resolution. Key *validation* happens upstream (gateway); this
//! layer resolves the presented key id into the owning account's full key
//! set so ownership checks survive key rotation.

use axum::http::HeaderMap;
use uuid::Uuid;

use sl_schemas::{ApiError, ErrorCode};

use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The resolved caller. `key_ids = None` denotes admin/dev mode: no
/// ownership scoping and no plan enforcement.
#[derive(Debug, Clone)]
pub struct Caller {
    pub account_id: Option<Uuid>,
    pub key_ids: Option<Vec<Uuid>>,
}

impl Caller {
    pub fn admin() -> Self {
        Self {
            account_id: None,
            key_ids: None,
        }
    }

    pub fn keys(&self) -> Option<&[Uuid]> {
        self.key_ids.as_deref()
    }

    /// Ownership test for a resource owned through `owner_key_id`.
    pub fn owns(&self, owner_key_id: Uuid) -> bool {
        match &self.key_ids {
            None => true,
            Some(keys) => keys.contains(&owner_key_id),
        }
    }
}

pub async fn resolve_caller(state: &AppState, headers: &HeaderMap) -> Result<Caller, ApiError> {
    if state.dev_mode {
        return Ok(Caller::admin());
    }

    let Some(raw) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) else {
        return Err(ApiError::new(
            ErrorCode::AuthenticationError,
            "missing API key",
        ));
    };

    let key_id: Uuid = raw.parse().map_err(|_| {
        ApiError::new(ErrorCode::AuthenticationError, "malformed API key")
    })?;

    let Some(account_id) = sl_db::account_for_key(&state.pool, key_id)
        .await
        .map_err(|_| ApiError::internal("key lookup failed"))?
    else {
        return Err(ApiError::new(ErrorCode::AuthenticationError, "unknown API key"));
    };

    let key_ids = sl_db::account_key_ids(&state.pool, account_id)
        .await
        .map_err(|_| ApiError::internal("key set lookup failed"))?;

    Ok(Caller {
        account_id: Some(account_id),
        key_ids: Some(key_ids),
    })
}

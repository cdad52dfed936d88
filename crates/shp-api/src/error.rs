// SPDX-License-Identifier: MIT

//! API error surface: every handler returns `Result<T, ApiError>`, and
//! `IntoResponse` maps each variant onto the status code spec §7 names.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use shp_core::{CoreError, QuotaError};
use shp_herd::HerdError;
use shp_notify::NotifyError;
use shp_store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("insufficient role for this operation")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("herd error: {0}")]
    Herd(#[from] HerdError),

    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),

    #[error("quota error: {0}")]
    Quota(#[from] QuotaError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Validation(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::Quota(QuotaError::AccountDisabled) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Quota(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::Core(CoreError::NotCreatedState) | ApiError::Core(CoreError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            ApiError::Core(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ApiError::Store(StoreError::NotFound) => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Store(StoreError::EmailTaken(_)) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Store(StoreError::InvalidTransition(_)) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ApiError::Herd(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::Notify(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

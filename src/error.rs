//! # error
//!
//! Centralised application error type.
//!
//! Every handler returns `Result<_, AppError>`.  Axum's `IntoResponse` impl
//! turns these into `{"ok": false, "error": "..."}` bodies so API clients
//! always get a machine-readable response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::engine::TickError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Nothing to serve yet (no snapshot, warm-up history).
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Candle feed failed while serving the request.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<TickError> for AppError {
    fn from(err: TickError) -> Self {
        match err {
            TickError::Feed(e) => AppError::Upstream(e.to_string()),
            e @ TickError::InsufficientHistory { .. } => AppError::Unavailable(e.to_string()),
            TickError::Store(e) => AppError::Store(e),
            e @ TickError::Aborted(_) => AppError::Unavailable(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Store(StoreError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::Store(StoreError::Corrupt { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

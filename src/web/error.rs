//! Response envelope and error mapping for the JSON API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::data::convert::ConversionError;
use crate::sync::SyncError;

/// `{"type": "success", "data": ...}` or `{"type": "error", "data": "<message>"}`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Envelope<T> {
    Success(T),
    Error(String),
}

pub fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope::Success(data))
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(Envelope::<()>::Error(self.to_string()))).into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Validation(message) => Self::BadRequest(message),
            err @ SyncError::Upstream(_) => Self::Upstream(err.to_string()),
            err => {
                error!(error = %err, "Cache operation failed");
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<ConversionError> for ApiError {
    fn from(err: ConversionError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        error!(error = %err, "Database query failed");
        Self::Internal(format!("database error: {err}"))
    }
}

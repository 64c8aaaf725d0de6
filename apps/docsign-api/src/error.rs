//! Error types for DocSign API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docsign_core::{DocsignError, ValidationError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] DocsignError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Core(err.into())
    }
}

/// Malformed input is a 400; well-formed input that breaks a rule is a 422
fn validation_status(err: &ValidationError) -> StatusCode {
    match err {
        ValidationError::InvalidImage(_)
        | ValidationError::InvalidPdf(_)
        | ValidationError::InvalidScale(_)
        | ValidationError::NonFiniteCoordinates => StatusCode::BAD_REQUEST,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Core(err) => match err {
                DocsignError::Validation(v) => (validation_status(v), "validation_error"),
                DocsignError::LockedPlacement { .. } => (StatusCode::LOCKED, "locked"),
                DocsignError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
                DocsignError::ExpiredLink => (StatusCode::GONE, "link_expired"),
                DocsignError::AlreadyResolved => (StatusCode::CONFLICT, "already_resolved"),
                DocsignError::NothingToFinalize => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "nothing_to_finalize")
                }
                DocsignError::Render(_) => (StatusCode::INTERNAL_SERVER_ERROR, "render_failed"),
                DocsignError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                DocsignError::GestureBusy => (StatusCode::CONFLICT, "gesture_busy"),
                DocsignError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            },
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            ApiError::Core(DocsignError::Render(e)) => {
                tracing::error!("Render error: {}", e);
                "Failed to render the signed document".to_string()
            }
            ApiError::Core(DocsignError::Unavailable(e)) => {
                tracing::error!("Store unavailable: {}", e);
                "Service temporarily unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": code,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

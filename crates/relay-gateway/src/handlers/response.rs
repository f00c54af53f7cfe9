//! JSON error responses for the HTTP endpoints

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_common::{AppError, ErrorResponse};
use relay_core::DomainError;
use serde::Serialize;
use thiserror::Error;

/// Error returned by HTTP handlers
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub AppError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(AppError::Domain(err))
    }
}

impl ApiError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self.0, "Server error occurred");
        }

        let body = ErrorBody {
            error: ErrorResponse::from(&self.0),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

use crate::utils::error::HabError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Error response with status code, returned by every handler.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub error: ApiError,
}

impl ApiErrorResponse {
    pub fn new(status: StatusCode, error: ApiError) -> Self {
        Self { status, error }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", message))
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<HabError> for ApiErrorResponse {
    fn from(error: HabError) -> Self {
        let (status, code) = match &error {
            HabError::NoDataError { .. } => (StatusCode::NOT_FOUND, "NO_DATA"),
            HabError::NoTariffError { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "NO_TARIFF"),
            HabError::BadRequestError { .. } => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            e if e.is_upstream() => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            tracing::error!(error = %error, "request failed");
        } else {
            tracing::debug!(error = %error, "request rejected");
        }

        Self::new(status, ApiError::new(code, error.to_string()))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiErrorResponse>;

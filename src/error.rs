use axum::{
    Json,
    response::{IntoResponse, Response},
};
use metrics::counter;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    pub error_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

/// Application error kinds, mapped onto spec.md §7's error-kind table.
#[derive(Debug, Error)]
pub enum AppError {
    /// Kind 4: operator requested a category the registry doesn't know about.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Kind 1: transient transport error talking to the config store.
    #[error("Config store error: {0}")]
    ConfigStoreError(String),

    /// Kind 1/2: probe transport failure or unparsable probe response.
    #[error("Probe error: {0}")]
    ProbeError(String),

    /// Kind 5: fatal bootstrap failure (config load, socket bind).
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::BadRequest(_) => ErrorSeverity::Low,
            AppError::ConfigStoreError(_) | AppError::ProbeError(_) => ErrorSeverity::Medium,
            AppError::InternalServerError(_) => ErrorSeverity::High,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::ConfigStoreError(_) => "config_store_error",
            AppError::ProbeError(_) => "probe_error",
            AppError::InternalServerError(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ConfigStoreError(_) | AppError::ProbeError(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::InternalServerError(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();
        let message = self.to_string();

        let _ = counter!("api.errors", "status" => status.as_u16().to_string(), "type" => error_type);

        match self.severity() {
            ErrorSeverity::High => error!(status = %status.as_u16(), %error_type, %message, "request failed"),
            _ => warn!(status = %status.as_u16(), %error_type, %message, "request failed"),
        }

        (
            status,
            Json(ErrorResponse {
                code: status.as_u16(),
                message,
                error_type: error_type.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_400_and_low_severity() {
        let err = AppError::bad_request("no such category");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert_eq!(err.error_type(), "bad_request");
    }

    #[test]
    fn internal_server_error_is_high_severity() {
        let err = AppError::internal_server_error("could not bind");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.severity(), ErrorSeverity::High);
    }
}

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::gateway::GatewayError;

/// HTTP-facing error. Internal details are logged, never sent to the client.
#[derive(Debug)]
pub enum ApiError {
    InvalidInput,
    Unavailable,
    Internal {
        /// Generic text returned to the caller.
        message: &'static str,
        /// Full error, for the server log only.
        detail: String,
    },
}

impl ApiError {
    /// Map a gateway failure; `failure` is the client-facing text used if the
    /// error turns out to be internal.
    pub fn from_gateway(err: GatewayError, failure: &'static str) -> Self {
        match err {
            GatewayError::InvalidInput(_) => ApiError::InvalidInput,
            GatewayError::Unavailable => ApiError::Unavailable,
            other => ApiError::Internal {
                message: failure,
                detail: other.to_string(),
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput => StatusCode::BAD_REQUEST,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput => "INVALID_INPUT",
            ApiError::Unavailable => "UNAVAILABLE",
            ApiError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ApiError::InvalidInput => "Message is required",
            ApiError::Unavailable => "Message service unavailable",
            ApiError::Internal { message, .. } => *message,
        }
    }

    fn log(&self) {
        match self {
            ApiError::Internal { message, detail } => {
                tracing::error!(error = %detail, error_code = self.error_code(), "{message}");
            }
            ApiError::Unavailable => {
                tracing::warn!(error_code = self.error_code(), "Request rejected: no broker channel");
            }
            ApiError::InvalidInput => {
                tracing::debug!(error_code = self.error_code(), "Request rejected: invalid input");
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();

        let body = json!({
            "error": self.user_message(),
            "code": self.error_code(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

//! Request API errors and their JSON envelope.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ccmon_core::CoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Invalid PID format: {0}")]
    InvalidPid(String),

    #[error("Session with PID {0} not found")]
    SessionNotFound(u32),

    #[error("Tool call {0} not found")]
    ToolCallNotFound(String),

    #[error("Origin not allowed: {0}")]
    ForbiddenOrigin(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidPid(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) | Self::ToolCallNotFound(_) => StatusCode::NOT_FOUND,
            Self::ForbiddenOrigin(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidPid(_) => "INVALID_PID",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::ToolCallNotFound(_) => "TOOL_CALL_NOT_FOUND",
            Self::ForbiddenOrigin(_) => "FORBIDDEN_ORIGIN",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        match &self {
            Self::Internal(msg) => tracing::error!(error_code = code, message = %msg, "API error"),
            _ => tracing::debug!(error_code = code, message = %message, "client error"),
        }

        let body = ErrorEnvelope {
            success: false,
            error: ErrorBody { code, message },
        };
        (status, Json(body)).into_response()
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure taxonomy of the session workflow.
/// Every variant maps to a stable `code` so a UI can render kind-specific guidance.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Another workflow operation is already running")]
    AlreadyRunning,

    #[error("Automation backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Automation backend protocol violation: {0}")]
    Protocol(String),

    #[error("Login initialisation failed: {0}")]
    LoginInit(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("No resume available: {0}")]
    NoResume(String),

    #[error("Resume text could not be resolved: {0}")]
    ResumeResolution(String),

    #[error("Bulk apply failed: {0}")]
    BulkApply(String),
}

impl AppError {
    /// Stable machine-readable kind, shared by HTTP responses and progress events.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Precondition(_) => "PRECONDITION_FAILED",
            AppError::AlreadyRunning => "ALREADY_RUNNING",
            AppError::BackendUnreachable(_) => "BACKEND_UNREACHABLE",
            AppError::Protocol(_) => "PROTOCOL_ERROR",
            AppError::LoginInit(_) => "LOGIN_INIT_FAILED",
            AppError::Verification(_) => "VERIFICATION_FAILED",
            AppError::NoResume(_) => "NO_RESUME",
            AppError::ResumeResolution(_) => "RESUME_RESOLUTION_FAILED",
            AppError::BulkApply(_) => "BULK_APPLY_FAILED",
        }
    }

    /// The message carried by the error, without the kind prefix.
    /// Backend business messages come through verbatim.
    pub fn message(&self) -> String {
        match self {
            AppError::AlreadyRunning => {
                "Another login or apply operation is still in progress".to_string()
            }
            AppError::Validation(msg)
            | AppError::Precondition(msg)
            | AppError::BackendUnreachable(msg)
            | AppError::Protocol(msg)
            | AppError::LoginInit(msg)
            | AppError::Verification(msg)
            | AppError::NoResume(msg)
            | AppError::ResumeResolution(msg)
            | AppError::BulkApply(msg) => msg.clone(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Precondition(_) | AppError::AlreadyRunning => StatusCode::CONFLICT,
            AppError::BackendUnreachable(_) | AppError::Protocol(_) => StatusCode::BAD_GATEWAY,
            AppError::Verification(_) => StatusCode::UNAUTHORIZED,
            AppError::LoginInit(_)
            | AppError::NoResume(_)
            | AppError::ResumeResolution(_)
            | AppError::BulkApply(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::BackendUnreachable(msg) => tracing::error!("Backend unreachable: {msg}"),
            AppError::Protocol(msg) => tracing::error!("Backend protocol error: {msg}"),
            _ => tracing::debug!("Request failed: {self}"),
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.message()
            }
        }));

        (status, body).into_response()
    }
}

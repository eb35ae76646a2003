use archdiffer_core::error::CoreError;
use archdiffer_db::store::StoreError;
use archdiffer_pipeline::service::ServiceError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce `{ "error", "code" }` JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `archdiffer_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A Job Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A submission named a comparison type nobody registered.
    #[error("Unknown comparison type '{kind}'")]
    UnknownKind { kind: String, known: Vec<String> },

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Core(e) => AppError::Core(e),
            ServiceError::Store(e) => AppError::Store(e),
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- Job Store errors ---
            AppError::Store(store) => classify_store_error(store),

            AppError::UnknownKind { kind, known } => (
                StatusCode::BAD_REQUEST,
                "UNKNOWN_COMPARISON_TYPE",
                format!(
                    "Unknown comparison type '{kind}' (known: {})",
                    known.join(", ")
                ),
            ),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a Job Store error into an HTTP status, error code, and message.
///
/// - Transient storage failures map to 503 so clients can retry.
/// - Illegal state transitions map to 409.
/// - Everything else that is not a client mistake maps to 500 with a
///   sanitized message.
fn classify_store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    if err.is_unavailable() {
        tracing::warn!(error = %err, "Job Store unavailable");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "STORAGE_UNAVAILABLE",
            "Storage is temporarily unavailable".to_string(),
        );
    }

    match err {
        StoreError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Comparison with id {id} not found"),
        ),
        StoreError::IllegalTransition { .. } => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string())
        }
        StoreError::UnknownKind(kind) => (
            StatusCode::BAD_REQUEST,
            "UNKNOWN_COMPARISON_TYPE",
            format!("Unknown comparison type '{kind}'"),
        ),
        StoreError::Database(sqlx::Error::RowNotFound) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}

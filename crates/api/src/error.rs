use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use stepwise_core::error::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `stepwise_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Publish-time validation failures carry structured detail and use
        // the `{message, errors}` body shape the authoring UI consumes.
        if let AppError::Core(core) = &self {
            match core {
                CoreError::SchemaInvalid { .. } => {
                    return detail_response(
                        "SCHEMA_INVALID",
                        "Schema validation failed",
                        core.detail_messages(),
                    );
                }
                CoreError::ReferentialIntegrityFailed { .. } => {
                    return detail_response(
                        "REFERENTIAL_INTEGRITY_FAILED",
                        "Referential integrity check failed",
                        core.detail_messages(),
                    );
                }
                _ => {}
            }
        }

        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, key } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} not found: {key}"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::InvalidPath(path) => (
                    StatusCode::BAD_REQUEST,
                    "INVALID_PATH",
                    format!("Invalid state path '{path}'"),
                ),
                CoreError::InvalidPageRef(raw) => (
                    StatusCode::BAD_REQUEST,
                    "INVALID_PAGE_REF",
                    format!("Invalid page reference '{raw}'"),
                ),
                CoreError::HookFailed { hook, message } => (
                    StatusCode::BAD_GATEWAY,
                    "HOOK_FAILED",
                    format!("Hook '{hook}' failed: {message}"),
                ),
                CoreError::HookTimeout { hook, timeout_secs } => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "HOOK_TIMEOUT",
                    format!("Hook '{hook}' timed out after {timeout_secs}s"),
                ),
                CoreError::NoHistory => (
                    StatusCode::CONFLICT,
                    "NO_HISTORY",
                    "No navigation history to go back to".to_string(),
                ),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
                // Handled above.
                CoreError::SchemaInvalid { .. } | CoreError::ReferentialIntegrityFailed { .. } => {
                    unreachable!("structured publish errors are handled before this match")
                }
            },

            // --- Database errors ---
            AppError::Database(err) => classify_sqlx_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn detail_response(code: &str, message: &str, errors: Vec<String>) -> Response {
    let body = json!({
        "code": code,
        "message": message,
        "errors": errors,
    });
    (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

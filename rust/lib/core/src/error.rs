use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Clients match on these,
// never on the human-readable message string.

/// Stable error code constants.
///
/// Clients should match on `code` from `{"code": "ALREADY_SIGNED", "message": "..."}`.
/// Codes never change; messages may be reworded.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const ALREADY_SIGNED: &str = "ALREADY_SIGNED";
    pub const DUPLICATE_ADMIN: &str = "DUPLICATE_ADMIN";
    pub const DUPLICATE_MANAGER_ID: &str = "DUPLICATE_MANAGER_ID";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const DENIED: &str = "DENIED";
    pub const LOCKED: &str = "LOCKED";
    pub const SYSTEM_ERROR: &str = "SYSTEM_ERROR";
}

// ── ServiceError ────────────────────────────────────────────────────

/// Error type at the API boundary.
///
/// Each variant maps to a stable error code (see [`error_code`]) and an
/// HTTP status code. The JSON response always includes both:
///
/// ```json
/// {"code": "ALREADY_SIGNED", "message": "you have already signed"}
/// ```
///
/// `System` never carries the underlying cause; callers log it before
/// converting.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Resource does not exist. HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violation. HTTP 409.
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// Input data is invalid. HTTP 400.
    #[error("{0}")]
    Validation(String),

    /// Authentication or authorization failure. HTTP 401.
    #[error("{0}")]
    Denied(String),

    /// Too many failed attempts; `until` is the unix time the lock lifts. HTTP 429.
    #[error("too many attempts, try again after {until}")]
    Locked { until: i64 },

    /// Store or cryptographic failure. HTTP 500.
    #[error("internal error")]
    System,
}

impl ServiceError {
    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_code::NOT_FOUND,
            ServiceError::Conflict { code, .. } => *code,
            ServiceError::Validation(_) => error_code::VALIDATION_FAILED,
            ServiceError::Denied(_) => error_code::DENIED,
            ServiceError::Locked { .. } => error_code::LOCKED,
            ServiceError::System => error_code::SYSTEM_ERROR,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict { .. } => StatusCode::CONFLICT,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Denied(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Locked { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::System => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });
        if let ServiceError::Locked { until } = self {
            body["until"] = serde_json::json!(until);
        }
        (status, axum::Json(body)).into_response()
    }
}

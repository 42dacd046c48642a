use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Unified application error type.
///
/// Every error that can reach a client is represented here so that the
/// status code and the JSON error body are decided in exactly one place.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Generic failure in the generation pipeline. The caller only ever sees
    /// this message; the underlying cause goes to operator diagnostics.
    #[error("Spot generation failed")]
    Generation,

    /// Upstream returned a non-success status that we proxy through as-is.
    #[error("Upstream returned status {status}")]
    UpstreamStatus { status: u16 },

    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("Upstream timed out: {0}")]
    GatewayTimeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    r#type: String,
    code: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::BudgetExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Generation => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamStatus { status } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Unauthorized(_) => "authentication_error",
            Self::Forbidden(_) => "permission_error",
            Self::BadRequest(_) => "invalid_request_error",
            Self::BudgetExceeded(_) => "rate_limit_error",
            Self::Generation => "generation_error",
            Self::UpstreamStatus { .. } | Self::Upstream(_) | Self::GatewayTimeout(_) => {
                "upstream_error"
            }
            Self::Database(_) | Self::Internal(_) => "server_error",
        }
    }

    fn error_code(&self) -> Option<&str> {
        match self {
            Self::BudgetExceeded(_) => Some("budget_exceeded"),
            Self::Unauthorized(_) => Some("missing_credential"),
            Self::GatewayTimeout(_) => Some("upstream_timeout"),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: self.error_type().to_string(),
                code: self.error_code().map(String::from),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        tracing::error!(error = %err, "Database error");
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Service-level error taxonomy. Every failing request surfaces as
/// `{"success": false, "error": "<message>"}` with the mapped status code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// Timeout, 5xx or parse failure from an external feed.
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("{0}")]
    InsufficientData(String),
    #[error("internal server error")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::datasource::FeedError> for AppError {
    fn from(err: crate::datasource::FeedError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl From<crate::db::repo::LedgerError> for AppError {
    fn from(err: crate::db::repo::LedgerError) -> Self {
        use crate::db::repo::LedgerError;
        match err {
            LedgerError::Validation(msg) => AppError::Validation(msg),
            LedgerError::PortfolioMissing(id) => {
                AppError::Conflict(format!("portfolio {} not found", id))
            }
            LedgerError::Db(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::InsufficientData(msg) => (StatusCode::BAD_REQUEST, msg),
            // Internal details stay in the logs, not in the response body.
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

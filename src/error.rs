use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error taxonomy for the tick pipeline and the thin operator-facing HTTP surface.
///
/// Every tick-stage error has a dedicated variant so `run_tracker` can attribute a
/// failed step to exactly one stage without string matching. No variant here is
/// allowed to escape a tick: `orchestrator::run_tick` catches all of them and folds
/// the failure into the run's `RunSummary` instead of propagating.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("fetch failed: {0}")]
    FetchError(String),

    #[error("classification failed: {0}")]
    ClassificationError(String),

    #[error("planning failed: {0}")]
    PlanError(String),

    #[error("send failed: {0}")]
    SendError(String),

    #[error("store operation failed: {0}")]
    StoreError(String),

    #[error("step timed out after {0:?}")]
    TimeoutError(std::time::Duration),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable tag, also used as the `agent_history.error_kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::FetchError(_) => "fetch",
            AppError::ClassificationError(_) => "classification",
            AppError::PlanError(_) => "plan",
            AppError::SendError(_) => "send",
            AppError::StoreError(_) => "store",
            AppError::TimeoutError(_) => "timeout",
            AppError::ConfigError(_) => "config",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Database(_) => "database",
            AppError::Request(_) => "request",
            AppError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) | AppError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Request(_) | AppError::FetchError(_) | AppError::SendError(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::TimeoutError(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ClassificationError(_) | AppError::PlanError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(
            status,
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::BAD_GATEWAY
        ) {
            tracing::error!(kind = self.kind(), "{}", self);
        }

        let message = match &self {
            AppError::Database(_) => "a database error occurred".to_string(),
            AppError::Internal(_) => "an internal error occurred".to_string(),
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: self.kind().to_uppercase(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

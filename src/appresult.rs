use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::error::EngineError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("sign in required")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Engine(err) => match err {
                EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                EngineError::DuplicateSwipe { .. } | EngineError::Conflict(_) => {
                    StatusCode::CONFLICT
                }
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::NotMember { .. } => StatusCode::FORBIDDEN,
                EngineError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Session(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Engine(err) => match err {
                EngineError::Validation(_) => "VALIDATION",
                EngineError::DuplicateSwipe { .. } => "DUPLICATE_SWIPE",
                EngineError::Conflict(_) => "CONFLICT",
                EngineError::NotFound(_) => "NOT_FOUND",
                EngineError::NotMember { .. } => "NOT_MEMBER",
                EngineError::TransientStore(_) => "TRANSIENT_STORE",
                EngineError::Internal(_) => "INTERNAL",
            },
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Session(_) | AppError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else if status != StatusCode::NOT_FOUND && status != StatusCode::UNAUTHORIZED {
            warn!(error = %self, "request rejected");
        }

        let body = json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Engine(err.into())
    }
}

//! Engine error taxonomy.
//!
//! Every engine operation returns [`EngineResult`]. Store failures are
//! classified once, here, so callers can tell a retryable hiccup from a
//! conflict or a missing record without inspecting `sqlx` internals.

use thiserror::Error;
use uuid::Uuid;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input, rejected before any mutation.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{actor} has already swiped on {target}")]
    DuplicateSwipe { actor: Uuid, target: Uuid },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{user} is not a member of room {room}")]
    NotMember { room: Uuid, user: Uuid },

    /// Connection or lock trouble; the caller may retry with backoff.
    #[error("store unavailable: {0}")]
    TransientStore(#[source] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::TransientStore(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => EngineError::NotFound("record"),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                EngineError::Conflict(db.message().to_owned())
            }
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                EngineError::NotFound("referenced record")
            }
            sqlx::Error::Database(ref db) if db.is_check_violation() => {
                EngineError::Validation(db.message().to_owned())
            }
            // busy / locked and friends
            sqlx::Error::Database(_)
            | sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => EngineError::TransientStore(err),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<uuid::Error> for EngineError {
    fn from(err: uuid::Error) -> Self {
        EngineError::Internal(format!("malformed id in store: {err}"))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Internal(format!("malformed json in store: {err}"))
    }
}

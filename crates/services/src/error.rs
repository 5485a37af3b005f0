//! Shared error types for the services crate.

use thiserror::Error;

use learn_core::model::{SessionStateError, TargetError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Coarse classification used at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    StorageUnavailable,
    Internal,
}

impl ErrorKind {
    fn of_storage(err: &StorageError) -> Self {
        match err {
            StorageError::NotFound => ErrorKind::NotFound,
            StorageError::Conflict => ErrorKind::Conflict,
            StorageError::Connection(_) => ErrorKind::StorageUnavailable,
            _ => ErrorKind::Internal,
        }
    }
}

/// Errors emitted by `ReviewService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReviewServiceError {
    #[error("word {0} does not exist")]
    WordNotFound(u64),
    #[error("request id must be 1-{max} characters")]
    InvalidRequestId { max: usize },
    #[error("request id {0} was already used for another word")]
    RequestIdReused(String),
    #[error("word {0} was answered concurrently in this session")]
    DuplicateAnswer(u64),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ReviewServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReviewServiceError::WordNotFound(_) => ErrorKind::NotFound,
            ReviewServiceError::InvalidRequestId { .. }
            | ReviewServiceError::RequestIdReused(_) => ErrorKind::Validation,
            ReviewServiceError::DuplicateAnswer(_) => ErrorKind::Conflict,
            ReviewServiceError::Storage(err) => ErrorKind::of_storage(err),
        }
    }
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("no words available for {0}")]
    EmptyTarget(String),
    #[error("session already completed")]
    Completed,
    #[error("{0}")]
    InvalidPosition(String),
    #[error("word {word} is not part of {target}")]
    WordOutsideTarget { word: u64, target: String },
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Review(#[from] ReviewServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotFound => ErrorKind::NotFound,
            SessionError::EmptyTarget(_)
            | SessionError::InvalidPosition(_)
            | SessionError::WordOutsideTarget { .. }
            | SessionError::Target(_) => ErrorKind::Validation,
            SessionError::Completed => ErrorKind::Conflict,
            SessionError::Review(err) => err.kind(),
            SessionError::Storage(err) => ErrorKind::of_storage(err),
        }
    }
}

impl From<SessionStateError> for SessionError {
    fn from(err: SessionStateError) -> Self {
        match err {
            SessionStateError::EmptyTarget(target) => SessionError::EmptyTarget(target),
            SessionStateError::Completed => SessionError::Completed,
            SessionStateError::InvalidPersistedState(msg) => {
                SessionError::Storage(StorageError::Serialization(msg))
            }
            other => SessionError::InvalidPosition(other.to_string()),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error("invalid word catalog url: {0}")]
    CatalogUrl(String),
}

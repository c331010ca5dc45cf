//! Unified error handling for the core services.
//!
//! Store-level failures stay in [`crate::db::DbError`]; everything a caller can
//! see is a [`ServiceError`], classified by [`ErrorKind`].

use crate::db::DbError;
use thiserror::Error;
use tracing::error;

/// Caller-facing error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or too-short input. User-correctable.
    Validation,
    /// Referenced user or topic does not exist.
    NotFound,
    /// Exists, but the caller is denied.
    Forbidden,
    /// Duplicate identity or "already in target state".
    Conflict,
    /// Store failure. Details are logged, never returned.
    Internal,
}

/// Errors returned by core operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error")]
    Internal(#[source] DbError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }

    pub(crate) fn user_not_found(username: &str) -> Self {
        Self::NotFound(format!("user with username {username} does not exist"))
    }

    pub(crate) fn topic_not_found(path: &str) -> Self {
        Self::NotFound(format!("topic {path} does not exist"))
    }

    /// Internal failure outside the store (hashing, task join). Logged here.
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::from(DbError::Internal(message.into()))
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UniqueViolation(field) => {
                Self::Conflict(format!("{field} is already used by another user"))
            }
            DbError::UserNotFound(username) => Self::user_not_found(&username),
            DbError::TopicNotFound(path) => Self::topic_not_found(&path),
            DbError::TopicExists(path) => Self::Conflict(format!("topic {path} already exists")),
            other => {
                error!(error = %other, "Store failure");
                Self::Internal(other)
            }
        }
    }
}

/// Result type for core operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

//! Shared error types for the services crate.

use thiserror::Error;

use progress_core::model::{
    CourseId, HierarchyError, LearningContentId, ParseIdError, QuizAttemptId, QuizStateError,
    UserId,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Stable classification of an [`EngineError`], for callers that map errors
/// onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyEnrolled,
    NotEnrolled,
    CourseNotFound,
    ContentNotFound,
    AttemptNotFound,
    AttemptAlreadyCompleted,
    ValidationError,
    TransientStoreError,
    InternalError,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AlreadyEnrolled => "already_enrolled",
            ErrorKind::NotEnrolled => "not_enrolled",
            ErrorKind::CourseNotFound => "course_not_found",
            ErrorKind::ContentNotFound => "content_not_found",
            ErrorKind::AttemptNotFound => "attempt_not_found",
            ErrorKind::AttemptAlreadyCompleted => "attempt_already_completed",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::TransientStoreError => "transient_store_error",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

/// Errors emitted by the progress and quiz engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("user {user_id} is already enrolled in course {course_id}")]
    AlreadyEnrolled { user_id: UserId, course_id: CourseId },

    #[error("user {user_id} is not enrolled in course {course_id}")]
    NotEnrolled { user_id: UserId, course_id: CourseId },

    #[error("course {0} not found")]
    CourseNotFound(CourseId),

    #[error("learning content {0} not found")]
    ContentNotFound(LearningContentId),

    #[error("quiz attempt {0} not found")]
    AttemptNotFound(QuizAttemptId),

    #[error("quiz attempt {0} is already completed")]
    AttemptAlreadyCompleted(QuizAttemptId),

    #[error("validation failed: {0}")]
    Validation(String),

    /// The store was busy or unreachable; the whole operation may be replayed.
    #[error("transient store failure: {0}")]
    Transient(#[source] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::AlreadyEnrolled { .. } => ErrorKind::AlreadyEnrolled,
            EngineError::NotEnrolled { .. } => ErrorKind::NotEnrolled,
            EngineError::CourseNotFound(_) => ErrorKind::CourseNotFound,
            EngineError::ContentNotFound(_) => ErrorKind::ContentNotFound,
            EngineError::AttemptNotFound(_) => ErrorKind::AttemptNotFound,
            EngineError::AttemptAlreadyCompleted(_) => ErrorKind::AttemptAlreadyCompleted,
            EngineError::Validation(_) => ErrorKind::ValidationError,
            EngineError::Transient(_) => ErrorKind::TransientStoreError,
            EngineError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Only transient store failures are safe to retry automatically.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        if err.is_transient() {
            EngineError::Transient(err)
        } else {
            EngineError::Internal(err.to_string())
        }
    }
}

impl From<ParseIdError> for EngineError {
    fn from(err: ParseIdError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

impl From<QuizStateError> for EngineError {
    fn from(err: QuizStateError) -> Self {
        match err {
            QuizStateError::AlreadyCompleted(id) => EngineError::AttemptAlreadyCompleted(id),
            other => EngineError::Validation(other.to_string()),
        }
    }
}

impl From<HierarchyError> for EngineError {
    fn from(err: HierarchyError) -> Self {
        EngineError::Internal(err.to_string())
    }
}

impl From<progress_core::Error> for EngineError {
    fn from(err: progress_core::Error) -> Self {
        match err {
            progress_core::Error::Quiz(e) => e.into(),
            progress_core::Error::Id(e) => e.into(),
            progress_core::Error::Hierarchy(e) => e.into(),
            progress_core::Error::Status(e) => EngineError::Validation(e.to_string()),
        }
    }
}

/// Errors emitted while bootstrapping the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineInitError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

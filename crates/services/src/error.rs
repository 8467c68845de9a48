//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{AttemptConfigError, QuestionError, QuestionId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the test-attempt engine.
///
/// Invalidations are outcomes, not errors; these cover caller misuse and
/// storage failures that could not be degraded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("lesson has no questions")]
    NoQuestions,
    #[error("administrators can only preview the test")]
    PreviewOnly,
    #[error("no attempt is running")]
    NotRunning,
    #[error("an attempt is already running")]
    AlreadyRunning,
    #[error("attempt already finished; request a retake")]
    AttemptFinished,
    #[error("current question was already answered")]
    AlreadyAnswered,
    #[error("current question has not been answered")]
    NotAnswered,
    #[error("option {index} does not exist ({options} options)")]
    InvalidOption { index: usize, options: usize },
    #[error("all {max} attempts used")]
    AttemptsExhausted { max: usize },
    #[error("retake is not available")]
    RetakeUnavailable,
    #[error("action requires confirmation first")]
    ConfirmationMissing,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `QuestionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionServiceError {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error("question {0} appears more than once")]
    DuplicateId(QuestionId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] AttemptConfigError),
}

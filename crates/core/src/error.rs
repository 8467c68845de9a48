use thiserror::Error;

use crate::model::{AttemptConfigError, QuestionError, SessionSnapshotError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Config(#[from] AttemptConfigError),
    #[error(transparent)]
    Snapshot(#[from] SessionSnapshotError),
}

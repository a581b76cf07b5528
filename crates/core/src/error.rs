use thiserror::Error;

use crate::model::{HierarchyError, ParseIdError, QuizStateError, StatusParseError};

/// Any validation failure raised by the domain layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    #[error(transparent)]
    Quiz(#[from] QuizStateError),
    #[error(transparent)]
    Status(#[from] StatusParseError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
}

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AnswerOptionId, LearningContentId, QuestionId, QuizAttemptId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizStateError {
    #[error("quiz attempt {0} is already completed")]
    AlreadyCompleted(QuizAttemptId),

    #[error("question points cannot be negative")]
    NegativePoints,

    #[error("question has no options")]
    NoOptions,

    #[error("invalid question kind: {0}")]
    InvalidKind(String),
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionKind {
    /// Exactly one option is expected.
    SingleChoice,
    /// Any subset of options may be correct.
    MultiChoice,
}

impl QuestionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::SingleChoice => "single",
            QuestionKind::MultiChoice => "multi",
        }
    }

    /// # Errors
    ///
    /// Returns `QuizStateError::InvalidKind` for unknown values.
    pub fn parse(s: &str) -> Result<Self, QuizStateError> {
        match s {
            "single" => Ok(QuestionKind::SingleChoice),
            "multi" => Ok(QuestionKind::MultiChoice),
            other => Err(QuizStateError::InvalidKind(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: AnswerOptionId,
    pub is_correct: bool,
    pub is_active: bool,
}

impl AnswerOption {
    #[must_use]
    pub fn correct(id: AnswerOptionId) -> Self {
        Self {
            id,
            is_correct: true,
            is_active: true,
        }
    }

    #[must_use]
    pub fn incorrect(id: AnswerOptionId) -> Self {
        Self {
            id,
            is_correct: false,
            is_active: true,
        }
    }
}

/// A question attached to a quiz-type learning-content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub content_id: LearningContentId,
    pub kind: QuestionKind,
    pub points: BigDecimal,
    pub is_active: bool,
    pub options: Vec<AnswerOption>,
}

impl Question {
    /// Builds an active question.
    ///
    /// # Errors
    ///
    /// Returns `NegativePoints` or `NoOptions`.
    pub fn new(
        id: QuestionId,
        content_id: LearningContentId,
        kind: QuestionKind,
        points: BigDecimal,
        options: Vec<AnswerOption>,
    ) -> Result<Self, QuizStateError> {
        if points < BigDecimal::from(0) {
            return Err(QuizStateError::NegativePoints);
        }
        if options.is_empty() {
            return Err(QuizStateError::NoOptions);
        }
        Ok(Self {
            id,
            content_id,
            kind,
            points,
            is_active: true,
            options,
        })
    }

    #[must_use]
    pub fn option(&self, id: AnswerOptionId) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.id == id)
    }

    /// Number of active options marked correct.
    #[must_use]
    pub fn correct_option_count(&self) -> usize {
        self.options
            .iter()
            .filter(|o| o.is_active && o.is_correct)
            .count()
    }
}

//
// ─── ATTEMPTS ──────────────────────────────────────────────────────────────────
//

/// One learner's timed pass at a quiz.
///
/// Open while `completed_at` is `None`; completion is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizAttempt {
    pub id: QuizAttemptId,
    pub learning_content_id: LearningContentId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_score: Option<BigDecimal>,
    pub time_taken: Option<Duration>,
}

impl QuizAttempt {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Closes the attempt with its final score.
    ///
    /// # Errors
    ///
    /// Returns `QuizStateError::AlreadyCompleted` if the attempt is closed.
    pub fn complete(
        &mut self,
        total_score: BigDecimal,
        now: DateTime<Utc>,
    ) -> Result<(), QuizStateError> {
        if self.is_completed() {
            return Err(QuizStateError::AlreadyCompleted(self.id));
        }
        self.total_score = Some(total_score);
        self.completed_at = Some(now);
        self.time_taken = Some(now - self.started_at);
        Ok(())
    }
}

/// Attempt fields known before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuizAttempt {
    pub learning_content_id: LearningContentId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
}

/// One checked option within an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserAnswer {
    pub quiz_attempt_id: QuizAttemptId,
    pub question_id: QuestionId,
    pub selected_option_id: AnswerOptionId,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

use std::sync::Arc;

use chrono::{DateTime, Utc};
use progress_core::BigDecimal;
use progress_core::model::{
    AnswerOptionId, ContentKind, CourseId, LearningContentId, NewQuizAttempt, Question,
    QuestionId, QuizAttempt, QuizAttemptId, UserAnswer, UserId,
};
use progress_core::scoring::{self, AttemptScore};
use storage::repository::{CatalogRepository, StorageError, TrackingStore, TrackingTx};

use crate::error::EngineError;
use crate::hierarchy_reader::HierarchyReader;
use crate::retry::RetryPolicy;
use crate::unit_of_work::{begin, finish};
use crate::Clock;

/// A closed attempt with its per-question breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredAttempt {
    pub attempt: QuizAttempt,
    pub score: AttemptScore,
}

/// Opens quiz attempts, records answers, and grades attempts.
pub struct QuizService {
    clock: Clock,
    hierarchy: Arc<HierarchyReader>,
    catalog: Arc<dyn CatalogRepository>,
    tracking: Arc<dyn TrackingStore>,
    retry: RetryPolicy,
}

impl QuizService {
    #[must_use]
    pub fn new(
        clock: Clock,
        hierarchy: Arc<HierarchyReader>,
        catalog: Arc<dyn CatalogRepository>,
        tracking: Arc<dyn TrackingStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            clock,
            hierarchy,
            catalog,
            tracking,
            retry,
        }
    }

    /// Open a new attempt at a quiz item.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ContentNotFound` for unknown items,
    /// `EngineError::Validation` if the item is not a quiz, and
    /// `EngineError::NotEnrolled` if the learner is not in the course.
    pub async fn create_attempt(
        &self,
        user_id: UserId,
        content_id: LearningContentId,
    ) -> Result<QuizAttempt, EngineError> {
        let (tree, parents) = self.hierarchy.parents(content_id).await?;
        let kind = tree
            .content(content_id)
            .map(|c| c.kind)
            .ok_or(EngineError::ContentNotFound(content_id))?;
        if kind != ContentKind::Quiz {
            return Err(EngineError::Validation(format!(
                "learning content {content_id} is a {} item, not a quiz",
                kind.as_str()
            )));
        }

        let attempt = self
            .retry
            .run("create_quiz_attempt", || {
                self.create_once(user_id, content_id, parents.course_id)
            })
            .await?;

        tracing::info!(%user_id, %content_id, attempt_id = %attempt.id, "quiz attempt opened");
        Ok(attempt)
    }

    /// Record the options a learner checked, one row per option.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::AttemptNotFound`, `EngineError::AttemptAlreadyCompleted`,
    /// or `EngineError::Validation` if a question or option does not belong to
    /// the attempt's quiz.
    pub async fn submit_answers(
        &self,
        attempt_id: QuizAttemptId,
        selections: &[(QuestionId, AnswerOptionId)],
    ) -> Result<Vec<UserAnswer>, EngineError> {
        let answers = self
            .retry
            .run("submit_quiz_answers", || self.submit_once(attempt_id, selections))
            .await?;

        tracing::debug!(%attempt_id, answers = answers.len(), "quiz answers recorded");
        Ok(answers)
    }

    /// Grade an open attempt and close it.
    ///
    /// # Errors
    ///
    /// Same as [`QuizService::score_attempt_detailed`].
    pub async fn score_attempt(&self, attempt_id: QuizAttemptId) -> Result<BigDecimal, EngineError> {
        Ok(self.score_attempt_detailed(attempt_id).await?.score.total)
    }

    /// Grade an open attempt, close it, and return the breakdown.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::AttemptNotFound` or
    /// `EngineError::AttemptAlreadyCompleted`; a closed attempt is never
    /// re-scored.
    pub async fn score_attempt_detailed(
        &self,
        attempt_id: QuizAttemptId,
    ) -> Result<ScoredAttempt, EngineError> {
        let scored = self
            .retry
            .run("score_quiz_attempt", || self.score_once(attempt_id))
            .await?;

        tracing::info!(
            %attempt_id,
            total = %scored.score.total,
            max = %scored.score.max,
            correct = scored.score.correct_count(),
            "quiz attempt scored"
        );
        Ok(scored)
    }

    async fn create_once(
        &self,
        user_id: UserId,
        content_id: LearningContentId,
        course_id: CourseId,
    ) -> Result<QuizAttempt, EngineError> {
        let now = self.clock.now();
        let mut tx = begin(self.tracking.as_ref()).await?;
        let result = open_attempt(tx.as_mut(), user_id, content_id, course_id, now).await;
        finish(tx, result).await
    }

    async fn submit_once(
        &self,
        attempt_id: QuizAttemptId,
        selections: &[(QuestionId, AnswerOptionId)],
    ) -> Result<Vec<UserAnswer>, EngineError> {
        let mut tx = begin(self.tracking.as_ref()).await?;
        let result = self.record_answers(tx.as_mut(), attempt_id, selections).await;
        finish(tx, result).await
    }

    async fn score_once(&self, attempt_id: QuizAttemptId) -> Result<ScoredAttempt, EngineError> {
        let now = self.clock.now();
        let mut tx = begin(self.tracking.as_ref()).await?;
        let result = self.grade(tx.as_mut(), attempt_id, now).await;
        finish(tx, result).await
    }

    async fn record_answers(
        &self,
        tx: &mut dyn TrackingTx,
        attempt_id: QuizAttemptId,
        selections: &[(QuestionId, AnswerOptionId)],
    ) -> Result<Vec<UserAnswer>, EngineError> {
        let attempt = open_attempt_by_id(tx, attempt_id).await?;
        let questions = self
            .catalog
            .questions_for_content(attempt.learning_content_id)
            .await?;

        let mut answers = Vec::with_capacity(selections.len());
        for &(question_id, option_id) in selections {
            validate_selection(&questions, question_id, option_id)?;
            answers.push(UserAnswer {
                quiz_attempt_id: attempt_id,
                question_id,
                selected_option_id: option_id,
            });
        }

        tx.append_answers(&answers).await?;
        Ok(answers)
    }

    async fn grade(
        &self,
        tx: &mut dyn TrackingTx,
        attempt_id: QuizAttemptId,
        now: DateTime<Utc>,
    ) -> Result<ScoredAttempt, EngineError> {
        let mut attempt = open_attempt_by_id(tx, attempt_id).await?;
        let questions = self
            .catalog
            .questions_for_content(attempt.learning_content_id)
            .await?;
        let answers = tx.answers_for_attempt(attempt_id).await?;

        let score = scoring::score_attempt(&questions, &answers);
        attempt.complete(score.total.clone(), now)?;

        match tx.complete_quiz_attempt(&attempt).await {
            Ok(()) => Ok(ScoredAttempt { attempt, score }),
            Err(StorageError::Conflict) => Err(EngineError::AttemptAlreadyCompleted(attempt_id)),
            Err(StorageError::NotFound) => Err(EngineError::AttemptNotFound(attempt_id)),
            Err(err) => Err(err.into()),
        }
    }
}

async fn open_attempt(
    tx: &mut dyn TrackingTx,
    user_id: UserId,
    content_id: LearningContentId,
    course_id: CourseId,
    now: DateTime<Utc>,
) -> Result<QuizAttempt, EngineError> {
    if tx.course_info(user_id, course_id).await?.is_none() {
        return Err(EngineError::NotEnrolled { user_id, course_id });
    }
    let attempt = tx
        .insert_quiz_attempt(&NewQuizAttempt {
            learning_content_id: content_id,
            user_id,
            started_at: now,
        })
        .await?;
    Ok(attempt)
}

async fn open_attempt_by_id(
    tx: &mut dyn TrackingTx,
    attempt_id: QuizAttemptId,
) -> Result<QuizAttempt, EngineError> {
    let attempt = tx
        .quiz_attempt(attempt_id)
        .await?
        .ok_or(EngineError::AttemptNotFound(attempt_id))?;
    if attempt.is_completed() {
        return Err(EngineError::AttemptAlreadyCompleted(attempt_id));
    }
    Ok(attempt)
}

fn validate_selection(
    questions: &[Question],
    question_id: QuestionId,
    option_id: AnswerOptionId,
) -> Result<(), EngineError> {
    let question = questions
        .iter()
        .find(|q| q.id == question_id)
        .ok_or_else(|| {
            EngineError::Validation(format!("question {question_id} is not part of this quiz"))
        })?;
    if question.option(option_id).is_none() {
        return Err(EngineError::Validation(format!(
            "option {option_id} does not belong to question {question_id}"
        )));
    }
    Ok(())
}

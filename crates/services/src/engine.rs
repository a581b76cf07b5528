use std::sync::Arc;

use progress_core::BigDecimal;
use progress_core::model::{
    AnswerOptionId, CourseId, EnrollmentStatus, LearningContentId, QuestionId, QuizAttempt,
    QuizAttemptId, UserAnswer, UserCourseInfo, UserId, UserLearningProgress,
};
use storage::repository::Storage;

use crate::config::EngineConfig;
use crate::enrollment_service::EnrollmentService;
use crate::error::{EngineError, EngineInitError};
use crate::hierarchy_reader::HierarchyReader;
use crate::locks::CourseLocks;
use crate::progress_service::{CourseProgress, ProgressService};
use crate::quiz_service::{QuizService, ScoredAttempt};
use crate::Clock;

/// Outcome of grading a quiz attempt and applying it to progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizOutcome {
    pub scored: ScoredAttempt,
    pub passed: bool,
    /// The quiz content row after completion, when the attempt passed.
    pub progress: Option<UserLearningProgress>,
}

/// Wires the storage backend to every engine service.
#[derive(Clone)]
pub struct ProgressEngine {
    config: EngineConfig,
    storage: Storage,
    enrollment: Arc<EnrollmentService>,
    progress: Arc<ProgressService>,
    quizzes: Arc<QuizService>,
}

impl ProgressEngine {
    #[must_use]
    pub fn new(storage: Storage, clock: Clock, config: EngineConfig) -> Self {
        let hierarchy = Arc::new(HierarchyReader::new(Arc::clone(&storage.catalog)));
        let locks = CourseLocks::new();
        let retry = config.retry_policy();

        let enrollment = Arc::new(EnrollmentService::new(
            clock,
            Arc::clone(&hierarchy),
            Arc::clone(&storage.tracking),
            locks.clone(),
            retry,
        ));
        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::clone(&hierarchy),
            Arc::clone(&storage.tracking),
            locks,
            retry,
        ));
        let quizzes = Arc::new(QuizService::new(
            clock,
            Arc::clone(&hierarchy),
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.tracking),
            retry,
        ));

        Self {
            config,
            storage,
            enrollment,
            progress,
            quizzes,
        }
    }

    /// Engine over a fresh in-memory store with default settings.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(Storage::in_memory(), clock, EngineConfig::default())
    }

    /// Build an engine backed by `SQLite` at `config.database_url`.
    ///
    /// # Errors
    ///
    /// Returns `EngineInitError` if the database cannot be opened or migrated.
    pub async fn new_sqlite(config: EngineConfig, clock: Clock) -> Result<Self, EngineInitError> {
        let storage = Storage::sqlite(&config.database_url).await?;
        tracing::info!(database_url = %config.database_url, "engine storage ready");
        Ok(Self::new(storage, clock, config))
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// # Errors
    ///
    /// See [`EnrollmentService::enroll`].
    pub async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<UserCourseInfo, EngineError> {
        self.enrollment.enroll(user_id, course_id).await
    }

    /// # Errors
    ///
    /// See [`EnrollmentService::enroll_with_status`].
    pub async fn enroll_with_status(
        &self,
        user_id: UserId,
        course_id: CourseId,
        status: EnrollmentStatus,
    ) -> Result<UserCourseInfo, EngineError> {
        self.enrollment
            .enroll_with_status(user_id, course_id, status)
            .await
    }

    /// # Errors
    ///
    /// See [`ProgressService::start_learning_content`].
    pub async fn start_learning_content(
        &self,
        user_id: UserId,
        content_id: LearningContentId,
    ) -> Result<UserLearningProgress, EngineError> {
        self.progress.start_learning_content(user_id, content_id).await
    }

    /// # Errors
    ///
    /// See [`ProgressService::complete_learning_content`].
    pub async fn complete_learning_content(
        &self,
        user_id: UserId,
        content_id: LearningContentId,
    ) -> Result<UserLearningProgress, EngineError> {
        self.progress
            .complete_learning_content(user_id, content_id)
            .await
    }

    /// # Errors
    ///
    /// See [`ProgressService::course_progress`].
    pub async fn course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgress, EngineError> {
        self.progress.course_progress(user_id, course_id).await
    }

    /// # Errors
    ///
    /// See [`QuizService::create_attempt`].
    pub async fn create_quiz_attempt(
        &self,
        user_id: UserId,
        content_id: LearningContentId,
    ) -> Result<QuizAttempt, EngineError> {
        self.quizzes.create_attempt(user_id, content_id).await
    }

    /// # Errors
    ///
    /// See [`QuizService::submit_answers`].
    pub async fn submit_quiz_answers(
        &self,
        attempt_id: QuizAttemptId,
        selections: &[(QuestionId, AnswerOptionId)],
    ) -> Result<Vec<UserAnswer>, EngineError> {
        self.quizzes.submit_answers(attempt_id, selections).await
    }

    /// # Errors
    ///
    /// See [`QuizService::score_attempt`].
    pub async fn score_attempt(&self, attempt_id: QuizAttemptId) -> Result<BigDecimal, EngineError> {
        self.quizzes.score_attempt(attempt_id).await
    }

    /// Score an attempt and, if it reaches the pass ratio, complete the quiz
    /// item through the usual rollup.
    ///
    /// The score is committed before the rollup runs; a failed rollup leaves
    /// the attempt closed and can be repeated with
    /// [`ProgressEngine::complete_learning_content`].
    ///
    /// # Errors
    ///
    /// Returns the errors of [`QuizService::score_attempt_detailed`] and
    /// [`ProgressService::complete_learning_content`].
    #[tracing::instrument(skip(self), fields(passed = tracing::field::Empty))]
    pub async fn finish_quiz(&self, attempt_id: QuizAttemptId) -> Result<QuizOutcome, EngineError> {
        let scored = self.quizzes.score_attempt_detailed(attempt_id).await?;
        let passed = scored.score.passes(&self.config.quiz_pass_ratio);
        tracing::Span::current().record("passed", passed);

        let progress = if passed {
            let attempt = &scored.attempt;
            Some(
                self.progress
                    .complete_with_score(
                        attempt.user_id,
                        attempt.learning_content_id,
                        Some(scored.score.total.clone()),
                    )
                    .await?,
            )
        } else {
            None
        };

        Ok(QuizOutcome {
            scored,
            passed,
            progress,
        })
    }
}

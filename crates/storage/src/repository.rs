use std::sync::Arc;

use async_trait::async_trait;
use progress_core::model::{
    CompletionCount, CourseId, CourseTree, LearningContentId, ModuleId, NewQuizAttempt, Question,
    QuizAttempt, QuizAttemptId, SubModuleId, UserAnswer, UserCourseInfo, UserId,
    UserLearningProgress, UserModuleInfo, UserSubModuleInfo,
};
use thiserror::Error;

pub use crate::memory::InMemoryRepository;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    /// Lock contention or pool exhaustion; the whole operation may be retried.
    #[error("store busy: {0}")]
    Busy(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// True for failures that go away when the operation is replayed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Busy(_) | StorageError::Connection(_))
    }
}

/// Read/write access to the course catalog.
///
/// The engine only reads from it; writes exist for seeding and tests.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Persist a whole course hierarchy, replacing node titles and positions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the tree cannot be stored.
    async fn upsert_course_tree(&self, tree: &CourseTree) -> Result<(), StorageError>;

    /// Load a course hierarchy; `Ok(None)` when the course does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn course_tree(&self, course_id: CourseId) -> Result<Option<CourseTree>, StorageError>;

    /// Which course owns a learning-content item.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn course_for_content(
        &self,
        content_id: LearningContentId,
    ) -> Result<Option<CourseId>, StorageError>;

    /// Persist a question together with its options.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// All questions (active or not) attached to a quiz item, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn questions_for_content(
        &self,
        content_id: LearningContentId,
    ) -> Result<Vec<Question>, StorageError>;
}

/// Opens units of work over the per-learner tracking rows.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Busy` or `StorageError::Connection` if no
    /// transaction can be started.
    async fn begin(&self) -> Result<Box<dyn TrackingTx>, StorageError>;
}

/// One transaction over the tracking rows.
///
/// Nothing written through a `TrackingTx` is visible to other transactions
/// until `commit`. Dropping the transaction without committing discards it.
#[async_trait]
pub trait TrackingTx: Send {
    async fn course_info(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<UserCourseInfo>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the (user, course) row exists.
    async fn insert_course_info(&mut self, info: &UserCourseInfo) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the row does not exist.
    async fn update_course_info(&mut self, info: &UserCourseInfo) -> Result<(), StorageError>;

    /// Insert unless a row exists; returns whether a row was created.
    async fn insert_module_info(&mut self, info: &UserModuleInfo) -> Result<bool, StorageError>;

    async fn module_info(
        &mut self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<UserModuleInfo>, StorageError>;

    async fn update_module_info(&mut self, info: &UserModuleInfo) -> Result<(), StorageError>;

    /// Insert unless a row exists; returns whether a row was created.
    async fn insert_sub_module_info(
        &mut self,
        info: &UserSubModuleInfo,
    ) -> Result<bool, StorageError>;

    async fn sub_module_info(
        &mut self,
        user_id: UserId,
        sub_module_id: SubModuleId,
    ) -> Result<Option<UserSubModuleInfo>, StorageError>;

    async fn update_sub_module_info(
        &mut self,
        info: &UserSubModuleInfo,
    ) -> Result<(), StorageError>;

    /// Insert unless a row exists; returns whether a row was created.
    async fn insert_learning_progress(
        &mut self,
        progress: &UserLearningProgress,
    ) -> Result<bool, StorageError>;

    async fn learning_progress(
        &mut self,
        user_id: UserId,
        content_id: LearningContentId,
    ) -> Result<Option<UserLearningProgress>, StorageError>;

    async fn update_learning_progress(
        &mut self,
        progress: &UserLearningProgress,
    ) -> Result<(), StorageError>;

    /// Counts the user's learning-progress rows among `content_ids`.
    async fn count_learning_progress(
        &mut self,
        user_id: UserId,
        content_ids: &[LearningContentId],
    ) -> Result<CompletionCount, StorageError>;

    /// Counts the user's sub-module rows among `sub_module_ids`.
    async fn count_sub_module_infos(
        &mut self,
        user_id: UserId,
        sub_module_ids: &[SubModuleId],
    ) -> Result<CompletionCount, StorageError>;

    /// Counts the user's module rows among `module_ids`.
    async fn count_module_infos(
        &mut self,
        user_id: UserId,
        module_ids: &[ModuleId],
    ) -> Result<CompletionCount, StorageError>;

    async fn insert_quiz_attempt(
        &mut self,
        attempt: &NewQuizAttempt,
    ) -> Result<QuizAttempt, StorageError>;

    async fn quiz_attempt(
        &mut self,
        id: QuizAttemptId,
    ) -> Result<Option<QuizAttempt>, StorageError>;

    /// Persist the closing fields of an attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the stored attempt is already
    /// completed, `StorageError::NotFound` if it does not exist.
    async fn complete_quiz_attempt(&mut self, attempt: &QuizAttempt) -> Result<(), StorageError>;

    async fn append_answers(&mut self, answers: &[UserAnswer]) -> Result<(), StorageError>;

    async fn answers_for_attempt(
        &mut self,
        id: QuizAttemptId,
    ) -> Result<Vec<UserAnswer>, StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub tracking: Arc<dyn TrackingStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wires one repository implementing both traits.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: CatalogRepository + TrackingStore + Clone + 'static,
    {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let tracking: Arc<dyn TrackingStore> = Arc::new(repo);
        Self { catalog, tracking }
    }
}

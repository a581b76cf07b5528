use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use progress_core::model::{
    CompletionCount, CourseId, CourseTree, LearningContentId, ModuleId, NewQuizAttempt, Question,
    QuestionId, QuizAttempt, QuizAttemptId, SubModuleId, UserAnswer, UserCourseInfo, UserId,
    UserLearningProgress, UserModuleInfo, UserSubModuleInfo,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::repository::{CatalogRepository, StorageError, TrackingStore, TrackingTx};

#[derive(Default)]
struct CatalogState {
    courses: HashMap<CourseId, CourseTree>,
    questions: BTreeMap<QuestionId, Question>,
}

#[derive(Debug, Clone, Default)]
struct TrackingState {
    courses: HashMap<(UserId, CourseId), UserCourseInfo>,
    modules: HashMap<(UserId, ModuleId), UserModuleInfo>,
    sub_modules: HashMap<(UserId, SubModuleId), UserSubModuleInfo>,
    progress: HashMap<(UserId, LearningContentId), UserLearningProgress>,
    attempts: BTreeMap<QuizAttemptId, QuizAttempt>,
    answers: Vec<UserAnswer>,
    last_attempt_id: u64,
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Each transaction works on a private copy of the tracking state and holds
/// the write lock until it commits or is dropped, so transactions are fully
/// serialized.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    catalog: Arc<Mutex<CatalogState>>,
    tracking: Arc<AsyncMutex<TrackingState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_course_tree(&self, tree: &CourseTree) -> Result<(), StorageError> {
        let mut guard = self
            .catalog
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.courses.insert(tree.id(), tree.clone());
        Ok(())
    }

    async fn course_tree(&self, course_id: CourseId) -> Result<Option<CourseTree>, StorageError> {
        let guard = self
            .catalog
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.courses.get(&course_id).cloned())
    }

    async fn course_for_content(
        &self,
        content_id: LearningContentId,
    ) -> Result<Option<CourseId>, StorageError> {
        let guard = self
            .catalog
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .courses
            .values()
            .find(|tree| tree.content(content_id).is_some())
            .map(CourseTree::id))
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self
            .catalog
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.questions.insert(question.id, question.clone());
        Ok(())
    }

    async fn questions_for_content(
        &self,
        content_id: LearningContentId,
    ) -> Result<Vec<Question>, StorageError> {
        let guard = self
            .catalog
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .questions
            .values()
            .filter(|q| q.content_id == content_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TrackingStore for InMemoryRepository {
    async fn begin(&self) -> Result<Box<dyn TrackingTx>, StorageError> {
        let guard = Arc::clone(&self.tracking).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<TrackingState>,
    working: TrackingState,
}

fn count<K, V, I>(
    rows: &HashMap<K, V>,
    keys: I,
    is_completed: impl Fn(&V) -> bool,
) -> CompletionCount
where
    K: std::hash::Hash + Eq,
    I: IntoIterator<Item = K>,
{
    let mut counts = CompletionCount::default();
    for key in keys {
        if let Some(row) = rows.get(&key) {
            counts.total += 1;
            if is_completed(row) {
                counts.completed += 1;
            }
        }
    }
    counts
}

#[async_trait]
impl TrackingTx for InMemoryTx {
    async fn course_info(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<UserCourseInfo>, StorageError> {
        Ok(self.working.courses.get(&(user_id, course_id)).cloned())
    }

    async fn insert_course_info(&mut self, info: &UserCourseInfo) -> Result<(), StorageError> {
        let key = (info.user_id, info.course_id);
        if self.working.courses.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        self.working.courses.insert(key, info.clone());
        Ok(())
    }

    async fn update_course_info(&mut self, info: &UserCourseInfo) -> Result<(), StorageError> {
        let row = self
            .working
            .courses
            .get_mut(&(info.user_id, info.course_id))
            .ok_or(StorageError::NotFound)?;
        *row = info.clone();
        Ok(())
    }

    async fn insert_module_info(&mut self, info: &UserModuleInfo) -> Result<bool, StorageError> {
        let key = (info.user_id, info.module_id);
        if self.working.modules.contains_key(&key) {
            return Ok(false);
        }
        self.working.modules.insert(key, info.clone());
        Ok(true)
    }

    async fn module_info(
        &mut self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<UserModuleInfo>, StorageError> {
        Ok(self.working.modules.get(&(user_id, module_id)).cloned())
    }

    async fn update_module_info(&mut self, info: &UserModuleInfo) -> Result<(), StorageError> {
        let row = self
            .working
            .modules
            .get_mut(&(info.user_id, info.module_id))
            .ok_or(StorageError::NotFound)?;
        *row = info.clone();
        Ok(())
    }

    async fn insert_sub_module_info(
        &mut self,
        info: &UserSubModuleInfo,
    ) -> Result<bool, StorageError> {
        let key = (info.user_id, info.sub_module_id);
        if self.working.sub_modules.contains_key(&key) {
            return Ok(false);
        }
        self.working.sub_modules.insert(key, info.clone());
        Ok(true)
    }

    async fn sub_module_info(
        &mut self,
        user_id: UserId,
        sub_module_id: SubModuleId,
    ) -> Result<Option<UserSubModuleInfo>, StorageError> {
        Ok(self.working.sub_modules.get(&(user_id, sub_module_id)).cloned())
    }

    async fn update_sub_module_info(
        &mut self,
        info: &UserSubModuleInfo,
    ) -> Result<(), StorageError> {
        let row = self
            .working
            .sub_modules
            .get_mut(&(info.user_id, info.sub_module_id))
            .ok_or(StorageError::NotFound)?;
        *row = info.clone();
        Ok(())
    }

    async fn insert_learning_progress(
        &mut self,
        progress: &UserLearningProgress,
    ) -> Result<bool, StorageError> {
        let key = (progress.user_id, progress.learning_content_id);
        if self.working.progress.contains_key(&key) {
            return Ok(false);
        }
        self.working.progress.insert(key, progress.clone());
        Ok(true)
    }

    async fn learning_progress(
        &mut self,
        user_id: UserId,
        content_id: LearningContentId,
    ) -> Result<Option<UserLearningProgress>, StorageError> {
        Ok(self.working.progress.get(&(user_id, content_id)).cloned())
    }

    async fn update_learning_progress(
        &mut self,
        progress: &UserLearningProgress,
    ) -> Result<(), StorageError> {
        let row = self
            .working
            .progress
            .get_mut(&(progress.user_id, progress.learning_content_id))
            .ok_or(StorageError::NotFound)?;
        *row = progress.clone();
        Ok(())
    }

    async fn count_learning_progress(
        &mut self,
        user_id: UserId,
        content_ids: &[LearningContentId],
    ) -> Result<CompletionCount, StorageError> {
        Ok(count(
            &self.working.progress,
            content_ids.iter().map(|id| (user_id, *id)),
            UserLearningProgress::is_completed,
        ))
    }

    async fn count_sub_module_infos(
        &mut self,
        user_id: UserId,
        sub_module_ids: &[SubModuleId],
    ) -> Result<CompletionCount, StorageError> {
        Ok(count(
            &self.working.sub_modules,
            sub_module_ids.iter().map(|id| (user_id, *id)),
            UserSubModuleInfo::is_completed,
        ))
    }

    async fn count_module_infos(
        &mut self,
        user_id: UserId,
        module_ids: &[ModuleId],
    ) -> Result<CompletionCount, StorageError> {
        Ok(count(
            &self.working.modules,
            module_ids.iter().map(|id| (user_id, *id)),
            UserModuleInfo::is_completed,
        ))
    }

    async fn insert_quiz_attempt(
        &mut self,
        attempt: &NewQuizAttempt,
    ) -> Result<QuizAttempt, StorageError> {
        self.working.last_attempt_id += 1;
        let stored = QuizAttempt {
            id: QuizAttemptId::new(self.working.last_attempt_id),
            learning_content_id: attempt.learning_content_id,
            user_id: attempt.user_id,
            started_at: attempt.started_at,
            completed_at: None,
            total_score: None,
            time_taken: None,
        };
        self.working.attempts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn quiz_attempt(
        &mut self,
        id: QuizAttemptId,
    ) -> Result<Option<QuizAttempt>, StorageError> {
        Ok(self.working.attempts.get(&id).cloned())
    }

    async fn complete_quiz_attempt(&mut self, attempt: &QuizAttempt) -> Result<(), StorageError> {
        let row = self
            .working
            .attempts
            .get_mut(&attempt.id)
            .ok_or(StorageError::NotFound)?;
        if row.is_completed() {
            return Err(StorageError::Conflict);
        }
        row.completed_at = attempt.completed_at;
        row.total_score.clone_from(&attempt.total_score);
        row.time_taken = attempt.time_taken;
        Ok(())
    }

    async fn append_answers(&mut self, answers: &[UserAnswer]) -> Result<(), StorageError> {
        for answer in answers {
            if !self.working.attempts.contains_key(&answer.quiz_attempt_id) {
                return Err(StorageError::NotFound);
            }
        }
        self.working.answers.extend_from_slice(answers);
        Ok(())
    }

    async fn answers_for_attempt(
        &mut self,
        id: QuizAttemptId,
    ) -> Result<Vec<UserAnswer>, StorageError> {
        Ok(self
            .working
            .answers
            .iter()
            .filter(|a| a.quiz_attempt_id == id)
            .copied()
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{ContentKind, LearningStatus};
    use progress_core::time::fixed_now;

    fn tree() -> CourseTree {
        let mut tree = CourseTree::new(CourseId::new(1), "Impressionism").unwrap();
        tree.add_module(ModuleId::new(1), "Monet").unwrap();
        tree.add_sub_module(SubModuleId::new(1), ModuleId::new(1), "Water lilies")
            .unwrap();
        tree.add_content(
            LearningContentId::new(7),
            SubModuleId::new(1),
            ContentKind::Image,
            "Nympheas",
        )
        .unwrap();
        tree
    }

    #[tokio::test]
    async fn catalog_resolves_content_owner() {
        let repo = InMemoryRepository::new();
        repo.upsert_course_tree(&tree()).await.unwrap();

        let owner = repo
            .course_for_content(LearningContentId::new(7))
            .await
            .unwrap();
        assert_eq!(owner, Some(CourseId::new(1)));
        assert!(
            repo.course_for_content(LearningContentId::new(8))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(3);
        let row = UserLearningProgress::enrolled(user, LearningContentId::new(7));

        {
            let mut tx = repo.begin().await.unwrap();
            assert!(tx.insert_learning_progress(&row).await.unwrap());
        }

        let mut tx = repo.begin().await.unwrap();
        assert!(
            tx.learning_progress(user, LearningContentId::new(7))
                .await
                .unwrap()
                .is_none()
        );
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn committed_writes_are_visible_and_inserts_skip_existing() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(3);
        let mut row = UserLearningProgress::enrolled(user, LearningContentId::new(7));

        let mut tx = repo.begin().await.unwrap();
        tx.insert_learning_progress(&row).await.unwrap();
        tx.commit().await.unwrap();

        row.complete(fixed_now());
        let mut tx = repo.begin().await.unwrap();
        assert!(!tx.insert_learning_progress(&row).await.unwrap());
        let stored = tx
            .learning_progress(user, LearningContentId::new(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, LearningStatus::InProgress);

        tx.update_learning_progress(&row).await.unwrap();
        let counts = tx
            .count_learning_progress(user, &[LearningContentId::new(7), LearningContentId::new(8)])
            .await
            .unwrap();
        assert_eq!(counts, CompletionCount::new(1, 1));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn completing_a_closed_attempt_conflicts() {
        let repo = InMemoryRepository::new();
        let mut tx = repo.begin().await.unwrap();
        let mut attempt = tx
            .insert_quiz_attempt(&NewQuizAttempt {
                learning_content_id: LearningContentId::new(7),
                user_id: UserId::new(1),
                started_at: fixed_now(),
            })
            .await
            .unwrap();
        assert_eq!(attempt.id, QuizAttemptId::new(1));

        attempt
            .complete(progress_core::BigDecimal::from(3), fixed_now())
            .unwrap();
        tx.complete_quiz_attempt(&attempt).await.unwrap();
        let err = tx.complete_quiz_attempt(&attempt).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }
}

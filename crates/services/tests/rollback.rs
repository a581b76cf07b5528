mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use progress_core::model::{
    CompletionCount, CourseId, LearningContentId, LearningStatus, ModuleId, NewQuizAttempt,
    QuizAttempt, QuizAttemptId, SubModuleId, UserAnswer, UserCourseInfo, UserId,
    UserLearningProgress, UserModuleInfo, UserSubModuleInfo,
};
use progress_core::time::fixed_now;
use services::{Clock, EngineConfig, EngineError, ErrorKind, ProgressEngine};
use storage::repository::{
    InMemoryRepository, Storage, StorageError, TrackingStore, TrackingTx,
};

use common::{COURSE, content};

/// Course-row writes are the last step of both enrollment and the rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailPoint {
    CourseInsert,
    CourseUpdate,
}

type Failure = (FailPoint, fn() -> StorageError);

/// Delegates to an in-memory store but fails one kind of course-row write on
/// demand.
#[derive(Clone)]
struct FailingStore {
    inner: InMemoryRepository,
    fail_with: Arc<std::sync::Mutex<Option<Failure>>>,
    course_updates: Arc<AtomicU32>,
}

impl FailingStore {
    fn new(inner: InMemoryRepository) -> Self {
        Self {
            inner,
            fail_with: Arc::new(std::sync::Mutex::new(None)),
            course_updates: Arc::new(AtomicU32::new(0)),
        }
    }

    fn fail_at(&self, point: FailPoint, make: fn() -> StorageError) {
        *self.fail_with.lock().unwrap() = Some((point, make));
    }

    fn recover(&self) {
        *self.fail_with.lock().unwrap() = None;
    }
}

#[async_trait]
impl TrackingStore for FailingStore {
    async fn begin(&self) -> Result<Box<dyn TrackingTx>, StorageError> {
        let fail_with = *self.fail_with.lock().unwrap();
        let inner = self.inner.begin().await?;
        Ok(Box::new(FailingTx {
            inner,
            fail_with,
            course_updates: Arc::clone(&self.course_updates),
        }))
    }
}

struct FailingTx {
    inner: Box<dyn TrackingTx>,
    fail_with: Option<Failure>,
    course_updates: Arc<AtomicU32>,
}

impl FailingTx {
    fn failure(&self, at: FailPoint) -> Option<StorageError> {
        self.fail_with
            .filter(|(point, _)| *point == at)
            .map(|(_, make)| make())
    }
}

#[async_trait]
impl TrackingTx for FailingTx {
    async fn course_info(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<UserCourseInfo>, StorageError> {
        self.inner.course_info(user_id, course_id).await
    }

    async fn insert_course_info(&mut self, info: &UserCourseInfo) -> Result<(), StorageError> {
        match self.failure(FailPoint::CourseInsert) {
            Some(err) => Err(err),
            None => self.inner.insert_course_info(info).await,
        }
    }

    async fn update_course_info(&mut self, info: &UserCourseInfo) -> Result<(), StorageError> {
        self.course_updates.fetch_add(1, Ordering::SeqCst);
        match self.failure(FailPoint::CourseUpdate) {
            Some(err) => Err(err),
            None => self.inner.update_course_info(info).await,
        }
    }

    async fn insert_module_info(&mut self, info: &UserModuleInfo) -> Result<bool, StorageError> {
        self.inner.insert_module_info(info).await
    }

    async fn module_info(
        &mut self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<UserModuleInfo>, StorageError> {
        self.inner.module_info(user_id, module_id).await
    }

    async fn update_module_info(&mut self, info: &UserModuleInfo) -> Result<(), StorageError> {
        self.inner.update_module_info(info).await
    }

    async fn insert_sub_module_info(
        &mut self,
        info: &UserSubModuleInfo,
    ) -> Result<bool, StorageError> {
        self.inner.insert_sub_module_info(info).await
    }

    async fn sub_module_info(
        &mut self,
        user_id: UserId,
        sub_module_id: SubModuleId,
    ) -> Result<Option<UserSubModuleInfo>, StorageError> {
        self.inner.sub_module_info(user_id, sub_module_id).await
    }

    async fn update_sub_module_info(
        &mut self,
        info: &UserSubModuleInfo,
    ) -> Result<(), StorageError> {
        self.inner.update_sub_module_info(info).await
    }

    async fn insert_learning_progress(
        &mut self,
        progress: &UserLearningProgress,
    ) -> Result<bool, StorageError> {
        self.inner.insert_learning_progress(progress).await
    }

    async fn learning_progress(
        &mut self,
        user_id: UserId,
        content_id: LearningContentId,
    ) -> Result<Option<UserLearningProgress>, StorageError> {
        self.inner.learning_progress(user_id, content_id).await
    }

    async fn update_learning_progress(
        &mut self,
        progress: &UserLearningProgress,
    ) -> Result<(), StorageError> {
        self.inner.update_learning_progress(progress).await
    }

    async fn count_learning_progress(
        &mut self,
        user_id: UserId,
        content_ids: &[LearningContentId],
    ) -> Result<CompletionCount, StorageError> {
        self.inner.count_learning_progress(user_id, content_ids).await
    }

    async fn count_sub_module_infos(
        &mut self,
        user_id: UserId,
        sub_module_ids: &[SubModuleId],
    ) -> Result<CompletionCount, StorageError> {
        self.inner.count_sub_module_infos(user_id, sub_module_ids).await
    }

    async fn count_module_infos(
        &mut self,
        user_id: UserId,
        module_ids: &[ModuleId],
    ) -> Result<CompletionCount, StorageError> {
        self.inner.count_module_infos(user_id, module_ids).await
    }

    async fn insert_quiz_attempt(
        &mut self,
        attempt: &NewQuizAttempt,
    ) -> Result<QuizAttempt, StorageError> {
        self.inner.insert_quiz_attempt(attempt).await
    }

    async fn quiz_attempt(
        &mut self,
        id: QuizAttemptId,
    ) -> Result<Option<QuizAttempt>, StorageError> {
        self.inner.quiz_attempt(id).await
    }

    async fn complete_quiz_attempt(&mut self, attempt: &QuizAttempt) -> Result<(), StorageError> {
        self.inner.complete_quiz_attempt(attempt).await
    }

    async fn append_answers(&mut self, answers: &[UserAnswer]) -> Result<(), StorageError> {
        self.inner.append_answers(answers).await
    }

    async fn answers_for_attempt(
        &mut self,
        id: QuizAttemptId,
    ) -> Result<Vec<UserAnswer>, StorageError> {
        self.inner.answers_for_attempt(id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.inner.rollback().await
    }
}

async fn engine_over(store: &FailingStore, retry_attempts: u32) -> ProgressEngine {
    let storage = Storage {
        catalog: Arc::new(store.inner.clone()),
        tracking: Arc::new(store.clone()),
    };
    common::seed(&storage).await;
    let config = EngineConfig {
        retry_attempts,
        retry_backoff: Duration::ZERO,
        ..EngineConfig::default()
    };
    ProgressEngine::new(storage, Clock::fixed(fixed_now()), config)
}

async fn snapshot(
    store: &InMemoryRepository,
    user: UserId,
) -> (UserLearningProgress, UserSubModuleInfo, UserCourseInfo) {
    let mut tx = store.begin().await.unwrap();
    let row = tx.learning_progress(user, content(6)).await.unwrap().unwrap();
    let sub = tx
        .sub_module_info(user, SubModuleId::new(2))
        .await
        .unwrap()
        .unwrap();
    let course = tx
        .course_info(user, CourseId::new(COURSE))
        .await
        .unwrap()
        .unwrap();
    tx.rollback().await.unwrap();
    (row, sub, course)
}

#[tokio::test]
async fn failed_course_write_rolls_back_the_whole_rollup() {
    let store = FailingStore::new(InMemoryRepository::new());
    let engine = engine_over(&store, 1).await;
    let user = UserId::new(1);
    engine.enroll(user, CourseId::new(COURSE)).await.unwrap();
    engine
        .complete_learning_content(user, content(5))
        .await
        .unwrap();

    let before = snapshot(&store.inner, user).await;
    assert_eq!(before.0.status, LearningStatus::InProgress);

    store.fail_at(FailPoint::CourseUpdate, || {
        StorageError::Query("disk I/O error".into())
    });
    // Item 6 closes sub-module 2, so the failure lands after the sub-module write.
    let err = engine
        .complete_learning_content(user, content(6))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Internal(_)));

    let after = snapshot(&store.inner, user).await;
    assert_eq!(after, before);
    assert!(!after.1.is_completed());
    assert_eq!(after.2.progress_percent, 10);
}

#[tokio::test]
async fn transient_failures_are_retried_then_surfaced() {
    let store = FailingStore::new(InMemoryRepository::new());
    let engine = engine_over(&store, 3).await;
    let user = UserId::new(1);
    engine.enroll(user, CourseId::new(COURSE)).await.unwrap();

    let before = snapshot(&store.inner, user).await;
    store.fail_at(FailPoint::CourseUpdate, || {
        StorageError::Busy("database is locked".into())
    });

    let err = engine
        .complete_learning_content(user, content(6))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(store.course_updates.load(Ordering::SeqCst), 3);
    assert_eq!(snapshot(&store.inner, user).await, before);
}

#[tokio::test]
async fn failed_enrollment_leaves_no_partial_fan_out() {
    let store = FailingStore::new(InMemoryRepository::new());
    let engine = engine_over(&store, 1).await;
    let course = CourseId::new(COURSE);
    let contents: Vec<LearningContentId> = (1..=10).map(content).collect();

    let cases: [(u64, fn() -> StorageError, ErrorKind); 2] = [
        (4, || StorageError::Query("disk full".into()), ErrorKind::InternalError),
        (5, || StorageError::Conflict, ErrorKind::AlreadyEnrolled),
    ];
    for (user, make, expected) in cases {
        let user = UserId::new(user);
        store.fail_at(FailPoint::CourseInsert, make);
        let err = engine.enroll(user, course).await.unwrap_err();
        assert_eq!(err.kind(), expected, "{err:?}");

        let mut tx = store.inner.begin().await.unwrap();
        assert!(tx.course_info(user, course).await.unwrap().is_none());
        for id in [1, 2] {
            assert!(tx.module_info(user, ModuleId::new(id)).await.unwrap().is_none());
        }
        for id in [1, 2, 3] {
            let row = tx.sub_module_info(user, SubModuleId::new(id)).await.unwrap();
            assert!(row.is_none(), "sub-module {id} for {user}");
        }
        let rows = tx.count_learning_progress(user, &contents).await.unwrap();
        assert_eq!(rows.total, 0);
        tx.rollback().await.unwrap();

        store.recover();
        let info = engine.enroll(user, course).await.unwrap();
        assert_eq!(info.progress_percent, 0);
        let overview = engine.course_progress(user, course).await.unwrap();
        assert_eq!(overview.modules.total, 2);
        assert_eq!(overview.sub_modules.total, 3);
        assert_eq!(overview.contents.total, 10);
    }
}

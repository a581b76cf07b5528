use std::sync::Arc;

use chrono::{DateTime, Utc};
use progress_core::model::{
    CourseId, CourseTree, EnrollmentStatus, UserCourseInfo, UserId, UserLearningProgress,
    UserModuleInfo, UserSubModuleInfo,
};
use storage::repository::{StorageError, TrackingStore, TrackingTx};

use crate::error::EngineError;
use crate::hierarchy_reader::HierarchyReader;
use crate::locks::CourseLocks;
use crate::retry::RetryPolicy;
use crate::unit_of_work::{begin, finish};
use crate::Clock;

/// Creates a learner's tracking rows for every node of a course.
pub struct EnrollmentService {
    clock: Clock,
    hierarchy: Arc<HierarchyReader>,
    tracking: Arc<dyn TrackingStore>,
    locks: CourseLocks,
    retry: RetryPolicy,
}

/// Rows created by one enrollment fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FanOut {
    modules: usize,
    sub_modules: usize,
    contents: usize,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        hierarchy: Arc<HierarchyReader>,
        tracking: Arc<dyn TrackingStore>,
        locks: CourseLocks,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            clock,
            hierarchy,
            tracking,
            locks,
            retry,
        }
    }

    /// Enroll a learner with an active enrollment.
    ///
    /// # Errors
    ///
    /// See [`EnrollmentService::enroll_with_status`].
    pub async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<UserCourseInfo, EngineError> {
        self.enroll_with_status(user_id, course_id, EnrollmentStatus::Active)
            .await
    }

    /// Enroll a learner and fan out one tracking row per hierarchy node.
    ///
    /// Rows that already exist for the learner are left untouched. The whole
    /// fan-out is one transaction.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CourseNotFound` for unknown courses,
    /// `EngineError::AlreadyEnrolled` if the learner has a course row, and
    /// `EngineError::Transient` once retries are exhausted.
    pub async fn enroll_with_status(
        &self,
        user_id: UserId,
        course_id: CourseId,
        status: EnrollmentStatus,
    ) -> Result<UserCourseInfo, EngineError> {
        let tree = self.hierarchy.course_tree(course_id).await?;
        let _guard = self.locks.acquire(user_id, course_id).await;

        let (info, created) = self
            .retry
            .run("enroll", || self.enroll_once(user_id, &tree, status))
            .await?;

        tracing::info!(
            %user_id,
            %course_id,
            status = status.as_str(),
            modules = created.modules,
            sub_modules = created.sub_modules,
            contents = created.contents,
            "learner enrolled"
        );
        Ok(info)
    }

    async fn enroll_once(
        &self,
        user_id: UserId,
        tree: &CourseTree,
        status: EnrollmentStatus,
    ) -> Result<(UserCourseInfo, FanOut), EngineError> {
        let now = self.clock.now();
        let mut tx = begin(self.tracking.as_ref()).await?;
        let result = fan_out(tx.as_mut(), user_id, tree, status, now).await;
        finish(tx, result).await
    }
}

async fn fan_out(
    tx: &mut dyn TrackingTx,
    user_id: UserId,
    tree: &CourseTree,
    status: EnrollmentStatus,
    now: DateTime<Utc>,
) -> Result<(UserCourseInfo, FanOut), EngineError> {
    let course_id = tree.id();
    if tx.course_info(user_id, course_id).await?.is_some() {
        return Err(EngineError::AlreadyEnrolled { user_id, course_id });
    }

    let ids = tree.hierarchy_ids();
    let mut created = FanOut::default();

    for module_id in &ids.module_ids {
        if tx
            .insert_module_info(&UserModuleInfo::new(user_id, *module_id))
            .await?
        {
            created.modules += 1;
        }
    }
    for sub_module_id in &ids.sub_module_ids {
        if tx
            .insert_sub_module_info(&UserSubModuleInfo::new(user_id, *sub_module_id))
            .await?
        {
            created.sub_modules += 1;
        }
    }
    for content_id in &ids.learning_content_ids {
        if tx
            .insert_learning_progress(&UserLearningProgress::enrolled(user_id, *content_id))
            .await?
        {
            created.contents += 1;
        }
    }

    // Rows kept from an earlier enrollment may already be completed.
    let mut info = UserCourseInfo::enrolled(user_id, course_id, status, now);
    let counts = tx
        .count_learning_progress(user_id, &ids.learning_content_ids)
        .await?;
    info.apply_progress(counts, now);

    match tx.insert_course_info(&info).await {
        Ok(()) => Ok((info, created)),
        Err(StorageError::Conflict) => Err(EngineError::AlreadyEnrolled { user_id, course_id }),
        Err(err) => Err(err.into()),
    }
}

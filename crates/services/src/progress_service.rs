use std::sync::Arc;

use chrono::{DateTime, Utc};
use progress_core::BigDecimal;
use progress_core::model::{
    CompletionCount, ContentParents, CourseId, CourseTree, HierarchyIds, LearningContentId,
    UserCourseInfo, UserId, UserLearningProgress,
};
use storage::repository::{TrackingStore, TrackingTx};

use crate::error::EngineError;
use crate::hierarchy_reader::HierarchyReader;
use crate::locks::CourseLocks;
use crate::retry::RetryPolicy;
use crate::unit_of_work::{begin, finish};
use crate::Clock;

/// A learner's standing in one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseProgress {
    pub course: UserCourseInfo,
    pub modules: CompletionCount,
    pub sub_modules: CompletionCount,
    pub contents: CompletionCount,
}

/// Marks learning content started or completed and rolls completion up
/// through sub-module, module and course.
pub struct ProgressService {
    clock: Clock,
    hierarchy: Arc<HierarchyReader>,
    tracking: Arc<dyn TrackingStore>,
    locks: CourseLocks,
    retry: RetryPolicy,
}

impl ProgressService {
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

    /// Record that the learner opened a content item.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ContentNotFound` or `EngineError::NotEnrolled`.
    pub async fn start_learning_content(
        &self,
        user_id: UserId,
        content_id: LearningContentId,
    ) -> Result<UserLearningProgress, EngineError> {
        let (_, parents) = self.hierarchy.parents(content_id).await?;
        let _guard = self.locks.acquire(user_id, parents.course_id).await;

        let progress = self
            .retry
            .run("start_learning_content", || {
                self.start_once(user_id, content_id, parents.course_id)
            })
            .await?;

        tracing::debug!(%user_id, %content_id, attempts = progress.attempts, "content started");
        Ok(progress)
    }

    /// Mark a content item completed and roll the result up the hierarchy.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ContentNotFound`, `EngineError::NotEnrolled`, or
    /// `EngineError::Transient` once retries are exhausted. Nothing is
    /// persisted when an error is returned.
    pub async fn complete_learning_content(
        &self,
        user_id: UserId,
        content_id: LearningContentId,
    ) -> Result<UserLearningProgress, EngineError> {
        self.complete_with_score(user_id, content_id, None).await
    }

    /// Like [`ProgressService::complete_learning_content`], also storing a
    /// score on the content row.
    ///
    /// # Errors
    ///
    /// Same as [`ProgressService::complete_learning_content`].
    pub async fn complete_with_score(
        &self,
        user_id: UserId,
        content_id: LearningContentId,
        score: Option<BigDecimal>,
    ) -> Result<UserLearningProgress, EngineError> {
        let (tree, parents) = self.hierarchy.parents(content_id).await?;
        let _guard = self.locks.acquire(user_id, parents.course_id).await;

        let progress = self
            .retry
            .run("complete_learning_content", || {
                self.complete_once(&tree, parents, user_id, content_id, score.clone())
            })
            .await?;

        tracing::info!(
            %user_id,
            %content_id,
            course_id = %parents.course_id,
            attempts = progress.attempts,
            "content completed"
        );
        Ok(progress)
    }

    /// Read the learner's course row with completion counts per level.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CourseNotFound` or `EngineError::NotEnrolled`.
    pub async fn course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgress, EngineError> {
        let tree = self.hierarchy.course_tree(course_id).await?;
        let ids = tree.hierarchy_ids();

        let mut tx = begin(self.tracking.as_ref()).await?;
        let result = read_progress(tx.as_mut(), user_id, course_id, &ids).await;

        // Read-only: never commit.
        if let Err(err) = tx.rollback().await {
            tracing::warn!(error = %err, "rollback failed");
        }
        result
    }

    async fn start_once(
        &self,
        user_id: UserId,
        content_id: LearningContentId,
        course_id: CourseId,
    ) -> Result<UserLearningProgress, EngineError> {
        let now = self.clock.now();
        let mut tx = begin(self.tracking.as_ref()).await?;
        let result = touch(tx.as_mut(), user_id, content_id, course_id, now).await;
        finish(tx, result).await
    }

    async fn complete_once(
        &self,
        tree: &CourseTree,
        parents: ContentParents,
        user_id: UserId,
        content_id: LearningContentId,
        score: Option<BigDecimal>,
    ) -> Result<UserLearningProgress, EngineError> {
        let now = self.clock.now();
        let mut tx = begin(self.tracking.as_ref()).await?;
        let result =
            complete_and_roll_up(tx.as_mut(), tree, parents, user_id, content_id, score, now)
                .await;
        finish(tx, result).await
    }
}

async fn read_progress(
    tx: &mut dyn TrackingTx,
    user_id: UserId,
    course_id: CourseId,
    ids: &HierarchyIds,
) -> Result<CourseProgress, EngineError> {
    let course = tx
        .course_info(user_id, course_id)
        .await?
        .ok_or(EngineError::NotEnrolled { user_id, course_id })?;
    Ok(CourseProgress {
        course,
        modules: tx.count_module_infos(user_id, &ids.module_ids).await?,
        sub_modules: tx
            .count_sub_module_infos(user_id, &ids.sub_module_ids)
            .await?,
        contents: tx
            .count_learning_progress(user_id, &ids.learning_content_ids)
            .await?,
    })
}

async fn touch(
    tx: &mut dyn TrackingTx,
    user_id: UserId,
    content_id: LearningContentId,
    course_id: CourseId,
    now: DateTime<Utc>,
) -> Result<UserLearningProgress, EngineError> {
    let mut progress = tx
        .learning_progress(user_id, content_id)
        .await?
        .ok_or(EngineError::NotEnrolled { user_id, course_id })?;
    progress.touch(now);
    tx.update_learning_progress(&progress).await?;
    Ok(progress)
}

/// Completes the content row, then re-evaluates sub-module, module and course
/// in that order. Must run inside one transaction.
async fn complete_and_roll_up(
    tx: &mut dyn TrackingTx,
    tree: &CourseTree,
    parents: ContentParents,
    user_id: UserId,
    content_id: LearningContentId,
    score: Option<BigDecimal>,
    now: DateTime<Utc>,
) -> Result<UserLearningProgress, EngineError> {
    let course_id = parents.course_id;
    let not_enrolled = || EngineError::NotEnrolled { user_id, course_id };

    let mut progress = tx
        .learning_progress(user_id, content_id)
        .await?
        .ok_or_else(not_enrolled)?;
    let first_completion = progress.complete(now);
    if score.is_some() {
        progress.score = score;
    }
    tx.update_learning_progress(&progress).await?;
    tracing::debug!(%content_id, first_completion, "content row completed");

    let siblings = tree.content_ids_in_sub_module(parents.sub_module_id);
    let counts = tx.count_learning_progress(user_id, &siblings).await?;
    let mut sub_module = tx
        .sub_module_info(user_id, parents.sub_module_id)
        .await?
        .ok_or_else(not_enrolled)?;
    if counts.is_complete() && sub_module.mark_completed(now) {
        tx.update_sub_module_info(&sub_module).await?;
        tracing::debug!(sub_module_id = %parents.sub_module_id, "sub-module completed");
    }

    // A module can only change once its sub-module is complete.
    if sub_module.is_completed() {
        let sub_modules = tree.sub_module_ids_in_module(parents.module_id);
        let counts = tx.count_sub_module_infos(user_id, &sub_modules).await?;
        let mut module = tx
            .module_info(user_id, parents.module_id)
            .await?
            .ok_or_else(not_enrolled)?;
        if counts.is_complete() && module.mark_completed(now) {
            tx.update_module_info(&module).await?;
            tracing::debug!(module_id = %parents.module_id, "module completed");
        }
    }

    let all_contents = tree.hierarchy_ids().learning_content_ids;
    let counts = tx.count_learning_progress(user_id, &all_contents).await?;
    let mut course = tx
        .course_info(user_id, course_id)
        .await?
        .ok_or_else(not_enrolled)?;
    course.apply_progress(counts, now);
    tx.update_course_info(&course).await?;
    tracing::debug!(
        %course_id,
        percent = course.progress_percent,
        status = course.learning_status.as_str(),
        "course progress recomputed"
    );

    Ok(progress)
}

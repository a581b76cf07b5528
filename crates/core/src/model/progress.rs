use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LearningContentId, ModuleId, SubModuleId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StatusParseError {
    #[error("invalid learning status: {0}")]
    LearningStatus(String),
    #[error("invalid enrollment status: {0}")]
    EnrollmentStatus(String),
}

//
// ─── STATUSES ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LearningStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl LearningStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LearningStatus::NotStarted => "not_started",
            LearningStatus::InProgress => "in_progress",
            LearningStatus::Completed => "completed",
        }
    }

    /// # Errors
    ///
    /// Returns `StatusParseError::LearningStatus` for unknown values.
    pub fn parse(s: &str) -> Result<Self, StatusParseError> {
        match s {
            "not_started" => Ok(LearningStatus::NotStarted),
            "in_progress" => Ok(LearningStatus::InProgress),
            "completed" => Ok(LearningStatus::Completed),
            other => Err(StatusParseError::LearningStatus(other.to_owned())),
        }
    }
}

/// Commercial state of an enrollment; opaque to the rollup logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EnrollmentStatus {
    #[default]
    Active,
    Audit,
    Suspended,
}

impl EnrollmentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Audit => "audit",
            EnrollmentStatus::Suspended => "suspended",
        }
    }

    /// # Errors
    ///
    /// Returns `StatusParseError::EnrollmentStatus` for unknown values.
    pub fn parse(s: &str) -> Result<Self, StatusParseError> {
        match s {
            "active" => Ok(EnrollmentStatus::Active),
            "audit" => Ok(EnrollmentStatus::Audit),
            "suspended" => Ok(EnrollmentStatus::Suspended),
            other => Err(StatusParseError::EnrollmentStatus(other.to_owned())),
        }
    }
}

//
// ─── COMPLETION COUNT ──────────────────────────────────────────────────────────
//

/// Completed vs. total tracking rows under some parent node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionCount {
    pub total: u64,
    pub completed: u64,
}

impl CompletionCount {
    #[must_use]
    pub fn new(total: u64, completed: u64) -> Self {
        Self { total, completed }
    }

    /// True when there is at least one row and every row is completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }

    /// Whole-number percentage, rounded down; 0 for an empty set.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let pct = self.completed.min(self.total) * 100 / self.total;
        u8::try_from(pct).unwrap_or(100)
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCourseInfo {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub enrollment_status: EnrollmentStatus,
    pub learning_status: LearningStatus,
    pub progress_percent: u8,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_in: Option<Duration>,
}

impl UserCourseInfo {
    #[must_use]
    pub fn enrolled(
        user_id: UserId,
        course_id: CourseId,
        enrollment_status: EnrollmentStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            course_id,
            enrollment_status,
            learning_status: LearningStatus::NotStarted,
            progress_percent: 0,
            enrolled_at: now,
            completed_at: None,
            completed_in: None,
        }
    }

    /// Recomputes percentage and learning status from content completion counts.
    pub fn apply_progress(&mut self, counts: CompletionCount, now: DateTime<Utc>) {
        self.progress_percent = counts.percent();
        if self.progress_percent >= 100 {
            self.learning_status = LearningStatus::Completed;
            if self.completed_at.is_none() {
                self.completed_at = Some(now);
                self.completed_in = Some(now - self.enrolled_at);
            }
        } else if self.progress_percent > 0 {
            self.learning_status = LearningStatus::InProgress;
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.learning_status == LearningStatus::Completed
    }
}

//
// ─── MODULE / SUB-MODULE ───────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserModuleInfo {
    pub user_id: UserId,
    pub module_id: ModuleId,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UserModuleInfo {
    #[must_use]
    pub fn new(user_id: UserId, module_id: ModuleId) -> Self {
        Self {
            user_id,
            module_id,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Stamps the completion time once; returns whether the row changed.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> bool {
        if self.completed_at.is_some() {
            return false;
        }
        self.completed_at = Some(now);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSubModuleInfo {
    pub user_id: UserId,
    pub sub_module_id: SubModuleId,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UserSubModuleInfo {
    #[must_use]
    pub fn new(user_id: UserId, sub_module_id: SubModuleId) -> Self {
        Self {
            user_id,
            sub_module_id,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Stamps the completion time once; returns whether the row changed.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> bool {
        if self.completed_at.is_some() {
            return false;
        }
        self.completed_at = Some(now);
        true
    }
}

//
// ─── LEARNING CONTENT ──────────────────────────────────────────────────────────
//

/// Leaf tracking row: one learner's state on one learning-content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLearningProgress {
    pub user_id: UserId,
    pub learning_content_id: LearningContentId,
    pub status: LearningStatus,
    pub attempts: u32,
    pub score: Option<BigDecimal>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_in: Option<Duration>,
}

impl UserLearningProgress {
    /// Row created by the enrollment fan-out. `started_at` stays empty until
    /// the learner first opens the item.
    #[must_use]
    pub fn enrolled(user_id: UserId, learning_content_id: LearningContentId) -> Self {
        Self {
            user_id,
            learning_content_id,
            status: LearningStatus::InProgress,
            attempts: 0,
            score: None,
            started_at: None,
            completed_at: None,
            completed_in: None,
        }
    }

    /// Records that the learner opened the item.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if self.status == LearningStatus::NotStarted {
            self.status = LearningStatus::InProgress;
        }
    }

    /// Marks the item completed. An item completed without being opened
    /// starts and finishes at `now`.
    ///
    /// `completed_at` is written only on the first transition into `Completed`
    /// and never changes afterwards. Returns `true` for that first transition.
    pub fn complete(&mut self, now: DateTime<Utc>) -> bool {
        self.attempts = self.attempts.saturating_add(1);
        let started = *self.started_at.get_or_insert(now);
        self.status = LearningStatus::Completed;
        self.completed_in = Some(now - started);
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
            return true;
        }
        false
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == LearningStatus::Completed
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn percent_rounds_down_and_handles_empty() {
        assert_eq!(CompletionCount::new(10, 3).percent(), 30);
        assert_eq!(CompletionCount::new(3, 1).percent(), 33);
        assert_eq!(CompletionCount::new(0, 0).percent(), 0);
        assert_eq!(CompletionCount::new(4, 4).percent(), 100);
    }

    #[test]
    fn empty_set_is_never_complete() {
        assert!(!CompletionCount::new(0, 0).is_complete());
        assert!(!CompletionCount::new(2, 1).is_complete());
        assert!(CompletionCount::new(2, 2).is_complete());
    }

    #[test]
    fn first_completion_sets_completed_at_once() {
        let start = fixed_now();
        let mut row = UserLearningProgress::enrolled(UserId::new(1), LearningContentId::new(2));
        row.touch(start);
        assert_eq!(row.attempts, 1);

        let done = start + Duration::minutes(12);
        assert!(row.complete(done));
        assert_eq!(row.attempts, 2);
        assert_eq!(row.status, LearningStatus::Completed);
        assert_eq!(row.completed_at, Some(done));
        assert_eq!(row.completed_in, Some(Duration::minutes(12)));

        let again = done + Duration::minutes(30);
        assert!(!row.complete(again));
        assert_eq!(row.attempts, 3);
        assert_eq!(row.completed_at, Some(done));
        assert_eq!(row.completed_in, Some(Duration::minutes(42)));
    }

    #[test]
    fn time_spent_counts_from_first_open_not_enrollment() {
        let enrolled_at = fixed_now();
        let mut row = UserLearningProgress::enrolled(UserId::new(1), LearningContentId::new(2));
        assert_eq!(row.started_at, None);

        let opened = enrolled_at + Duration::days(3);
        row.touch(opened);
        row.touch(opened + Duration::hours(1));
        assert_eq!(row.started_at, Some(opened));
        assert_eq!(row.attempts, 2);

        assert!(row.complete(opened + Duration::minutes(90)));
        assert_eq!(row.completed_in, Some(Duration::minutes(90)));
    }

    #[test]
    fn completing_an_unopened_item_takes_no_time() {
        let now = fixed_now();
        let mut row = UserLearningProgress::enrolled(UserId::new(1), LearningContentId::new(2));
        assert!(row.complete(now));
        assert_eq!(row.started_at, Some(now));
        assert_eq!(row.completed_in, Some(Duration::zero()));
        assert_eq!(row.attempts, 1);
    }

    #[test]
    fn course_progress_moves_through_statuses() {
        let now = fixed_now();
        let mut info = UserCourseInfo::enrolled(
            UserId::new(1),
            CourseId::new(1),
            EnrollmentStatus::Active,
            now,
        );
        assert_eq!(info.learning_status, LearningStatus::NotStarted);

        info.apply_progress(CompletionCount::new(10, 3), now);
        assert_eq!(info.progress_percent, 30);
        assert_eq!(info.learning_status, LearningStatus::InProgress);
        assert!(info.completed_at.is_none());

        let later = now + Duration::days(2);
        info.apply_progress(CompletionCount::new(10, 10), later);
        assert_eq!(info.progress_percent, 100);
        assert!(info.is_completed());
        assert_eq!(info.completed_at, Some(later));
        assert_eq!(info.completed_in, Some(Duration::days(2)));
    }

    #[test]
    fn parent_rows_complete_only_once() {
        let now = fixed_now();
        let mut sub = UserSubModuleInfo::new(UserId::new(1), SubModuleId::new(4));
        assert!(sub.mark_completed(now));
        assert!(!sub.mark_completed(now + Duration::hours(1)));
        assert_eq!(sub.completed_at, Some(now));

        let mut module = UserModuleInfo::new(UserId::new(1), ModuleId::new(4));
        assert!(!module.is_completed());
        assert!(module.mark_completed(now));
        assert!(module.is_completed());
    }

    #[test]
    fn statuses_round_trip_through_storage_form() {
        for s in [
            LearningStatus::NotStarted,
            LearningStatus::InProgress,
            LearningStatus::Completed,
        ] {
            assert_eq!(LearningStatus::parse(s.as_str()).unwrap(), s);
        }
        assert_eq!(
            EnrollmentStatus::parse("audit").unwrap(),
            EnrollmentStatus::Audit
        );
        assert!(EnrollmentStatus::parse("gold").is_err());
    }
}

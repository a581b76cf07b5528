use std::collections::HashMap;
use std::sync::Arc;

use progress_core::model::{CourseId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Entries beyond this count are pruned of idle locks on the next acquire.
const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per (user, course).
///
/// Every write that touches a learner's rollup rows for a course holds the
/// matching guard for the whole transaction, so two completions for the same
/// learner never read the same pre-update aggregate.
#[derive(Clone, Default)]
pub struct CourseLocks {
    inner: Arc<Mutex<HashMap<(UserId, CourseId), Arc<Mutex<()>>>>>,
}

impl CourseLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the learner's rows in `course_id`.
    pub async fn acquire(&self, user_id: UserId, course_id: CourseId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            if map.len() > PRUNE_THRESHOLD {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(map.entry((user_id, course_id)).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = CourseLocks::new();
        let guard = locks.acquire(UserId::new(1), CourseId::new(1)).await;

        let contended = tokio::time::timeout(
            Duration::from_millis(20),
            locks.acquire(UserId::new(1), CourseId::new(1)),
        )
        .await;
        assert!(contended.is_err());

        drop(guard);
        let _again = locks.acquire(UserId::new(1), CourseId::new(1)).await;
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = CourseLocks::new();
        let _a = locks.acquire(UserId::new(1), CourseId::new(1)).await;
        let _b = locks.acquire(UserId::new(2), CourseId::new(1)).await;
        let _c = locks.acquire(UserId::new(1), CourseId::new(2)).await;
    }
}

use progress_core::model::{
    AnswerOptionId, CompletionCount, CourseId, LearningContentId, ModuleId, NewQuizAttempt,
    QuestionId, QuizAttempt, QuizAttemptId, SubModuleId, UserAnswer, UserCourseInfo, UserId,
    UserLearningProgress, UserModuleInfo, UserSubModuleInfo,
};
use sqlx::{Sqlite, Transaction};

use super::{
    SqliteRepository,
    mapping::{
        db_err, decimal_text, duration_ms, get_u64, id_i64, map_course_info_row,
        map_learning_progress_row, map_module_info_row, map_quiz_attempt_row,
        map_sub_module_info_row, placeholders,
    },
};
use crate::repository::{StorageError, TrackingStore, TrackingTx};

/// Keeps `IN (...)` lists well below `SQLite`'s bound-parameter limit.
const COUNT_CHUNK: usize = 500;

#[async_trait::async_trait]
impl TrackingStore for SqliteRepository {
    async fn begin(&self) -> Result<Box<dyn TrackingTx>, StorageError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(SqliteTrackingTx { tx }))
    }
}

struct SqliteTrackingTx {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteTrackingTx {
    /// Counts rows of `table` for `user_id` whose `key_column` is in `ids`.
    async fn count_rows(
        &mut self,
        table: &'static str,
        key_column: &'static str,
        completed_expr: &'static str,
        user_id: UserId,
        ids: &[i64],
    ) -> Result<CompletionCount, StorageError> {
        let user = id_i64("user_id", user_id.value())?;
        let mut counts = CompletionCount::default();

        for chunk in ids.chunks(COUNT_CHUNK) {
            let sql = format!(
                "SELECT COUNT(*) AS total, \
                 COALESCE(SUM(CASE WHEN {completed_expr} THEN 1 ELSE 0 END), 0) AS completed \
                 FROM {table} WHERE user_id = ?1 AND {key_column} IN ({})",
                placeholders(2, chunk.len())
            );
            let mut query = sqlx::query(&sql).bind(user);
            for id in chunk {
                query = query.bind(*id);
            }
            let row = query.fetch_one(&mut *self.tx).await.map_err(db_err)?;
            counts.total += get_u64(&row, "total")?;
            counts.completed += get_u64(&row, "completed")?;
        }

        Ok(counts)
    }
}

fn ids_i64<I>(field: &'static str, ids: I) -> Result<Vec<i64>, StorageError>
where
    I: IntoIterator<Item = u64>,
{
    ids.into_iter().map(|v| id_i64(field, v)).collect()
}

fn affected_or_not_found(rows: u64) -> Result<(), StorageError> {
    if rows == 0 {
        Err(StorageError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait::async_trait]
impl TrackingTx for SqliteTrackingTx {
    async fn course_info(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<UserCourseInfo>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    user_id, course_id, enrollment_status, learning_status, progress_percent,
                    enrolled_at, completed_at, completed_in_ms
                FROM user_course_infos
                WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_course_info_row).transpose()
    }

    async fn insert_course_info(&mut self, info: &UserCourseInfo) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO user_course_infos (
                    user_id, course_id, enrollment_status, learning_status, progress_percent,
                    enrolled_at, completed_at, completed_in_ms
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(id_i64("user_id", info.user_id.value())?)
        .bind(id_i64("course_id", info.course_id.value())?)
        .bind(info.enrollment_status.as_str())
        .bind(info.learning_status.as_str())
        .bind(i64::from(info.progress_percent))
        .bind(info.enrolled_at)
        .bind(info.completed_at)
        .bind(duration_ms(info.completed_in))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_course_info(&mut self, info: &UserCourseInfo) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE user_course_infos
                SET enrollment_status = ?3,
                    learning_status = ?4,
                    progress_percent = ?5,
                    completed_at = ?6,
                    completed_in_ms = ?7
                WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(id_i64("user_id", info.user_id.value())?)
        .bind(id_i64("course_id", info.course_id.value())?)
        .bind(info.enrollment_status.as_str())
        .bind(info.learning_status.as_str())
        .bind(i64::from(info.progress_percent))
        .bind(info.completed_at)
        .bind(duration_ms(info.completed_in))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        affected_or_not_found(res.rows_affected())
    }

    async fn insert_module_info(&mut self, info: &UserModuleInfo) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO user_module_infos (user_id, module_id, completed_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id, module_id) DO NOTHING
            ",
        )
        .bind(id_i64("user_id", info.user_id.value())?)
        .bind(id_i64("module_id", info.module_id.value())?)
        .bind(info.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn module_info(
        &mut self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<UserModuleInfo>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT user_id, module_id, completed_at FROM user_module_infos
                WHERE user_id = ?1 AND module_id = ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("module_id", module_id.value())?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_module_info_row).transpose()
    }

    async fn update_module_info(&mut self, info: &UserModuleInfo) -> Result<(), StorageError> {
        let res = sqlx::query(
            "UPDATE user_module_infos SET completed_at = ?3 WHERE user_id = ?1 AND module_id = ?2",
        )
        .bind(id_i64("user_id", info.user_id.value())?)
        .bind(id_i64("module_id", info.module_id.value())?)
        .bind(info.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        affected_or_not_found(res.rows_affected())
    }

    async fn insert_sub_module_info(
        &mut self,
        info: &UserSubModuleInfo,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO user_sub_module_infos (user_id, sub_module_id, completed_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id, sub_module_id) DO NOTHING
            ",
        )
        .bind(id_i64("user_id", info.user_id.value())?)
        .bind(id_i64("sub_module_id", info.sub_module_id.value())?)
        .bind(info.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn sub_module_info(
        &mut self,
        user_id: UserId,
        sub_module_id: SubModuleId,
    ) -> Result<Option<UserSubModuleInfo>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT user_id, sub_module_id, completed_at FROM user_sub_module_infos
                WHERE user_id = ?1 AND sub_module_id = ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("sub_module_id", sub_module_id.value())?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_sub_module_info_row).transpose()
    }

    async fn update_sub_module_info(
        &mut self,
        info: &UserSubModuleInfo,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE user_sub_module_infos SET completed_at = ?3
                WHERE user_id = ?1 AND sub_module_id = ?2
            ",
        )
        .bind(id_i64("user_id", info.user_id.value())?)
        .bind(id_i64("sub_module_id", info.sub_module_id.value())?)
        .bind(info.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        affected_or_not_found(res.rows_affected())
    }

    async fn insert_learning_progress(
        &mut self,
        progress: &UserLearningProgress,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO user_learning_progress (
                    user_id, learning_content_id, status, attempts, score,
                    started_at, completed_at, completed_in_ms
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(user_id, learning_content_id) DO NOTHING
            ",
        )
        .bind(id_i64("user_id", progress.user_id.value())?)
        .bind(id_i64("learning_content_id", progress.learning_content_id.value())?)
        .bind(progress.status.as_str())
        .bind(i64::from(progress.attempts))
        .bind(decimal_text(progress.score.as_ref()))
        .bind(progress.started_at)
        .bind(progress.completed_at)
        .bind(duration_ms(progress.completed_in))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn learning_progress(
        &mut self,
        user_id: UserId,
        content_id: LearningContentId,
    ) -> Result<Option<UserLearningProgress>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    user_id, learning_content_id, status, attempts, score,
                    started_at, completed_at, completed_in_ms
                FROM user_learning_progress
                WHERE user_id = ?1 AND learning_content_id = ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("learning_content_id", content_id.value())?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_learning_progress_row).transpose()
    }

    async fn update_learning_progress(
        &mut self,
        progress: &UserLearningProgress,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE user_learning_progress
                SET status = ?3,
                    attempts = ?4,
                    score = ?5,
                    started_at = ?6,
                    completed_at = ?7,
                    completed_in_ms = ?8
                WHERE user_id = ?1 AND learning_content_id = ?2
            ",
        )
        .bind(id_i64("user_id", progress.user_id.value())?)
        .bind(id_i64("learning_content_id", progress.learning_content_id.value())?)
        .bind(progress.status.as_str())
        .bind(i64::from(progress.attempts))
        .bind(decimal_text(progress.score.as_ref()))
        .bind(progress.started_at)
        .bind(progress.completed_at)
        .bind(duration_ms(progress.completed_in))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        affected_or_not_found(res.rows_affected())
    }

    async fn count_learning_progress(
        &mut self,
        user_id: UserId,
        content_ids: &[LearningContentId],
    ) -> Result<CompletionCount, StorageError> {
        let ids = ids_i64(
            "learning_content_id",
            content_ids.iter().map(LearningContentId::value),
        )?;
        self.count_rows(
            "user_learning_progress",
            "learning_content_id",
            "status = 'completed'",
            user_id,
            &ids,
        )
        .await
    }

    async fn count_sub_module_infos(
        &mut self,
        user_id: UserId,
        sub_module_ids: &[SubModuleId],
    ) -> Result<CompletionCount, StorageError> {
        let ids = ids_i64("sub_module_id", sub_module_ids.iter().map(SubModuleId::value))?;
        self.count_rows(
            "user_sub_module_infos",
            "sub_module_id",
            "completed_at IS NOT NULL",
            user_id,
            &ids,
        )
        .await
    }

    async fn count_module_infos(
        &mut self,
        user_id: UserId,
        module_ids: &[ModuleId],
    ) -> Result<CompletionCount, StorageError> {
        let ids = ids_i64("module_id", module_ids.iter().map(ModuleId::value))?;
        self.count_rows(
            "user_module_infos",
            "module_id",
            "completed_at IS NOT NULL",
            user_id,
            &ids,
        )
        .await
    }

    async fn insert_quiz_attempt(
        &mut self,
        attempt: &NewQuizAttempt,
    ) -> Result<QuizAttempt, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO quiz_attempts (learning_content_id, user_id, started_at)
                VALUES (?1, ?2, ?3)
            ",
        )
        .bind(id_i64("learning_content_id", attempt.learning_content_id.value())?)
        .bind(id_i64("user_id", attempt.user_id.value())?)
        .bind(attempt.started_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("quiz_attempt_id sign overflow".into()))?;

        Ok(QuizAttempt {
            id: QuizAttemptId::new(id),
            learning_content_id: attempt.learning_content_id,
            user_id: attempt.user_id,
            started_at: attempt.started_at,
            completed_at: None,
            total_score: None,
            time_taken: None,
        })
    }

    async fn quiz_attempt(
        &mut self,
        id: QuizAttemptId,
    ) -> Result<Option<QuizAttempt>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    id, learning_content_id, user_id, started_at,
                    completed_at, total_score, time_taken_ms
                FROM quiz_attempts
                WHERE id = ?1
            ",
        )
        .bind(id_i64("quiz_attempt_id", id.value())?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_quiz_attempt_row).transpose()
    }

    async fn complete_quiz_attempt(&mut self, attempt: &QuizAttempt) -> Result<(), StorageError> {
        let attempt_id = id_i64("quiz_attempt_id", attempt.id.value())?;
        let res = sqlx::query(
            r"
                UPDATE quiz_attempts
                SET completed_at = ?2, total_score = ?3, time_taken_ms = ?4
                WHERE id = ?1 AND completed_at IS NULL
            ",
        )
        .bind(attempt_id)
        .bind(attempt.completed_at)
        .bind(decimal_text(attempt.total_score.as_ref()))
        .bind(duration_ms(attempt.time_taken))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        if res.rows_affected() > 0 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM quiz_attempts WHERE id = ?1")
            .bind(attempt_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        if exists.is_some() {
            Err(StorageError::Conflict)
        } else {
            Err(StorageError::NotFound)
        }
    }

    async fn append_answers(&mut self, answers: &[UserAnswer]) -> Result<(), StorageError> {
        for answer in answers {
            let res = sqlx::query(
                r"
                    INSERT INTO user_answers (quiz_attempt_id, question_id, selected_option_id)
                    SELECT id, ?2, ?3 FROM quiz_attempts WHERE id = ?1
                ",
            )
            .bind(id_i64("quiz_attempt_id", answer.quiz_attempt_id.value())?)
            .bind(id_i64("question_id", answer.question_id.value())?)
            .bind(id_i64("option_id", answer.selected_option_id.value())?)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
            affected_or_not_found(res.rows_affected())?;
        }
        Ok(())
    }

    async fn answers_for_attempt(
        &mut self,
        id: QuizAttemptId,
    ) -> Result<Vec<UserAnswer>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT quiz_attempt_id, question_id, selected_option_id
                FROM user_answers
                WHERE quiz_attempt_id = ?1
                ORDER BY id ASC
            ",
        )
        .bind(id_i64("quiz_attempt_id", id.value())?)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(UserAnswer {
                quiz_attempt_id: QuizAttemptId::new(get_u64(&row, "quiz_attempt_id")?),
                question_id: QuestionId::new(get_u64(&row, "question_id")?),
                selected_option_id: AnswerOptionId::new(get_u64(&row, "selected_option_id")?),
            });
        }
        Ok(out)
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await.map_err(db_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.rollback().await.map_err(db_err)
    }
}

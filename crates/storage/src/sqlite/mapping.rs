use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use progress_core::BigDecimal;
use progress_core::model::{
    CourseId, EnrollmentStatus, LearningContentId, LearningStatus, ModuleId, QuizAttempt,
    QuizAttemptId, SubModuleId, UserCourseInfo, UserId, UserLearningProgress, UserModuleInfo,
    UserSubModuleInfo,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

/// Extended result codes that mean "someone else holds the lock".
const BUSY_CODES: &[&str] = &["5", "6", "261", "262", "517"];

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Classifies a driver error for the engine's retry policy.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::PoolTimedOut => StorageError::Busy(e.to_string()),
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            StorageError::Connection(e.to_string())
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        sqlx::Error::Database(db)
            if db
                .code()
                .is_some_and(|code| BUSY_CODES.contains(&&*code)) =>
        {
            StorageError::Busy(e.to_string())
        }
        _ => StorageError::Query(e.to_string()),
    }
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn get_u64(row: &SqliteRow, field: &'static str) -> Result<u64, StorageError> {
    i64_to_u64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

pub(crate) fn duration_ms(d: Option<Duration>) -> Option<i64> {
    d.map(|d| d.num_milliseconds())
}

fn get_duration(row: &SqliteRow, field: &'static str) -> Result<Option<Duration>, StorageError> {
    Ok(row
        .try_get::<Option<i64>, _>(field)
        .map_err(ser)?
        .map(Duration::milliseconds))
}

pub(crate) fn decimal_text(d: Option<&BigDecimal>) -> Option<String> {
    d.map(BigDecimal::to_string)
}

pub(crate) fn parse_decimal(field: &'static str, raw: &str) -> Result<BigDecimal, StorageError> {
    BigDecimal::from_str(raw)
        .map_err(|_| StorageError::Serialization(format!("invalid {field}: {raw}")))
}

fn get_decimal(row: &SqliteRow, field: &'static str) -> Result<Option<BigDecimal>, StorageError> {
    row.try_get::<Option<String>, _>(field)
        .map_err(ser)?
        .map(|raw| parse_decimal(field, &raw))
        .transpose()
}

pub(crate) fn map_course_info_row(row: &SqliteRow) -> Result<UserCourseInfo, StorageError> {
    let enrollment: String = row.try_get("enrollment_status").map_err(ser)?;
    let learning: String = row.try_get("learning_status").map_err(ser)?;
    let percent: i64 = row.try_get("progress_percent").map_err(ser)?;
    let enrolled_at: DateTime<Utc> = row.try_get("enrolled_at").map_err(ser)?;

    Ok(UserCourseInfo {
        user_id: UserId::new(get_u64(row, "user_id")?),
        course_id: CourseId::new(get_u64(row, "course_id")?),
        enrollment_status: EnrollmentStatus::parse(&enrollment).map_err(ser)?,
        learning_status: LearningStatus::parse(&learning).map_err(ser)?,
        progress_percent: u8::try_from(percent)
            .map_err(|_| StorageError::Serialization(format!("invalid progress: {percent}")))?,
        enrolled_at,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        completed_in: get_duration(row, "completed_in_ms")?,
    })
}

pub(crate) fn map_module_info_row(row: &SqliteRow) -> Result<UserModuleInfo, StorageError> {
    Ok(UserModuleInfo {
        user_id: UserId::new(get_u64(row, "user_id")?),
        module_id: ModuleId::new(get_u64(row, "module_id")?),
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

pub(crate) fn map_sub_module_info_row(row: &SqliteRow) -> Result<UserSubModuleInfo, StorageError> {
    Ok(UserSubModuleInfo {
        user_id: UserId::new(get_u64(row, "user_id")?),
        sub_module_id: SubModuleId::new(get_u64(row, "sub_module_id")?),
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

pub(crate) fn map_learning_progress_row(
    row: &SqliteRow,
) -> Result<UserLearningProgress, StorageError> {
    let status: String = row.try_get("status").map_err(ser)?;
    let attempts: i64 = row.try_get("attempts").map_err(ser)?;

    Ok(UserLearningProgress {
        user_id: UserId::new(get_u64(row, "user_id")?),
        learning_content_id: LearningContentId::new(get_u64(row, "learning_content_id")?),
        status: LearningStatus::parse(&status).map_err(ser)?,
        attempts: u32::try_from(attempts)
            .map_err(|_| StorageError::Serialization(format!("invalid attempts: {attempts}")))?,
        score: get_decimal(row, "score")?,
        started_at: row.try_get("started_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        completed_in: get_duration(row, "completed_in_ms")?,
    })
}

pub(crate) fn map_quiz_attempt_row(row: &SqliteRow) -> Result<QuizAttempt, StorageError> {
    Ok(QuizAttempt {
        id: QuizAttemptId::new(get_u64(row, "id")?),
        learning_content_id: LearningContentId::new(get_u64(row, "learning_content_id")?),
        user_id: UserId::new(get_u64(row, "user_id")?),
        started_at: row.try_get("started_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        total_score: get_decimal(row, "total_score")?,
        time_taken: get_duration(row, "time_taken_ms")?,
    })
}

/// `?start, ?start+1, ...` for an `IN (...)` list of `n` parameters.
pub(crate) fn placeholders(start: usize, n: usize) -> String {
    let mut out = String::new();
    for i in 0..n {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
        out.push_str(&(start + i).to_string());
    }
    out
}

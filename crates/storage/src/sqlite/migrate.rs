use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    // Catalog (owned by course authoring; read-only for the engine).
    r"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS modules (
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS sub_modules (
            id INTEGER PRIMARY KEY,
            module_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            FOREIGN KEY (module_id) REFERENCES modules(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS learning_contents (
            id INTEGER PRIMARY KEY,
            sub_module_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            FOREIGN KEY (sub_module_id) REFERENCES sub_modules(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY,
            learning_content_id INTEGER NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('single', 'multi')),
            points TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            FOREIGN KEY (learning_content_id) REFERENCES learning_contents(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS question_options (
            id INTEGER PRIMARY KEY,
            question_id INTEGER NOT NULL,
            is_correct INTEGER NOT NULL,
            is_active INTEGER NOT NULL,
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    // Per-learner tracking rows.
    r"
        CREATE TABLE IF NOT EXISTS user_course_infos (
            user_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            enrollment_status TEXT NOT NULL,
            learning_status TEXT NOT NULL,
            progress_percent INTEGER NOT NULL CHECK (progress_percent BETWEEN 0 AND 100),
            enrolled_at TEXT NOT NULL,
            completed_at TEXT,
            completed_in_ms INTEGER,
            PRIMARY KEY (user_id, course_id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_module_infos (
            user_id INTEGER NOT NULL,
            module_id INTEGER NOT NULL,
            completed_at TEXT,
            PRIMARY KEY (user_id, module_id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_sub_module_infos (
            user_id INTEGER NOT NULL,
            sub_module_id INTEGER NOT NULL,
            completed_at TEXT,
            PRIMARY KEY (user_id, sub_module_id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_learning_progress (
            user_id INTEGER NOT NULL,
            learning_content_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            attempts INTEGER NOT NULL CHECK (attempts >= 0),
            score TEXT,
            started_at TEXT,
            completed_at TEXT,
            completed_in_ms INTEGER,
            PRIMARY KEY (user_id, learning_content_id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_attempts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            learning_content_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            total_score TEXT,
            time_taken_ms INTEGER
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_answers (
            id INTEGER PRIMARY KEY,
            quiz_attempt_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            selected_option_id INTEGER NOT NULL,
            FOREIGN KEY (quiz_attempt_id) REFERENCES quiz_attempts(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_modules_course ON modules(course_id, position);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_sub_modules_module ON sub_modules(module_id, position);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_learning_contents_sub_module
            ON learning_contents(sub_module_id, position);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_questions_content ON questions(learning_content_id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_quiz_attempts_user_content
            ON quiz_attempts(user_id, learning_content_id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_user_answers_attempt ON user_answers(quiz_attempt_id);
    ",
];

/// Applies pending schema versions, each inside its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}

use std::collections::BTreeMap;

use progress_core::model::{
    AnswerOption, AnswerOptionId, ContentKind, CourseId, CourseTree, LearningContentId, ModuleId,
    Question, QuestionId, QuestionKind, SubModuleId,
};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{db_err, decimal_text, get_u64, id_i64, parse_decimal, ser},
};
use crate::repository::{CatalogRepository, StorageError};

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_course_tree(&self, tree: &CourseTree) -> Result<(), StorageError> {
        let course_id = id_i64("course_id", tree.id().value())?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r"
                INSERT INTO courses (id, title) VALUES (?1, ?2)
                ON CONFLICT(id) DO UPDATE SET title = excluded.title
            ",
        )
        .bind(course_id)
        .bind(tree.title())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for module in tree.modules() {
            sqlx::query(
                r"
                    INSERT INTO modules (id, course_id, title, position) VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(id) DO UPDATE SET
                        course_id = excluded.course_id,
                        title = excluded.title,
                        position = excluded.position
                ",
            )
            .bind(id_i64("module_id", module.id.value())?)
            .bind(course_id)
            .bind(&module.title)
            .bind(i64::from(module.position))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        for sub in tree.sub_modules() {
            sqlx::query(
                r"
                    INSERT INTO sub_modules (id, module_id, title, position) VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(id) DO UPDATE SET
                        module_id = excluded.module_id,
                        title = excluded.title,
                        position = excluded.position
                ",
            )
            .bind(id_i64("sub_module_id", sub.id.value())?)
            .bind(id_i64("module_id", sub.module_id.value())?)
            .bind(&sub.title)
            .bind(i64::from(sub.position))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        for content in tree.contents() {
            sqlx::query(
                r"
                    INSERT INTO learning_contents (id, sub_module_id, kind, title, position)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(id) DO UPDATE SET
                        sub_module_id = excluded.sub_module_id,
                        kind = excluded.kind,
                        title = excluded.title,
                        position = excluded.position
                ",
            )
            .bind(id_i64("learning_content_id", content.id.value())?)
            .bind(id_i64("sub_module_id", content.sub_module_id.value())?)
            .bind(content.kind.as_str())
            .bind(&content.title)
            .bind(i64::from(content.position))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn course_tree(&self, course_id: CourseId) -> Result<Option<CourseTree>, StorageError> {
        let course = id_i64("course_id", course_id.value())?;

        let Some(row) = sqlx::query("SELECT id, title FROM courses WHERE id = ?1")
            .bind(course)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };
        let title: String = row.try_get("title").map_err(ser)?;
        let mut tree = CourseTree::new(course_id, title).map_err(ser)?;

        let modules = sqlx::query(
            r"
                SELECT id, title FROM modules
                WHERE course_id = ?1
                ORDER BY position ASC, id ASC
            ",
        )
        .bind(course)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        for row in modules {
            let title: String = row.try_get("title").map_err(ser)?;
            tree.add_module(ModuleId::new(get_u64(&row, "id")?), title)
                .map_err(ser)?;
        }

        let sub_modules = sqlx::query(
            r"
                SELECT s.id, s.module_id, s.title FROM sub_modules s
                JOIN modules m ON m.id = s.module_id
                WHERE m.course_id = ?1
                ORDER BY s.module_id ASC, s.position ASC, s.id ASC
            ",
        )
        .bind(course)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        for row in sub_modules {
            let title: String = row.try_get("title").map_err(ser)?;
            tree.add_sub_module(
                SubModuleId::new(get_u64(&row, "id")?),
                ModuleId::new(get_u64(&row, "module_id")?),
                title,
            )
            .map_err(ser)?;
        }

        let contents = sqlx::query(
            r"
                SELECT c.id, c.sub_module_id, c.kind, c.title FROM learning_contents c
                JOIN sub_modules s ON s.id = c.sub_module_id
                JOIN modules m ON m.id = s.module_id
                WHERE m.course_id = ?1
                ORDER BY c.sub_module_id ASC, c.position ASC, c.id ASC
            ",
        )
        .bind(course)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        for row in contents {
            let kind: String = row.try_get("kind").map_err(ser)?;
            let title: String = row.try_get("title").map_err(ser)?;
            tree.add_content(
                LearningContentId::new(get_u64(&row, "id")?),
                SubModuleId::new(get_u64(&row, "sub_module_id")?),
                ContentKind::parse(&kind).map_err(ser)?,
                title,
            )
            .map_err(ser)?;
        }

        Ok(Some(tree))
    }

    async fn course_for_content(
        &self,
        content_id: LearningContentId,
    ) -> Result<Option<CourseId>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT m.course_id FROM learning_contents c
                JOIN sub_modules s ON s.id = c.sub_module_id
                JOIN modules m ON m.id = s.module_id
                WHERE c.id = ?1
            ",
        )
        .bind(id_i64("learning_content_id", content_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| get_u64(&r, "course_id").map(CourseId::new))
            .transpose()
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let question_id = id_i64("question_id", question.id.value())?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r"
                INSERT INTO questions (id, learning_content_id, kind, points, is_active)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    learning_content_id = excluded.learning_content_id,
                    kind = excluded.kind,
                    points = excluded.points,
                    is_active = excluded.is_active
            ",
        )
        .bind(question_id)
        .bind(id_i64("learning_content_id", question.content_id.value())?)
        .bind(question.kind.as_str())
        .bind(decimal_text(Some(&question.points)))
        .bind(question.is_active)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM question_options WHERE question_id = ?1")
            .bind(question_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for option in &question.options {
            sqlx::query(
                r"
                    INSERT INTO question_options (id, question_id, is_correct, is_active)
                    VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(id_i64("option_id", option.id.value())?)
            .bind(question_id)
            .bind(option.is_correct)
            .bind(option.is_active)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn questions_for_content(
        &self,
        content_id: LearningContentId,
    ) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    q.id, q.kind, q.points, q.is_active,
                    o.id AS option_id, o.is_correct, o.is_active AS option_active
                FROM questions q
                JOIN question_options o ON o.question_id = q.id
                WHERE q.learning_content_id = ?1
                ORDER BY q.id ASC, o.id ASC
            ",
        )
        .bind(id_i64("learning_content_id", content_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut by_id: BTreeMap<QuestionId, Question> = BTreeMap::new();
        for row in rows {
            let id = QuestionId::new(get_u64(&row, "id")?);
            if !by_id.contains_key(&id) {
                let kind: String = row.try_get("kind").map_err(ser)?;
                let points: String = row.try_get("points").map_err(ser)?;
                by_id.insert(
                    id,
                    Question {
                        id,
                        content_id,
                        kind: QuestionKind::parse(&kind).map_err(ser)?,
                        points: parse_decimal("points", &points)?,
                        is_active: row.try_get("is_active").map_err(ser)?,
                        options: Vec::new(),
                    },
                );
            }
            let option = AnswerOption {
                id: AnswerOptionId::new(get_u64(&row, "option_id")?),
                is_correct: row.try_get("is_correct").map_err(ser)?,
                is_active: row.try_get("option_active").map_err(ser)?,
            };
            if let Some(question) = by_id.get_mut(&id) {
                question.options.push(option);
            }
        }

        Ok(by_id.into_values().collect())
    }
}

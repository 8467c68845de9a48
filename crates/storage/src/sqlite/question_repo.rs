use exam_core::model::{LessonId, Question};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, lesson_key, map_question_row, ser};
use crate::repository::{QuestionBank, QuestionImport, StorageError};

#[async_trait::async_trait]
impl QuestionBank for SqliteRepository {
    async fn questions_for_lesson(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, text, options, correct_answer_index
                FROM questions
                WHERE lesson_id = ?1
                ORDER BY position ASC, id ASC
            ",
        )
        .bind(lesson_key(lesson_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_question_row).collect()
    }
}

#[async_trait::async_trait]
impl QuestionImport for SqliteRepository {
    async fn replace_lesson_questions(
        &self,
        lesson_id: LessonId,
        questions: &[Question],
    ) -> Result<(), StorageError> {
        let lesson = lesson_key(lesson_id)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query("DELETE FROM questions WHERE lesson_id = ?1")
            .bind(lesson)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, question) in questions.iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| StorageError::Serialization("position overflow".into()))?;
            let correct = i64::try_from(question.correct_answer_index())
                .map_err(|_| StorageError::Serialization("correct index overflow".into()))?;
            let options = serde_json::to_string(question.options()).map_err(ser)?;

            sqlx::query(
                r"
                    INSERT INTO questions (
                        lesson_id, id, position, text, options, correct_answer_index
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(lesson)
            .bind(id_i64("question_id", question.id().value())?)
            .bind(position)
            .bind(question.text())
            .bind(options)
            .bind(correct)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
                other => conn(other),
            })?;
        }

        tx.commit().await.map_err(conn)?;
        tracing::debug!(%lesson_id, count = questions.len(), "replaced lesson questions");
        Ok(())
    }
}

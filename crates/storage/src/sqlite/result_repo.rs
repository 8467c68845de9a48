use chrono::Utc;
use exam_core::model::{LearnerId, LessonId, TestResult};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, learner_key, lesson_key, ser};
use crate::repository::{ResultSink, StorageError};

#[async_trait::async_trait]
impl ResultSink for SqliteRepository {
    async fn put_result(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
        result: &TestResult,
    ) -> Result<(), StorageError> {
        let json = serde_json::to_string(result).map_err(ser)?;
        let attempts = i64::try_from(result.attempts())
            .map_err(|_| StorageError::Serialization("attempts overflow".into()))?;

        sqlx::query(
            r"
                INSERT INTO test_results (learner_id, lesson_id, result, attempts, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(learner_id, lesson_id) DO UPDATE SET
                    result = excluded.result,
                    attempts = excluded.attempts,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(learner_key(learner_id)?)
        .bind(lesson_key(lesson_id)?)
        .bind(json)
        .bind(attempts)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_result(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
    ) -> Result<Option<TestResult>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT result
                FROM test_results
                WHERE learner_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(learner_key(learner_id)?)
        .bind(lesson_key(lesson_id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.map(|row| {
            let raw: String = row.try_get("result").map_err(ser)?;
            serde_json::from_str(&raw).map_err(ser)
        })
        .transpose()
    }
}

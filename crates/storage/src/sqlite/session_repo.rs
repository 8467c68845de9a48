use chrono::Utc;
use exam_core::model::{LearnerId, LessonId, SessionSnapshot, SessionState};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, learner_key, lesson_key, ser};
use crate::repository::{SessionSlot, SessionStore, StorageError};

#[async_trait::async_trait]
impl SessionStore for SqliteRepository {
    async fn save_session(&self, state: &SessionState) -> Result<(), StorageError> {
        let snapshot = serde_json::to_string(&state.snapshot()).map_err(ser)?;

        sqlx::query(
            r"
                INSERT INTO active_sessions (learner_id, lesson_id, snapshot, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(learner_id, lesson_id) DO UPDATE SET
                    snapshot = excluded.snapshot,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(learner_key(state.learner_id())?)
        .bind(lesson_key(state.lesson_id())?)
        .bind(snapshot)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn load_session(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
    ) -> Result<SessionSlot, StorageError> {
        let row = sqlx::query(
            r"
                SELECT snapshot
                FROM active_sessions
                WHERE learner_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(learner_key(learner_id)?)
        .bind(lesson_key(lesson_id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(SessionSlot::Absent);
        };
        let raw: String = row.try_get("snapshot").map_err(ser)?;
        match serde_json::from_str::<SessionSnapshot>(&raw) {
            Ok(snapshot) => Ok(SessionSlot::Active(snapshot)),
            Err(err) => {
                tracing::warn!(
                    %learner_id,
                    %lesson_id,
                    error = %err,
                    "dropping undecodable session"
                );
                self.clear_session(learner_id, lesson_id).await?;
                Ok(SessionSlot::Absent)
            }
        }
    }

    async fn clear_session(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM active_sessions WHERE learner_id = ?1 AND lesson_id = ?2")
            .bind(learner_key(learner_id)?)
            .bind(lesson_key(lesson_id)?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}

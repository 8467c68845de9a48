use async_trait::async_trait;
use exam_core::model::{
    LearnerId, LessonId, Question, SessionSnapshot, SessionState, TestResult,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Contents of the active-session slot for a learner and lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSlot {
    Active(SessionSnapshot),
    Absent,
}

impl SessionSlot {
    #[must_use]
    pub fn into_snapshot(self) -> Option<SessionSnapshot> {
        match self {
            SessionSlot::Active(snapshot) => Some(snapshot),
            SessionSlot::Absent => None,
        }
    }
}

/// Read-only access to a lesson's questions, in authored order.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the questions cannot be read. An unknown
    /// lesson yields an empty list.
    async fn questions_for_lesson(&self, lesson_id: LessonId)
    -> Result<Vec<Question>, StorageError>;
}

/// Write side used by seeding and authoring tools.
#[async_trait]
pub trait QuestionImport: Send + Sync {
    /// Replace every question of `lesson_id`, keeping the given order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the questions cannot be stored.
    async fn replace_lesson_questions(
        &self,
        lesson_id: LessonId,
        questions: &[Question],
    ) -> Result<(), StorageError>;
}

/// Durable snapshot of in-flight attempts, one slot per learner and lesson.
///
/// Last writer wins; there is no cross-process coordination.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be written.
    async fn save_session(&self, state: &SessionState) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be read or decoded.
    async fn load_session(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
    ) -> Result<SessionSlot, StorageError>;

    /// Remove the slot. Clearing an empty slot is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be removed.
    async fn clear_session(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
    ) -> Result<(), StorageError>;
}

/// Destination of finalized test results, overwrite per learner and lesson.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the result cannot be stored.
    async fn put_result(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
        result: &TestResult,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the result cannot be read or decoded.
    async fn get_result(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
    ) -> Result<Option<TestResult>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    questions: Arc<Mutex<HashMap<LessonId, Vec<Question>>>>,
    sessions: Arc<Mutex<HashMap<(LearnerId, LessonId), SessionSnapshot>>>,
    results: Arc<Mutex<HashMap<(LearnerId, LessonId), TestResult>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw snapshot, bypassing `SessionState`. Useful for simulating
    /// partially written or stale slots.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn put_raw_session(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
        snapshot: SessionSnapshot,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((learner_id, lesson_id), snapshot);
        Ok(())
    }
}

#[async_trait]
impl QuestionBank for InMemoryRepository {
    async fn questions_for_lesson(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<Question>, StorageError> {
        let guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&lesson_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl QuestionImport for InMemoryRepository {
    async fn replace_lesson_questions(
        &self,
        lesson_id: LessonId,
        questions: &[Question],
    ) -> Result<(), StorageError> {
        let mut guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(lesson_id, questions.to_vec());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemoryRepository {
    async fn save_session(&self, state: &SessionState) -> Result<(), StorageError> {
        self.put_raw_session(state.learner_id(), state.lesson_id(), state.snapshot())
    }

    async fn load_session(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
    ) -> Result<SessionSlot, StorageError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(&(learner_id, lesson_id))
            .cloned()
            .map_or(SessionSlot::Absent, SessionSlot::Active))
    }

    async fn clear_session(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(&(learner_id, lesson_id));
        Ok(())
    }
}

#[async_trait]
impl ResultSink for InMemoryRepository {
    async fn put_result(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
        result: &TestResult,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((learner_id, lesson_id), result.clone());
        Ok(())
    }

    async fn get_result(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
    ) -> Result<Option<TestResult>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(learner_id, lesson_id)).cloned())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionBank>,
    pub imports: Arc<dyn QuestionImport>,
    pub sessions: Arc<dyn SessionStore>,
    pub results: Arc<dyn ResultSink>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            questions: Arc::new(repo.clone()),
            imports: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            results: Arc::new(repo),
        }
    }
}

use std::sync::Arc;

use exam_core::model::AttemptConfig;
use storage::repository::Storage;

use crate::Clock;
use crate::attempts::AttemptLoopService;
use crate::error::AppServicesError;
use crate::navigation::NavigationGuard;
use crate::question_service::QuestionService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    attempts: Arc<AttemptLoopService>,
    questions: Arc<QuestionService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: AttemptConfig,
        guard: Arc<dyn NavigationGuard>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, config, guard))
    }

    /// Build services over volatile in-memory storage.
    #[must_use]
    pub fn in_memory(clock: Clock, config: AttemptConfig, guard: Arc<dyn NavigationGuard>) -> Self {
        Self::from_storage(&Storage::in_memory(), clock, config, guard)
    }

    #[must_use]
    pub fn from_storage(
        storage: &Storage,
        clock: Clock,
        config: AttemptConfig,
        guard: Arc<dyn NavigationGuard>,
    ) -> Self {
        let attempts =
            Arc::new(AttemptLoopService::from_storage(clock, storage, guard).with_config(config));
        let questions = Arc::new(QuestionService::new(
            Arc::clone(&storage.questions),
            Arc::clone(&storage.imports),
        ));
        Self {
            attempts,
            questions,
        }
    }

    #[must_use]
    pub fn attempts(&self) -> Arc<AttemptLoopService> {
        Arc::clone(&self.attempts)
    }

    #[must_use]
    pub fn questions(&self) -> Arc<QuestionService> {
        Arc::clone(&self.questions)
    }
}

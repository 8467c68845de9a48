use std::collections::HashSet;
use std::sync::Arc;

use exam_core::model::{LessonId, Question, QuestionDraft};
use storage::repository::{QuestionBank, QuestionImport};

use crate::error::QuestionServiceError;

/// Loads and replaces a lesson's question bank.
#[derive(Clone)]
pub struct QuestionService {
    bank: Arc<dyn QuestionBank>,
    imports: Arc<dyn QuestionImport>,
}

impl QuestionService {
    #[must_use]
    pub fn new(bank: Arc<dyn QuestionBank>, imports: Arc<dyn QuestionImport>) -> Self {
        Self { bank, imports }
    }

    /// Validate drafts and replace every question of `lesson_id` with them.
    ///
    /// Returns the number of stored questions.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError::Question` for the first invalid draft,
    /// `QuestionServiceError::DuplicateId` if two drafts share an id and
    /// `QuestionServiceError::Storage` if the bank cannot be written.
    pub async fn import(
        &self,
        lesson_id: LessonId,
        drafts: Vec<QuestionDraft>,
    ) -> Result<usize, QuestionServiceError> {
        let mut seen = HashSet::with_capacity(drafts.len());
        let mut questions = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let question = draft.validate()?;
            if !seen.insert(question.id()) {
                return Err(QuestionServiceError::DuplicateId(question.id()));
            }
            questions.push(question);
        }

        self.imports
            .replace_lesson_questions(lesson_id, &questions)
            .await?;
        tracing::info!(%lesson_id, count = questions.len(), "imported questions");
        Ok(questions.len())
    }

    /// # Errors
    ///
    /// Returns `QuestionServiceError::Storage` on read failures.
    pub async fn list(&self, lesson_id: LessonId) -> Result<Vec<Question>, QuestionServiceError> {
        Ok(self.bank.questions_for_lesson(lesson_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{QuestionError, QuestionId};
    use storage::repository::InMemoryRepository;

    fn service() -> QuestionService {
        let repo = InMemoryRepository::new();
        QuestionService::new(Arc::new(repo.clone()), Arc::new(repo))
    }

    fn draft(id: u64, correct: usize) -> QuestionDraft {
        QuestionDraft {
            id: QuestionId::new(id),
            text: format!("Question {id}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer_index: correct,
        }
    }

    #[tokio::test]
    async fn import_replaces_lesson_bank() {
        let svc = service();
        let lesson = LessonId::new(2);
        assert_eq!(svc.import(lesson, vec![draft(1, 0), draft(2, 3)]).await.unwrap(), 2);
        assert_eq!(svc.import(lesson, vec![draft(5, 1)]).await.unwrap(), 1);

        let stored = svc.list(lesson).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id(), QuestionId::new(5));
    }

    #[tokio::test]
    async fn import_rejects_invalid_or_duplicate_drafts() {
        let svc = service();
        let lesson = LessonId::new(2);
        let err = svc.import(lesson, vec![draft(1, 7)]).await.unwrap_err();
        assert!(matches!(
            err,
            QuestionServiceError::Question(QuestionError::CorrectIndexOutOfRange { .. })
        ));

        let err = svc
            .import(lesson, vec![draft(1, 0), draft(1, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, QuestionServiceError::DuplicateId(id) if id == QuestionId::new(1)));
        assert!(svc.list(lesson).await.unwrap().is_empty());
    }
}

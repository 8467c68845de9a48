use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::attempt::QuestionAnswer;
use crate::model::ids::{AttemptSeed, LearnerId, LessonId, QuestionId};
use crate::model::question::Question;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionSnapshotError {
    #[error("snapshot belongs to lesson {found}, expected {expected}")]
    LessonMismatch { expected: LessonId, found: LessonId },

    #[error("snapshot has no start time")]
    MissingStartTime,

    #[error("no questions to restore the session against")]
    NoQuestions,
}

//
// ─── PERSISTED SNAPSHOT ────────────────────────────────────────────────────────
//

/// Durable form of an in-flight attempt.
///
/// Every field is optional so partially written or older snapshots still
/// decode; [`SessionState::restore`] fills the gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSnapshot {
    pub learner_id: Option<LearnerId>,
    pub lesson_id: Option<LessonId>,
    pub start_time: Option<DateTime<Utc>>,
    pub seed: Option<AttemptSeed>,
    pub question_ids: Option<Vec<QuestionId>>,
    pub answer_map: Option<BTreeMap<QuestionId, QuestionAnswer>>,
    pub current_question_index: Option<usize>,
    pub correct_answers_count: Option<u32>,
    pub total_questions: Option<u32>,
    pub violation_count: Option<u32>,
}

//
// ─── LIVE SESSION STATE ────────────────────────────────────────────────────────
//

/// Answer and progress state of the one running attempt for a learner and lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    learner_id: LearnerId,
    lesson_id: LessonId,
    started_at: DateTime<Utc>,
    seed: AttemptSeed,
    question_ids: Vec<QuestionId>,
    answers: BTreeMap<QuestionId, QuestionAnswer>,
    current_question_index: usize,
    violation_count: u32,
}

impl SessionState {
    /// State for an attempt confirmed at `started_at` over `questions`.
    #[must_use]
    pub fn begin(
        learner_id: LearnerId,
        lesson_id: LessonId,
        started_at: DateTime<Utc>,
        seed: AttemptSeed,
        questions: &[Question],
    ) -> Self {
        Self {
            learner_id,
            lesson_id,
            started_at,
            seed,
            question_ids: questions.iter().map(Question::id).collect(),
            answers: BTreeMap::new(),
            current_question_index: 0,
            violation_count: 0,
        }
    }

    /// Rebuild state from a snapshot against the question set being presented.
    ///
    /// Answers for questions outside `presented` are dropped, the index is
    /// clamped into range and the correct count is recomputed from answers.
    ///
    /// # Errors
    ///
    /// Returns `SessionSnapshotError` if the snapshot is for a different lesson,
    /// has no start time, or `presented` is empty.
    pub fn restore(
        snapshot: SessionSnapshot,
        learner_id: LearnerId,
        lesson_id: LessonId,
        presented: &[Question],
    ) -> Result<Self, SessionSnapshotError> {
        match snapshot.lesson_id {
            Some(found) if found != lesson_id => {
                return Err(SessionSnapshotError::LessonMismatch {
                    expected: lesson_id,
                    found,
                });
            }
            _ => {}
        }
        let started_at = snapshot
            .start_time
            .ok_or(SessionSnapshotError::MissingStartTime)?;
        if presented.is_empty() {
            return Err(SessionSnapshotError::NoQuestions);
        }

        let question_ids: Vec<QuestionId> = presented.iter().map(Question::id).collect();
        let answers = snapshot
            .answer_map
            .unwrap_or_default()
            .into_iter()
            .filter(|(id, answer)| question_ids.contains(id) && answer.question_id == *id)
            .collect();
        let last = question_ids.len() - 1;
        let current_question_index = snapshot.current_question_index.unwrap_or(0).min(last);

        Ok(Self {
            learner_id,
            lesson_id,
            started_at,
            seed: snapshot.seed.unwrap_or_default(),
            question_ids,
            answers,
            current_question_index,
            violation_count: snapshot.violation_count.unwrap_or(0),
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            learner_id: Some(self.learner_id),
            lesson_id: Some(self.lesson_id),
            start_time: Some(self.started_at),
            seed: Some(self.seed),
            question_ids: Some(self.question_ids.clone()),
            answer_map: Some(self.answers.clone()),
            current_question_index: Some(self.current_question_index),
            correct_answers_count: Some(self.correct_answers_count()),
            total_questions: Some(self.total_questions()),
            violation_count: Some(self.violation_count),
        }
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn seed(&self) -> AttemptSeed {
        self.seed
    }

    #[must_use]
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }

    #[must_use]
    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    #[must_use]
    pub fn current_question_id(&self) -> Option<QuestionId> {
        self.question_ids.get(self.current_question_index).copied()
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        u32::try_from(self.question_ids.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn correct_answers_count(&self) -> u32 {
        let n = self.answers.values().filter(|a| a.is_correct).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn answer_for(&self, id: QuestionId) -> Option<&QuestionAnswer> {
        self.answers.get(&id)
    }

    #[must_use]
    pub fn is_current_answered(&self) -> bool {
        self.current_question_id()
            .is_some_and(|id| self.answers.contains_key(&id))
    }

    #[must_use]
    pub fn is_on_last_question(&self) -> bool {
        self.current_question_index + 1 >= self.question_ids.len()
    }

    /// Answers in presentation order.
    #[must_use]
    pub fn answers(&self) -> Vec<QuestionAnswer> {
        self.question_ids
            .iter()
            .filter_map(|id| self.answers.get(id).copied())
            .collect()
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    pub fn set_violation_count(&mut self, count: u32) {
        self.violation_count = count;
    }

    /// Record the first answer for its question. Returns `false` if the
    /// question already had an answer or is not part of this attempt.
    pub fn record_answer(&mut self, answer: QuestionAnswer) -> bool {
        if !self.question_ids.contains(&answer.question_id)
            || self.answers.contains_key(&answer.question_id)
        {
            return false;
        }
        self.answers.insert(answer.question_id, answer);
        true
    }

    /// Move to the next question. Returns `false` when already on the last one.
    pub fn advance(&mut self) -> bool {
        if self.is_on_last_question() {
            return false;
        }
        self.current_question_index += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn questions(n: u64) -> Vec<Question> {
        (1..=n)
            .map(|i| {
                Question::new(
                    QuestionId::new(i),
                    format!("Q{i}"),
                    vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    0,
                )
                .unwrap()
            })
            .collect()
    }

    fn state(n: u64) -> SessionState {
        SessionState::begin(
            LearnerId::new(1),
            LessonId::new(10),
            fixed_now(),
            AttemptSeed::new(0),
            &questions(n),
        )
    }

    #[test]
    fn answers_are_recorded_once() {
        let qs = questions(3);
        let mut s = state(3);
        assert!(s.record_answer(QuestionAnswer::grade(&qs[0], 0)));
        assert!(!s.record_answer(QuestionAnswer::grade(&qs[0], 1)));
        assert_eq!(s.correct_answers_count(), 1);
        assert!(s.is_current_answered());
    }

    #[test]
    fn foreign_question_is_rejected() {
        let mut s = state(2);
        let other = &questions(5)[4];
        assert!(!s.record_answer(QuestionAnswer::grade(other, 0)));
        assert_eq!(s.answered_count(), 0);
    }

    #[test]
    fn advance_stops_at_last_question() {
        let mut s = state(2);
        assert!(s.advance());
        assert!(s.is_on_last_question());
        assert!(!s.advance());
        assert_eq!(s.current_question_index(), 1);
    }

    #[test]
    fn snapshot_restores_progress() {
        let qs = questions(4);
        let mut s = state(4);
        s.record_answer(QuestionAnswer::grade(&qs[0], 0));
        s.advance();
        s.record_answer(QuestionAnswer::grade(&qs[1], 2));
        s.advance();
        s.set_violation_count(2);

        let json = serde_json::to_string(&s.snapshot()).unwrap();
        let snapshot: SessionSnapshot = serde_json::from_str(&json).unwrap();
        let restored =
            SessionState::restore(snapshot, LearnerId::new(1), LessonId::new(10), &qs).unwrap();

        assert_eq!(restored, s);
        assert_eq!(restored.correct_answers_count(), 1);
        assert_eq!(restored.violation_count(), 2);
    }

    #[test]
    fn malformed_snapshot_gets_defaults() {
        let qs = questions(3);
        let snapshot = SessionSnapshot {
            start_time: Some(fixed_now()),
            current_question_index: Some(99),
            correct_answers_count: Some(7),
            ..SessionSnapshot::default()
        };
        let restored =
            SessionState::restore(snapshot, LearnerId::new(1), LessonId::new(10), &qs).unwrap();

        assert_eq!(restored.current_question_index(), 2);
        assert_eq!(restored.answered_count(), 0);
        assert_eq!(restored.correct_answers_count(), 0);
        assert_eq!(restored.seed(), AttemptSeed::new(0));
    }

    #[test]
    fn restore_rejects_other_lesson_and_missing_start() {
        let qs = questions(2);
        let other = SessionSnapshot {
            lesson_id: Some(LessonId::new(11)),
            start_time: Some(fixed_now()),
            ..SessionSnapshot::default()
        };
        assert!(matches!(
            SessionState::restore(other, LearnerId::new(1), LessonId::new(10), &qs),
            Err(SessionSnapshotError::LessonMismatch { .. })
        ));

        let no_start = SessionSnapshot::default();
        assert_eq!(
            SessionState::restore(no_start, LearnerId::new(1), LessonId::new(10), &qs),
            Err(SessionSnapshotError::MissingStartTime)
        );
    }

    #[test]
    fn partial_json_decodes() {
        let snapshot: SessionSnapshot =
            serde_json::from_str(r#"{"lessonId": 10, "startTime": "2023-11-14T22:13:20Z"}"#)
                .unwrap();
        assert_eq!(snapshot.lesson_id, Some(LessonId::new(10)));
        assert!(snapshot.answer_map.is_none());
    }
}

use chrono::{DateTime, Duration, Utc};

use exam_core::model::{
    AttemptConfig, LearnerId, LessonId, Question, Role, SessionSnapshot, SessionState,
};
use exam_core::selector::QuestionSelector;
use storage::repository::SessionSlot;

/// What a stored session slot means for the attempt being opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// Nothing stored.
    Fresh,
    /// Stored state that cannot belong to this attempt; clear it and start fresh.
    Stale,
    /// Still within the time limit.
    Resumed {
        state: SessionState,
        questions: Vec<Question>,
    },
    /// Past the deadline (or no start time): finalize as a page refresh.
    Expired { recorded_total: Option<u32> },
}

/// Classify a session slot loaded for `(learner_id, lesson_id)` at `now`.
#[must_use]
pub fn recover(
    slot: SessionSlot,
    bank: &[Question],
    config: &AttemptConfig,
    learner_id: LearnerId,
    lesson_id: LessonId,
    now: DateTime<Utc>,
) -> Recovery {
    let SessionSlot::Active(snapshot) = slot else {
        return Recovery::Fresh;
    };
    if snapshot.lesson_id.is_some_and(|found| found != lesson_id) {
        return Recovery::Stale;
    }
    let Some(started_at) = snapshot.start_time else {
        return Recovery::Expired {
            recorded_total: snapshot.total_questions,
        };
    };
    let elapsed = (now - started_at).max(Duration::zero());
    if elapsed >= config.duration() {
        return Recovery::Expired {
            recorded_total: snapshot.total_questions,
        };
    }

    let questions = presented_questions(&snapshot, bank, config, lesson_id);
    match SessionState::restore(snapshot, learner_id, lesson_id, &questions) {
        Ok(state) => Recovery::Resumed { state, questions },
        Err(err) => {
            tracing::warn!(%learner_id, %lesson_id, error = %err, "discarding unusable session");
            Recovery::Stale
        }
    }
}

/// The persisted order when every id still exists, else the seeded selection.
fn presented_questions(
    snapshot: &SessionSnapshot,
    bank: &[Question],
    config: &AttemptConfig,
    lesson_id: LessonId,
) -> Vec<Question> {
    snapshot
        .question_ids
        .as_deref()
        .and_then(|order| QuestionSelector::reorder(bank, order))
        .unwrap_or_else(|| {
            QuestionSelector::from_config(config).select(
                bank,
                Role::Learner,
                lesson_id,
                snapshot.seed.unwrap_or_default(),
            )
        })
}

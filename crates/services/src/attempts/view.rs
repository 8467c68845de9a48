use chrono::{DateTime, Utc};

use exam_core::model::{Question, QuestionId, TestAttempt};
use exam_core::timer::format_remaining;

use super::session::{AttemptPhase, AttemptSession, Pending};

/// One question as presented to the host.
///
/// `correct_answer_index` is only filled in preview mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub id: QuestionId,
    pub position: usize,
    pub text: String,
    pub options: Vec<String>,
    pub selected_index: Option<usize>,
    pub correct_answer_index: Option<usize>,
}

impl QuestionView {
    fn from_question(question: &Question, position: usize) -> Self {
        Self {
            id: question.id(),
            position,
            text: question.text().to_string(),
            options: question.options().to_vec(),
            selected_index: None,
            correct_answer_index: None,
        }
    }
}

/// Presentation-agnostic snapshot of an attempt at one instant.
///
/// Carries no localization; `remaining_label` is the only pre-formatted field
/// because every host renders the countdown the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptView {
    pub phase: AttemptPhase,
    pub attempt_number: usize,
    pub max_attempts: usize,
    pub can_retake: bool,
    pub total_questions: usize,
    pub answered: usize,
    pub question: Option<QuestionView>,
    pub is_last_question: bool,
    pub preview: Vec<QuestionView>,
    pub remaining_secs: Option<i64>,
    pub remaining_label: Option<String>,
    pub violations: u32,
    pub remaining_switches: u32,
    pub warning: Option<String>,
    pub pending: Option<Pending>,
    pub latest: Option<TestAttempt>,
    pub result_saved: bool,
}

impl AttemptView {
    #[must_use]
    pub fn of(session: &AttemptSession, now: DateTime<Utc>) -> Self {
        let state = session.state();
        let question = state.and_then(|s| {
            let q = session.current_question()?;
            let mut view = QuestionView::from_question(q, s.current_question_index());
            view.selected_index = s.answer_for(q.id()).map(|a| a.selected_index);
            Some(view)
        });

        let preview = if session.phase() == AttemptPhase::Preview {
            session
                .questions()
                .iter()
                .enumerate()
                .map(|(i, q)| {
                    let mut view = QuestionView::from_question(q, i);
                    view.correct_answer_index = Some(q.correct_answer_index());
                    view
                })
                .collect()
        } else {
            Vec::new()
        };

        let remaining = session.remaining(now);

        Self {
            phase: session.phase(),
            attempt_number: session.attempt_number(),
            max_attempts: session.config().max_attempts(),
            can_retake: session.can_retake(),
            total_questions: session.questions().len(),
            answered: state.map_or(0, |s| s.answered_count()),
            question,
            is_last_question: state.is_some_and(|s| s.is_on_last_question()),
            preview,
            remaining_secs: remaining.map(|d| d.num_seconds()),
            remaining_label: remaining.map(format_remaining),
            violations: session.violation_count(),
            remaining_switches: session.remaining_switches(),
            warning: session.warning().map(|w| w.message()),
            pending: session.pending(),
            latest: session.latest_attempt().cloned(),
            result_saved: session.result_saved(),
        }
    }
}

use chrono::{DateTime, Utc};

use exam_core::model::{AttemptConfig, InvalidReason, SessionState, TestAttempt, TestResult};

/// What ended a running attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishCause {
    /// The last question was answered and the learner moved on.
    Completed,
    /// The time limit ran out; recorded answers are scored.
    TimedOut,
    Invalidated(InvalidReason),
}

/// Turns live answer state into an immutable attempt and extends the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptFinalizer {
    pass_percentage: u32,
    max_questions: usize,
}

impl AttemptFinalizer {
    #[must_use]
    pub fn new(config: &AttemptConfig) -> Self {
        Self {
            pass_percentage: config.pass_percentage(),
            max_questions: config.max_questions(),
        }
    }

    /// Consume the session state and append its attempt to `history`.
    ///
    /// Taking `state` by value is what makes finalization one-shot: the
    /// caller no longer holds a running attempt afterwards.
    #[must_use]
    pub fn finalize(
        &self,
        state: SessionState,
        cause: FinishCause,
        history: Option<&TestResult>,
        now: DateTime<Utc>,
    ) -> TestResult {
        let total = state.total_questions();
        let answers = state.answers();
        let attempt = match cause {
            FinishCause::Completed | FinishCause::TimedOut => {
                TestAttempt::scored(answers, total, self.pass_percentage, now)
            }
            FinishCause::Invalidated(reason) => {
                TestAttempt::invalidated(reason, answers, total, now)
            }
        };
        TestResult::append(history, attempt)
    }

    /// Attempt found past its deadline on reload: zero score, no answers.
    ///
    /// `recorded_total` comes from the stale snapshot; when it is missing the
    /// size of a full attempt over `bank_size` questions is used.
    #[must_use]
    pub fn expired_on_reload(
        &self,
        recorded_total: Option<u32>,
        bank_size: usize,
        history: Option<&TestResult>,
        now: DateTime<Utc>,
    ) -> TestResult {
        let fallback = u32::try_from(bank_size.min(self.max_questions)).unwrap_or(u32::MAX);
        let total = recorded_total.filter(|t| *t > 0).unwrap_or(fallback);
        let attempt = TestAttempt::invalidated(InvalidReason::PageRefresh, Vec::new(), total, now);
        TestResult::append(history, attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{
        AttemptSeed, LearnerId, LessonId, Question, QuestionAnswer, QuestionId,
    };
    use exam_core::time::fixed_now;

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

    fn state_with(qs: &[Question], correct: usize, wrong: usize) -> SessionState {
        let mut s = SessionState::begin(
            LearnerId::new(1),
            LessonId::new(1),
            fixed_now(),
            AttemptSeed::new(0),
            qs,
        );
        for q in qs.iter().take(correct) {
            s.record_answer(QuestionAnswer::grade(q, 0));
        }
        for q in qs.iter().skip(correct).take(wrong) {
            s.record_answer(QuestionAnswer::grade(q, 1));
        }
        s
    }

    #[test]
    fn completed_attempt_is_scored() {
        let qs = questions(10);
        let finalizer = AttemptFinalizer::new(&AttemptConfig::default());
        let result = finalizer.finalize(
            state_with(&qs, 6, 4),
            FinishCause::Completed,
            None,
            fixed_now(),
        );
        let attempt = result.latest();
        assert_eq!(attempt.score(), 6);
        assert_eq!(attempt.total(), 10);
        assert_eq!(attempt.percentage(), 60);
        assert!(attempt.passed());
        assert_eq!(result.attempts(), 1);
    }

    #[test]
    fn timeout_scores_recorded_answers_only() {
        let qs = questions(20);
        let finalizer = AttemptFinalizer::new(&AttemptConfig::default());
        let result = finalizer.finalize(
            state_with(&qs, 3, 2),
            FinishCause::TimedOut,
            None,
            fixed_now(),
        );
        assert_eq!(result.latest().score(), 3);
        assert_eq!(result.latest().answers().len(), 5);
        assert_eq!(result.latest().percentage(), 15);
    }

    #[test]
    fn user_exit_zeroes_score() {
        let qs = questions(10);
        let finalizer = AttemptFinalizer::new(&AttemptConfig::default());
        let result = finalizer.finalize(
            state_with(&qs, 2, 0),
            FinishCause::Invalidated(InvalidReason::UserExit),
            None,
            fixed_now(),
        );
        let attempt = result.latest();
        assert!(attempt.is_invalidated());
        assert_eq!(attempt.invalid_reason(), Some(InvalidReason::UserExit));
        assert_eq!(attempt.score(), 0);
        assert_eq!(attempt.answers().len(), 2);
    }

    #[test]
    fn history_grows_by_one() {
        let qs = questions(4);
        let finalizer = AttemptFinalizer::new(&AttemptConfig::default());
        let first = finalizer.finalize(
            state_with(&qs, 4, 0),
            FinishCause::Completed,
            None,
            fixed_now(),
        );
        let second = finalizer.finalize(
            state_with(&qs, 1, 0),
            FinishCause::Completed,
            Some(&first),
            fixed_now(),
        );
        assert_eq!(second.attempts(), 2);
        assert_eq!(second.history()[0], first.history()[0]);
        assert_eq!(second.latest().score(), 1);
    }

    #[test]
    fn expired_reload_uses_recorded_total_or_fallback() {
        let finalizer = AttemptFinalizer::new(&AttemptConfig::default());
        let recorded = finalizer.expired_on_reload(Some(20), 35, None, fixed_now());
        assert_eq!(recorded.latest().total(), 20);
        assert!(recorded.latest().answers().is_empty());
        assert_eq!(
            recorded.latest().invalid_reason(),
            Some(InvalidReason::PageRefresh)
        );

        let fallback = finalizer.expired_on_reload(Some(0), 12, None, fixed_now());
        assert_eq!(fallback.latest().total(), 12);
    }
}

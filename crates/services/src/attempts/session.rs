use chrono::{DateTime, Duration, Utc};

use exam_core::integrity::{
    EnvironmentEvent, FocusSignal, IntegrityMonitor, IntegrityVerdict, IntegrityWarning,
};
use exam_core::model::{
    AttemptConfig, AttemptSeed, InvalidReason, LearnerId, LessonId, Question, QuestionAnswer,
    Role, SessionState, TestAttempt, TestResult,
};
use exam_core::selector::QuestionSelector;
use exam_core::timer::SessionTimer;

use super::finalizer::{AttemptFinalizer, FinishCause};
use super::recovery::Recovery;
use super::retake::RetakeController;
use crate::error::AttemptError;

/// Where an attempt stands, as seen by the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    /// Administrators see the whole bank; nothing is timed or scored.
    Preview,
    NotStarted,
    Running,
    Finished { passed: bool },
    Invalidated(InvalidReason),
}

impl AttemptPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Invalidated(_))
    }
}

/// Two-step actions waiting for the learner to confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    Exit,
    Retake,
}

/// Effect of one call on an [`AttemptSession`], used by the caller to decide
/// what to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    /// An attempt began or was resumed.
    Started,
    /// Running state changed and should be snapshotted.
    Updated,
    /// The learner returned after leaving the test view.
    Warned(IntegrityWarning),
    /// The running attempt ended and the history grew by one.
    Finalized(FinishCause),
    /// A confirmed retake reset the attempt to not-started.
    Reset,
}

/// Synchronous state machine for one learner's test on one lesson.
///
/// Every action takes the current instant; the deadline is checked before
/// the action is applied, so a late answer after expiry finalizes instead.
#[derive(Debug)]
pub struct AttemptSession {
    learner_id: LearnerId,
    lesson_id: LessonId,
    role: Role,
    config: AttemptConfig,
    track_focus: bool,
    bank: Vec<Question>,
    questions: Vec<Question>,
    seed: AttemptSeed,
    history: Option<TestResult>,
    state: Option<SessionState>,
    /// Final running state of an attempt whose result is not stored yet.
    finished_state: Option<SessionState>,
    timer: Option<SessionTimer>,
    monitor: Option<IntegrityMonitor>,
    terminal: bool,
    result_saved: bool,
    pending: Option<Pending>,
    warning: Option<IntegrityWarning>,
    guard_raised: bool,
}

impl AttemptSession {
    /// Open the test tab for a lesson.
    ///
    /// With a prior result the session shows that result; otherwise it waits
    /// for the learner to confirm the start.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NoQuestions` if the bank is empty.
    pub fn open(
        learner_id: LearnerId,
        lesson_id: LessonId,
        role: Role,
        config: AttemptConfig,
        bank: Vec<Question>,
        history: Option<TestResult>,
    ) -> Result<Self, AttemptError> {
        if bank.is_empty() {
            return Err(AttemptError::NoQuestions);
        }
        let prior = history.as_ref().map_or(0, TestResult::attempts);
        let terminal = prior > 0 && !role.is_admin();
        // A shown result keeps the seed it was taken with; a retake bumps it.
        let seed = if terminal {
            AttemptSeed::for_attempt(prior - 1)
        } else {
            AttemptSeed::for_attempt(prior)
        };
        let questions = QuestionSelector::from_config(&config).select(&bank, role, lesson_id, seed);

        Ok(Self {
            learner_id,
            lesson_id,
            role,
            config,
            track_focus: false,
            bank,
            questions,
            seed,
            history,
            state: None,
            finished_state: None,
            timer: None,
            monitor: None,
            terminal,
            result_saved: terminal,
            pending: None,
            warning: None,
            guard_raised: false,
        })
    }

    /// Also count window focus loss as leaving the test view.
    #[must_use]
    pub fn with_focus_tracking(mut self, track_focus: bool) -> Self {
        self.track_focus = track_focus;
        self
    }

    /// Apply what was found in the session store.
    pub fn apply_recovery(&mut self, recovery: Recovery, now: DateTime<Utc>) -> Transition {
        if self.role.is_admin() {
            return Transition::Unchanged;
        }
        match recovery {
            Recovery::Fresh | Recovery::Stale => Transition::Unchanged,
            Recovery::Resumed { state, questions } => {
                self.seed = state.seed();
                self.questions = questions;
                self.timer = Some(SessionTimer::new(state.started_at(), self.config.duration()));
                self.monitor = Some(self.new_monitor().resumed_at(state.violation_count()));
                self.state = Some(state);
                self.finished_state = None;
                self.terminal = false;
                self.pending = None;
                self.warning = None;
                tracing::debug!(
                    learner_id = %self.learner_id,
                    lesson_id = %self.lesson_id,
                    "resumed attempt"
                );

                if self.monitor.as_ref().is_some_and(IntegrityMonitor::is_over_limit) {
                    return self.finish(FinishCause::Invalidated(InvalidReason::TabSwitch), now);
                }
                if let Some(t) = self.expire_if_due(now) {
                    return t;
                }
                Transition::Started
            }
            Recovery::Expired { recorded_total } => {
                let finalizer = AttemptFinalizer::new(&self.config);
                let result = finalizer.expired_on_reload(
                    recorded_total,
                    self.bank.len(),
                    self.history.as_ref(),
                    now,
                );
                self.seed = AttemptSeed::for_attempt(result.attempts().saturating_sub(1));
                self.history = Some(result);
                self.terminal = true;
                self.result_saved = false;
                tracing::info!(
                    learner_id = %self.learner_id,
                    lesson_id = %self.lesson_id,
                    reason = %InvalidReason::PageRefresh,
                    "attempt invalidated on reload"
                );
                Transition::Finalized(FinishCause::Invalidated(InvalidReason::PageRefresh))
            }
        }
    }

    //
    // ─── LEARNER ACTIONS ───────────────────────────────────────────────────────
    //

    /// Start the attempt after the learner confirmed the rules.
    ///
    /// # Errors
    ///
    /// `PreviewOnly` for administrators, `AlreadyRunning` while running and
    /// `AttemptFinished` while a result is shown.
    pub fn confirm_start(&mut self, now: DateTime<Utc>) -> Result<Transition, AttemptError> {
        if self.role.is_admin() {
            return Err(AttemptError::PreviewOnly);
        }
        if self.state.is_some() {
            return Err(AttemptError::AlreadyRunning);
        }
        if self.terminal {
            return Err(AttemptError::AttemptFinished);
        }

        self.state = Some(SessionState::begin(
            self.learner_id,
            self.lesson_id,
            now,
            self.seed,
            &self.questions,
        ));
        self.timer = Some(SessionTimer::new(now, self.config.duration()));
        self.monitor = Some(self.new_monitor());
        self.pending = None;
        self.warning = None;
        tracing::debug!(
            learner_id = %self.learner_id,
            lesson_id = %self.lesson_id,
            questions = self.questions.len(),
            "attempt started"
        );
        Ok(Transition::Started)
    }

    /// Record the learner's choice for the current question.
    ///
    /// # Errors
    ///
    /// `NotRunning`, `InvalidOption` for an index outside the options and
    /// `AlreadyAnswered` if the question already has an answer.
    pub fn select_answer(
        &mut self,
        selected_index: usize,
        now: DateTime<Utc>,
    ) -> Result<Transition, AttemptError> {
        if let Some(t) = self.expire_if_due(now) {
            return Ok(t);
        }
        let question = self.current_question().ok_or(AttemptError::NotRunning)?;
        if !question.has_option(selected_index) {
            return Err(AttemptError::InvalidOption {
                index: selected_index,
                options: question.options().len(),
            });
        }
        let answer = QuestionAnswer::grade(question, selected_index);
        let state = self.state.as_mut().ok_or(AttemptError::NotRunning)?;
        if !state.record_answer(answer) {
            return Err(AttemptError::AlreadyAnswered);
        }
        Ok(Transition::Updated)
    }

    /// Move on; past the last question this completes the attempt.
    ///
    /// # Errors
    ///
    /// `NotRunning` or `NotAnswered` if the current question has no answer.
    pub fn next(&mut self, now: DateTime<Utc>) -> Result<Transition, AttemptError> {
        if let Some(t) = self.expire_if_due(now) {
            return Ok(t);
        }
        let state = self.state.as_mut().ok_or(AttemptError::NotRunning)?;
        if !state.is_current_answered() {
            return Err(AttemptError::NotAnswered);
        }
        if state.advance() {
            return Ok(Transition::Updated);
        }
        Ok(self.finish(FinishCause::Completed, now))
    }

    /// Periodic timer check. Finalizes exactly once when time runs out.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Transition {
        self.expire_if_due(now).unwrap_or(Transition::Unchanged)
    }

    /// Feed a host visibility or focus event to the integrity monitor.
    pub fn observe(&mut self, event: &EnvironmentEvent, now: DateTime<Utc>) -> Transition {
        if let Some(t) = self.expire_if_due(now) {
            return t;
        }
        let (Some(monitor), Some(state)) = (self.monitor.as_mut(), self.state.as_mut()) else {
            return Transition::Unchanged;
        };
        match monitor.observe(event) {
            IntegrityVerdict::Ignored => Transition::Unchanged,
            IntegrityVerdict::Counted { violations } => {
                state.set_violation_count(violations);
                tracing::debug!(violations, "left the test view");
                Transition::Updated
            }
            IntegrityVerdict::Warn(warning) => {
                state.set_violation_count(warning.violations);
                self.warning = Some(warning);
                Transition::Warned(warning)
            }
            IntegrityVerdict::Invalidate { violations } => {
                state.set_violation_count(violations);
                self.finish(FinishCause::Invalidated(InvalidReason::TabSwitch), now)
            }
        }
    }

    pub fn dismiss_warning(&mut self) {
        self.warning = None;
    }

    /// First step of "exit test".
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NotRunning` if no attempt is running.
    pub fn request_exit(&mut self) -> Result<(), AttemptError> {
        if self.state.is_none() {
            return Err(AttemptError::NotRunning);
        }
        self.pending = Some(Pending::Exit);
        Ok(())
    }

    pub fn cancel_exit(&mut self) {
        if self.pending == Some(Pending::Exit) {
            self.pending = None;
        }
    }

    /// Confirmed exit: the attempt is invalidated and scores zero.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::ConfirmationMissing` without a prior request.
    pub fn confirm_exit(&mut self, now: DateTime<Utc>) -> Result<Transition, AttemptError> {
        if let Some(t) = self.expire_if_due(now) {
            return Ok(t);
        }
        if self.state.is_none() {
            return Err(AttemptError::NotRunning);
        }
        if self.pending != Some(Pending::Exit) {
            return Err(AttemptError::ConfirmationMissing);
        }
        Ok(self.finish(FinishCause::Invalidated(InvalidReason::UserExit), now))
    }

    /// First step of a retake.
    ///
    /// # Errors
    ///
    /// Returns `RetakeUnavailable` or `AttemptsExhausted`.
    pub fn request_retake(&mut self) -> Result<(), AttemptError> {
        self.retake_controller()
            .check(self.history.as_ref(), self.terminal)?;
        self.pending = Some(Pending::Retake);
        Ok(())
    }

    pub fn cancel_retake(&mut self) {
        if self.pending == Some(Pending::Retake) {
            self.pending = None;
        }
    }

    /// Reset to not-started with a fresh question order.
    ///
    /// # Errors
    ///
    /// Returns `ConfirmationMissing` without a prior request, or the retake
    /// gate error if the history filled up in between.
    pub fn confirm_retake(&mut self) -> Result<Transition, AttemptError> {
        self.retake_controller()
            .check(self.history.as_ref(), self.terminal)?;
        if self.pending != Some(Pending::Retake) {
            return Err(AttemptError::ConfirmationMissing);
        }

        self.seed = self.seed.bumped();
        self.questions = QuestionSelector::from_config(&self.config).select(
            &self.bank,
            self.role,
            self.lesson_id,
            self.seed,
        );
        self.terminal = false;
        self.pending = None;
        self.warning = None;
        tracing::debug!(
            learner_id = %self.learner_id,
            lesson_id = %self.lesson_id,
            seed = self.seed.value(),
            "retake confirmed"
        );
        Ok(Transition::Reset)
    }

    //
    // ─── FINALIZATION ──────────────────────────────────────────────────────────
    //

    fn finish(&mut self, cause: FinishCause, now: DateTime<Utc>) -> Transition {
        let Some(state) = self.state.take() else {
            return Transition::Unchanged;
        };
        self.finished_state = Some(state.clone());
        let finalizer = AttemptFinalizer::new(&self.config);
        let result = finalizer.finalize(state, cause, self.history.as_ref(), now);
        tracing::info!(
            learner_id = %self.learner_id,
            lesson_id = %self.lesson_id,
            cause = ?cause,
            score = result.latest().score(),
            total = result.latest().total(),
            "attempt finalized"
        );

        self.history = Some(result);
        self.timer = None;
        self.monitor = None;
        self.pending = None;
        self.warning = None;
        self.terminal = true;
        self.result_saved = false;
        Transition::Finalized(cause)
    }

    fn expire_if_due(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        let timer = self.timer.as_mut()?;
        if timer.poll(now).expired_now {
            return Some(self.finish(FinishCause::TimedOut, now));
        }
        None
    }

    fn new_monitor(&self) -> IntegrityMonitor {
        let monitor = IntegrityMonitor::new(&self.config);
        if self.track_focus {
            monitor.with_signal(Box::new(FocusSignal::default()))
        } else {
            monitor
        }
    }

    fn retake_controller(&self) -> RetakeController {
        RetakeController::new(&self.config)
    }

    pub(crate) fn mark_result_saved(&mut self) {
        self.result_saved = true;
        self.finished_state = None;
    }

    pub(crate) fn finished_state(&self) -> Option<&SessionState> {
        self.finished_state.as_ref()
    }

    pub(crate) fn set_guard_raised(&mut self, raised: bool) {
        self.guard_raised = raised;
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn phase(&self) -> AttemptPhase {
        if self.role.is_admin() {
            return AttemptPhase::Preview;
        }
        if self.state.is_some() {
            return AttemptPhase::Running;
        }
        match (self.terminal, self.history.as_ref()) {
            (true, Some(result)) => {
                let latest = result.latest();
                match latest.invalid_reason() {
                    Some(reason) => AttemptPhase::Invalidated(reason),
                    None => AttemptPhase::Finished {
                        passed: latest.passed(),
                    },
                }
            }
            _ => AttemptPhase::NotStarted,
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
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn config(&self) -> &AttemptConfig {
        &self.config
    }

    #[must_use]
    pub fn seed(&self) -> AttemptSeed {
        self.seed
    }

    /// Every question of the lesson, in authored order.
    #[must_use]
    pub fn bank(&self) -> &[Question] {
        &self.bank
    }

    /// Questions presented in this attempt, in presentation order.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        let id = self.state.as_ref()?.current_question_id()?;
        self.questions.iter().find(|q| q.id() == id)
    }

    #[must_use]
    pub fn history(&self) -> Option<&TestResult> {
        self.history.as_ref()
    }

    /// Attempt shown on the result screen.
    #[must_use]
    pub fn latest_attempt(&self) -> Option<&TestAttempt> {
        self.history.as_ref().map(TestResult::latest)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// `false` while a finalized result still has to reach the result sink.
    #[must_use]
    pub fn result_saved(&self) -> bool {
        self.result_saved
    }

    #[must_use]
    pub fn pending(&self) -> Option<Pending> {
        self.pending
    }

    #[must_use]
    pub fn warning(&self) -> Option<IntegrityWarning> {
        self.warning
    }

    #[must_use]
    pub fn guard_raised(&self) -> bool {
        self.guard_raised
    }

    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.timer.as_ref().map(|t| t.remaining(now))
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.state.as_ref().map_or(0, SessionState::violation_count)
    }

    #[must_use]
    pub fn remaining_switches(&self) -> u32 {
        self.monitor
            .as_ref()
            .map_or(self.config.max_violations(), IntegrityMonitor::remaining_allowance)
    }

    #[must_use]
    pub fn can_retake(&self) -> bool {
        self.retake_controller()
            .is_available(self.history.as_ref(), self.terminal)
    }

    #[must_use]
    pub fn attempt_number(&self) -> usize {
        self.retake_controller()
            .attempt_number(self.history.as_ref(), self.terminal)
    }
}

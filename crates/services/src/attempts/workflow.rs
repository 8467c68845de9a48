use std::sync::Arc;

use exam_core::integrity::EnvironmentEvent;
use exam_core::model::{AttemptConfig, LearnerId, LessonId, Role, SessionState, TestResult};
use storage::repository::{QuestionBank, ResultSink, SessionSlot, SessionStore, Storage};

use super::recovery::{Recovery, recover};
use super::session::{AttemptSession, Transition};
use crate::Clock;
use crate::error::AttemptError;
use crate::navigation::NavigationGuard;

/// Orchestrates attempts against storage and the host's navigation guard.
///
/// The session itself is a plain value owned by the caller; every method here
/// applies one action to it and then persists what the action changed.
#[derive(Clone)]
pub struct AttemptLoopService {
    clock: Clock,
    config: AttemptConfig,
    track_focus: bool,
    questions: Arc<dyn QuestionBank>,
    sessions: Arc<dyn SessionStore>,
    results: Arc<dyn ResultSink>,
    guard: Arc<dyn NavigationGuard>,
}

impl AttemptLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionBank>,
        sessions: Arc<dyn SessionStore>,
        results: Arc<dyn ResultSink>,
        guard: Arc<dyn NavigationGuard>,
    ) -> Self {
        Self {
            clock,
            config: AttemptConfig::default(),
            track_focus: false,
            questions,
            sessions,
            results,
            guard,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage, guard: Arc<dyn NavigationGuard>) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.questions),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.results),
            guard,
        )
    }

    #[must_use]
    pub fn with_config(mut self, config: AttemptConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_focus_tracking(mut self, track_focus: bool) -> Self {
        self.track_focus = track_focus;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AttemptConfig {
        &self.config
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Open the test tab, resuming or expiring a stored attempt.
    ///
    /// A session slot that cannot be read is logged and ignored. An attempt
    /// that expired while away is returned terminal even when its result
    /// cannot be stored; check [`AttemptSession::result_saved`].
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NoQuestions` for an empty lesson and
    /// `AttemptError::Storage` if questions or prior results cannot be read.
    pub async fn open(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
        role: Role,
    ) -> Result<AttemptSession, AttemptError> {
        let bank = self.questions.questions_for_lesson(lesson_id).await?;
        let history = self.results.get_result(learner_id, lesson_id).await?;
        let mut session =
            AttemptSession::open(learner_id, lesson_id, role, self.config.clone(), bank, history)?
                .with_focus_tracking(self.track_focus);
        if role.is_admin() {
            tracing::debug!(%learner_id, %lesson_id, "opened test preview");
            return Ok(session);
        }

        let slot = match self.sessions.load_session(learner_id, lesson_id).await {
            Ok(slot) => slot,
            Err(err) => {
                tracing::warn!(%learner_id, %lesson_id, error = %err, "session store unavailable");
                SessionSlot::Absent
            }
        };
        let now = self.clock.now();
        let recovery = recover(
            slot,
            session.bank(),
            &self.config,
            learner_id,
            lesson_id,
            now,
        );
        if matches!(recovery, Recovery::Stale) {
            self.clear_slot(&session).await;
        }
        let transition = session.apply_recovery(recovery, now);
        if let Err(err) = self.apply(&mut session, transition).await {
            tracing::debug!(
                %learner_id,
                %lesson_id,
                error = %err,
                "opened with unsaved result"
            );
        }
        Ok(session)
    }

    /// # Errors
    ///
    /// See [`AttemptSession::confirm_start`].
    pub async fn confirm_start(
        &self,
        session: &mut AttemptSession,
    ) -> Result<Transition, AttemptError> {
        let transition = session.confirm_start(self.clock.now())?;
        self.apply(session, transition).await
    }

    /// # Errors
    ///
    /// See [`AttemptSession::select_answer`].
    pub async fn select_answer(
        &self,
        session: &mut AttemptSession,
        selected_index: usize,
    ) -> Result<Transition, AttemptError> {
        let transition = session.select_answer(selected_index, self.clock.now())?;
        self.apply(session, transition).await
    }

    /// # Errors
    ///
    /// See [`AttemptSession::next`].
    pub async fn next(&self, session: &mut AttemptSession) -> Result<Transition, AttemptError> {
        let transition = session.next(self.clock.now())?;
        self.apply(session, transition).await
    }

    /// # Errors
    ///
    /// Returns `AttemptError::Storage` if a finalized result cannot be stored.
    pub async fn tick(&self, session: &mut AttemptSession) -> Result<Transition, AttemptError> {
        let transition = session.tick(self.clock.now());
        self.apply(session, transition).await
    }

    /// # Errors
    ///
    /// Returns `AttemptError::Storage` if a finalized result cannot be stored.
    pub async fn observe(
        &self,
        session: &mut AttemptSession,
        event: &EnvironmentEvent,
    ) -> Result<Transition, AttemptError> {
        let transition = session.observe(event, self.clock.now());
        self.apply(session, transition).await
    }

    /// # Errors
    ///
    /// See [`AttemptSession::confirm_exit`].
    pub async fn confirm_exit(
        &self,
        session: &mut AttemptSession,
    ) -> Result<Transition, AttemptError> {
        let transition = session.confirm_exit(self.clock.now())?;
        self.apply(session, transition).await
    }

    /// # Errors
    ///
    /// See [`AttemptSession::confirm_retake`].
    pub async fn confirm_retake(
        &self,
        session: &mut AttemptSession,
    ) -> Result<Transition, AttemptError> {
        let transition = session.confirm_retake()?;
        self.apply(session, transition).await
    }

    /// Retry storing a finalized result after a failed write.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NotRunning` if nothing was finalized and
    /// `AttemptError::Storage` if the write fails again.
    pub async fn persist_result(&self, session: &mut AttemptSession) -> Result<(), AttemptError> {
        if session.result_saved() {
            return Ok(());
        }
        if session.history().is_none() {
            return Err(AttemptError::NotRunning);
        }
        self.store_finalized(session).await
    }

    /// Lower the navigation guard when the host leaves the test view.
    pub fn teardown(&self, session: &mut AttemptSession) {
        self.lower_guard(session);
    }

    /// Stored results for a lesson, if any.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::Storage` on read failures.
    pub async fn result(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
    ) -> Result<Option<TestResult>, AttemptError> {
        Ok(self.results.get_result(learner_id, lesson_id).await?)
    }

    //
    // ─── PERSISTENCE ───────────────────────────────────────────────────────────
    //

    async fn apply(
        &self,
        session: &mut AttemptSession,
        transition: Transition,
    ) -> Result<Transition, AttemptError> {
        match transition {
            Transition::Unchanged => {}
            Transition::Started => {
                if !session.guard_raised() {
                    self.guard.set_test_in_progress(true);
                    session.set_guard_raised(true);
                }
                self.save_snapshot(session).await;
            }
            Transition::Updated | Transition::Warned(_) => self.save_snapshot(session).await,
            Transition::Finalized(_) => self.commit_finalized(session).await?,
            Transition::Reset => self.clear_slot(session).await,
        }
        Ok(transition)
    }

    async fn commit_finalized(&self, session: &mut AttemptSession) -> Result<(), AttemptError> {
        // Reported on every finalize, including one found on reload.
        self.guard.set_test_in_progress(false);
        session.set_guard_raised(false);
        self.store_finalized(session).await
    }

    /// Store the history, then drop the slot. Until the write succeeds the
    /// slot keeps the attempt's last state so a reload recovers it.
    async fn store_finalized(&self, session: &mut AttemptSession) -> Result<(), AttemptError> {
        let Some(result) = session.history() else {
            return Ok(());
        };
        if let Err(err) = self.put_result(session, result).await {
            if let Some(state) = session.finished_state() {
                self.save_state(session, state).await;
            }
            return Err(err);
        }
        self.clear_slot(session).await;
        session.mark_result_saved();
        Ok(())
    }

    async fn put_result(
        &self,
        session: &AttemptSession,
        result: &TestResult,
    ) -> Result<(), AttemptError> {
        let learner_id = session.learner_id();
        let lesson_id = session.lesson_id();
        if let Err(err) = self.results.put_result(learner_id, lesson_id, result).await {
            tracing::warn!(%learner_id, %lesson_id, error = %err, "failed to store test result");
            return Err(err.into());
        }
        tracing::info!(
            %learner_id,
            %lesson_id,
            attempts = result.attempts(),
            "stored test result"
        );
        Ok(())
    }

    async fn save_snapshot(&self, session: &AttemptSession) {
        if let Some(state) = session.state() {
            self.save_state(session, state).await;
        }
    }

    async fn save_state(&self, session: &AttemptSession, state: &SessionState) {
        if let Err(err) = self.sessions.save_session(state).await {
            tracing::warn!(
                learner_id = %session.learner_id(),
                lesson_id = %session.lesson_id(),
                error = %err,
                "failed to save session snapshot"
            );
        }
    }

    async fn clear_slot(&self, session: &AttemptSession) {
        if let Err(err) = self
            .sessions
            .clear_session(session.learner_id(), session.lesson_id())
            .await
        {
            tracing::warn!(
                learner_id = %session.learner_id(),
                lesson_id = %session.lesson_id(),
                error = %err,
                "failed to clear session slot"
            );
        }
    }

    fn lower_guard(&self, session: &mut AttemptSession) {
        if session.guard_raised() {
            self.guard.set_test_in_progress(false);
            session.set_guard_raised(false);
        }
    }
}

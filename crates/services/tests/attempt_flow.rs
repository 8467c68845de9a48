use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use exam_core::integrity::{EnvironmentEvent, Visibility};
use exam_core::model::{
    InvalidReason, LearnerId, LessonId, Question, QuestionId, Role, SessionState,
};
use exam_core::time::fixed_now;
use services::{
    AttemptError, AttemptLoopService, AttemptPhase, Clock, FinishCause, RecordingGuard, Transition,
};
use storage::repository::{
    InMemoryRepository, QuestionImport, ResultSink, SessionSlot, SessionStore, StorageError,
};

const LEARNER: LearnerId = LearnerId::new(7);
const LESSON: LessonId = LessonId::new(3);
const HIDE: EnvironmentEvent = EnvironmentEvent::Visibility(Visibility::Hidden);
const SHOW: EnvironmentEvent = EnvironmentEvent::Visibility(Visibility::Visible);

struct Harness {
    repo: InMemoryRepository,
    guard: Arc<RecordingGuard>,
    service: AttemptLoopService,
}

impl Harness {
    async fn new(bank_size: u64) -> Self {
        let repo = InMemoryRepository::new();
        repo.replace_lesson_questions(LESSON, &bank(bank_size))
            .await
            .unwrap();
        Self::with_sessions(repo.clone(), Arc::new(repo)).await
    }

    async fn with_sessions(repo: InMemoryRepository, sessions: Arc<dyn SessionStore>) -> Self {
        let guard = Arc::new(RecordingGuard::new());
        let service = AttemptLoopService::new(
            Clock::fixed(fixed_now()),
            Arc::new(repo.clone()),
            sessions,
            Arc::new(repo.clone()),
            guard.clone(),
        );
        Self {
            repo,
            guard,
            service,
        }
    }

    /// Service whose clock reads `secs` after the fixed test instant.
    fn at(&self, secs: i64) -> AttemptLoopService {
        self.service
            .clone()
            .with_clock(Clock::fixed(fixed_now() + Duration::seconds(secs)))
    }
}

/// Every question's correct option is index 0.
fn bank(n: u64) -> Vec<Question> {
    (1..=n)
        .map(|i| {
            Question::new(
                QuestionId::new(i),
                format!("Question {i}"),
                vec!["right".into(), "w1".into(), "w2".into(), "w3".into()],
                0,
            )
            .unwrap()
        })
        .collect()
}

#[tokio::test]
async fn timeout_finalizes_once_and_scores_recorded_answers() {
    let h = Harness::new(30).await;
    let mut session = h.at(0).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    h.at(0).confirm_start(&mut session).await.unwrap();
    h.at(5).select_answer(&mut session, 0).await.unwrap();

    assert_eq!(h.at(1199).tick(&mut session).await.unwrap(), Transition::Unchanged);
    assert_eq!(
        h.at(1200).tick(&mut session).await.unwrap(),
        Transition::Finalized(FinishCause::TimedOut)
    );
    assert_eq!(h.at(1201).tick(&mut session).await.unwrap(), Transition::Unchanged);

    let stored = h.repo.get_result(LEARNER, LESSON).await.unwrap().unwrap();
    assert_eq!(stored.attempts(), 1);
    assert_eq!(stored.latest().score(), 1);
    assert_eq!(stored.latest().total(), 20);
    assert_eq!(stored.latest().percentage(), 5);
    assert_eq!(
        h.repo.load_session(LEARNER, LESSON).await.unwrap(),
        SessionSlot::Absent
    );
    assert_eq!(h.guard.calls(), vec![true, false]);
}

#[tokio::test]
async fn tab_switch_beyond_allowance_invalidates_once() {
    let h = Harness::new(25).await;
    let mut session = h.at(0).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    h.at(0).confirm_start(&mut session).await.unwrap();

    for i in 1..=3 {
        h.at(i).observe(&mut session, &HIDE).await.unwrap();
        let back = h.at(i).observe(&mut session, &SHOW).await.unwrap();
        assert!(matches!(back, Transition::Warned(w) if w.violations == u32::try_from(i).unwrap()));
    }
    assert_eq!(
        h.at(10).observe(&mut session, &HIDE).await.unwrap(),
        Transition::Finalized(FinishCause::Invalidated(InvalidReason::TabSwitch))
    );
    assert_eq!(
        h.at(11).observe(&mut session, &SHOW).await.unwrap(),
        Transition::Unchanged
    );

    let stored = h.repo.get_result(LEARNER, LESSON).await.unwrap().unwrap();
    assert_eq!(stored.attempts(), 1);
    assert_eq!(
        stored.latest().invalid_reason(),
        Some(InvalidReason::TabSwitch)
    );
    assert_eq!(stored.latest().score(), 0);
    assert_eq!(h.guard.calls(), vec![true, false]);
}

#[tokio::test]
async fn reload_past_deadline_records_page_refresh() {
    let h = Harness::new(30).await;
    let mut first = h.at(0).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    h.at(0).confirm_start(&mut first).await.unwrap();
    h.at(10).select_answer(&mut first, 0).await.unwrap();
    drop(first);

    let reopened = h.at(1300).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    assert_eq!(
        reopened.phase(),
        AttemptPhase::Invalidated(InvalidReason::PageRefresh)
    );

    let stored = h.repo.get_result(LEARNER, LESSON).await.unwrap().unwrap();
    let attempt = stored.latest();
    assert_eq!(attempt.score(), 0);
    assert_eq!(attempt.total(), 20);
    assert_eq!(attempt.percentage(), 0);
    assert!(!attempt.passed());
    assert!(attempt.is_invalidated());
    assert!(attempt.answers().is_empty());

    let json = serde_json::to_value(&stored).unwrap();
    assert_eq!(json["invalidReason"], "page-refresh");
    assert_eq!(
        h.repo.load_session(LEARNER, LESSON).await.unwrap(),
        SessionSlot::Absent
    );
    assert_eq!(h.guard.calls(), vec![true, false]);
}

#[tokio::test]
async fn reload_within_limit_restores_progress() {
    let h = Harness::new(30).await;
    let mut first = h.at(0).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    h.at(0).confirm_start(&mut first).await.unwrap();
    let order = first.state().unwrap().question_ids().to_vec();
    for (i, choice) in [0, 0, 1, 0, 2].into_iter().enumerate() {
        let t = i64::try_from(i).unwrap() * 10 + 1;
        h.at(t).select_answer(&mut first, choice).await.unwrap();
        h.at(t + 1).next(&mut first).await.unwrap();
    }
    drop(first);

    let resumed = h.at(300).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    let state = resumed.state().unwrap();
    assert_eq!(resumed.phase(), AttemptPhase::Running);
    assert_eq!(state.current_question_index(), 5);
    assert_eq!(state.correct_answers_count(), 3);
    assert_eq!(state.question_ids(), order.as_slice());
    assert_eq!(
        resumed.remaining(fixed_now() + Duration::seconds(300)),
        Some(Duration::seconds(900))
    );
    assert_eq!(h.guard.calls(), vec![true, true]);
}

#[tokio::test]
async fn user_exit_scores_zero_with_answers_kept() {
    let h = Harness::new(10).await;
    let mut session = h.at(0).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    h.at(0).confirm_start(&mut session).await.unwrap();
    for i in 0..2 {
        h.at(i + 1).select_answer(&mut session, 0).await.unwrap();
        h.at(i + 1).next(&mut session).await.unwrap();
    }

    assert!(matches!(
        h.at(5).confirm_exit(&mut session).await,
        Err(AttemptError::ConfirmationMissing)
    ));
    session.request_exit().unwrap();
    h.at(6).confirm_exit(&mut session).await.unwrap();

    let stored = h.repo.get_result(LEARNER, LESSON).await.unwrap().unwrap();
    let attempt = stored.latest();
    assert!(attempt.is_invalidated());
    assert_eq!(attempt.invalid_reason(), Some(InvalidReason::UserExit));
    assert_eq!(attempt.score(), 0);
    assert_eq!(attempt.answers().len(), 2);
    assert!(attempt.answers().iter().all(|a| a.is_correct));
}

#[tokio::test]
async fn retake_allowed_once_then_exhausted() {
    let h = Harness::new(40).await;
    let mut session = h.at(0).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    h.at(0).confirm_start(&mut session).await.unwrap();
    let first_order = session.state().unwrap().question_ids().to_vec();
    session.request_exit().unwrap();
    h.at(1).confirm_exit(&mut session).await.unwrap();

    // A fresh visit shows the stored result and still offers the retake.
    let mut session = h.at(2).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    assert!(session.can_retake());
    session.request_retake().unwrap();
    assert_eq!(
        h.at(3).confirm_retake(&mut session).await.unwrap(),
        Transition::Reset
    );
    assert_eq!(session.phase(), AttemptPhase::NotStarted);
    h.at(4).confirm_start(&mut session).await.unwrap();
    assert_ne!(session.state().unwrap().question_ids(), first_order.as_slice());
    session.request_exit().unwrap();
    h.at(5).confirm_exit(&mut session).await.unwrap();

    let stored = h.repo.get_result(LEARNER, LESSON).await.unwrap().unwrap();
    assert_eq!(stored.attempts(), 2);
    assert!(!session.can_retake());
    assert!(matches!(
        session.request_retake(),
        Err(AttemptError::AttemptsExhausted { max: 2 })
    ));
    assert_eq!(h.guard.calls(), vec![true, false, true, false]);
}

#[tokio::test]
async fn admin_preview_touches_nothing() {
    let h = Harness::new(30).await;
    let mut session = h
        .at(0)
        .open(LearnerId::new(1), LESSON, Role::Administrator)
        .await
        .unwrap();
    assert_eq!(session.phase(), AttemptPhase::Preview);
    assert_eq!(session.questions().len(), 30);
    assert!(matches!(
        h.at(0).confirm_start(&mut session).await,
        Err(AttemptError::PreviewOnly)
    ));
    assert!(h.guard.calls().is_empty());
    assert!(
        h.repo
            .get_result(LearnerId::new(1), LESSON)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn empty_lesson_has_no_test() {
    let h = Harness::new(0).await;
    let err = h
        .at(0)
        .open(LEARNER, LessonId::new(99), Role::Learner)
        .await
        .unwrap_err();
    assert!(matches!(err, AttemptError::NoQuestions));
}

#[tokio::test]
async fn teardown_lowers_guard_once() {
    let h = Harness::new(5).await;
    let mut session = h.at(0).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    h.at(0).confirm_start(&mut session).await.unwrap();
    h.service.teardown(&mut session);
    h.service.teardown(&mut session);
    assert_eq!(h.guard.calls(), vec![true, false]);
}

/// Session store whose reads and writes always fail.
struct BrokenSessions;

#[async_trait]
impl SessionStore for BrokenSessions {
    async fn save_session(&self, _state: &SessionState) -> Result<(), StorageError> {
        Err(StorageError::Connection("quota exceeded".into()))
    }

    async fn load_session(
        &self,
        _learner_id: LearnerId,
        _lesson_id: LessonId,
    ) -> Result<SessionSlot, StorageError> {
        Err(StorageError::Connection("storage disabled".into()))
    }

    async fn clear_session(
        &self,
        _learner_id: LearnerId,
        _lesson_id: LessonId,
    ) -> Result<(), StorageError> {
        Err(StorageError::Connection("storage disabled".into()))
    }
}

#[tokio::test]
async fn broken_session_store_fails_open() {
    let repo = InMemoryRepository::new();
    repo.replace_lesson_questions(LESSON, &bank(6))
        .await
        .unwrap();
    let h = Harness::with_sessions(repo, Arc::new(BrokenSessions)).await;

    let mut session = h.at(0).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    assert_eq!(session.phase(), AttemptPhase::NotStarted);
    h.at(0).confirm_start(&mut session).await.unwrap();
    for i in 0..6 {
        h.at(i + 1).select_answer(&mut session, 0).await.unwrap();
        h.at(i + 1).next(&mut session).await.unwrap();
    }

    assert_eq!(session.phase(), AttemptPhase::Finished { passed: true });
    let stored = h.repo.get_result(LEARNER, LESSON).await.unwrap().unwrap();
    assert_eq!(stored.latest().score(), 6);
    assert_eq!(stored.latest().percentage(), 100);
}

/// Result sink that fails until `persist_result` is retried.
#[derive(Default)]
struct FlakyResults {
    inner: InMemoryRepository,
    fail: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl ResultSink for FlakyResults {
    async fn put_result(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
        result: &exam_core::model::TestResult,
    ) -> Result<(), StorageError> {
        if self.fail.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Err(StorageError::Connection("offline".into()));
        }
        self.inner.put_result(learner_id, lesson_id, result).await
    }

    async fn get_result(
        &self,
        learner_id: LearnerId,
        lesson_id: LessonId,
    ) -> Result<Option<exam_core::model::TestResult>, StorageError> {
        self.inner.get_result(learner_id, lesson_id).await
    }
}

#[tokio::test]
async fn failed_result_write_can_be_retried() {
    let repo = InMemoryRepository::new();
    repo.replace_lesson_questions(LESSON, &bank(3))
        .await
        .unwrap();
    let results = Arc::new(FlakyResults::default());
    let guard = Arc::new(RecordingGuard::new());
    let service = AttemptLoopService::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo),
        results.clone(),
        guard.clone(),
    );

    let mut session = service.open(LEARNER, LESSON, Role::Learner).await.unwrap();
    service.confirm_start(&mut session).await.unwrap();
    session.request_exit().unwrap();
    results.fail.store(true, std::sync::atomic::Ordering::SeqCst);

    let err = service.confirm_exit(&mut session).await.unwrap_err();
    assert!(matches!(err, AttemptError::Storage(_)));
    assert!(session.is_terminal());
    assert!(!session.result_saved());
    assert_eq!(guard.calls(), vec![true, false]);

    service.persist_result(&mut session).await.unwrap();
    assert!(session.result_saved());
    let stored = results.get_result(LEARNER, LESSON).await.unwrap().unwrap();
    assert_eq!(stored.latest().invalid_reason(), Some(InvalidReason::UserExit));
}

async fn flaky_service(
    bank_size: u64,
) -> (InMemoryRepository, Arc<FlakyResults>, AttemptLoopService) {
    let repo = InMemoryRepository::new();
    repo.replace_lesson_questions(LESSON, &bank(bank_size))
        .await
        .unwrap();
    let results = Arc::new(FlakyResults::default());
    let service = AttemptLoopService::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        results.clone(),
        Arc::new(RecordingGuard::new()),
    );
    (repo, results, service)
}

fn at(service: &AttemptLoopService, secs: i64) -> AttemptLoopService {
    service
        .clone()
        .with_clock(Clock::fixed(fixed_now() + Duration::seconds(secs)))
}

#[tokio::test]
async fn expired_reload_keeps_attempt_when_result_write_fails() {
    let (repo, results, service) = flaky_service(30).await;
    let mut first = at(&service, 0).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    at(&service, 0).confirm_start(&mut first).await.unwrap();
    drop(first);

    results.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    let reopened = at(&service, 1300).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    assert_eq!(
        reopened.phase(),
        AttemptPhase::Invalidated(InvalidReason::PageRefresh)
    );
    assert!(!reopened.result_saved());
    assert!(results.get_result(LEARNER, LESSON).await.unwrap().is_none());
    assert!(matches!(
        repo.load_session(LEARNER, LESSON).await.unwrap(),
        SessionSlot::Active(_)
    ));
    drop(reopened);

    let again = at(&service, 1310).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    assert_eq!(
        again.phase(),
        AttemptPhase::Invalidated(InvalidReason::PageRefresh)
    );
    assert!(again.result_saved());
    let stored = results.get_result(LEARNER, LESSON).await.unwrap().unwrap();
    assert_eq!(stored.attempts(), 1);
    assert_eq!(
        stored.latest().invalid_reason(),
        Some(InvalidReason::PageRefresh)
    );
    assert_eq!(
        repo.load_session(LEARNER, LESSON).await.unwrap(),
        SessionSlot::Absent
    );
}

#[tokio::test]
async fn tab_switch_invalidation_survives_failed_result_write() {
    let (repo, results, service) = flaky_service(10).await;
    let mut session = at(&service, 0).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    at(&service, 0).confirm_start(&mut session).await.unwrap();
    for i in 1..=3 {
        at(&service, i).observe(&mut session, &HIDE).await.unwrap();
        at(&service, i).observe(&mut session, &SHOW).await.unwrap();
    }

    results.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    let err = at(&service, 5).observe(&mut session, &HIDE).await.unwrap_err();
    assert!(matches!(err, AttemptError::Storage(_)));
    assert_eq!(
        session.phase(),
        AttemptPhase::Invalidated(InvalidReason::TabSwitch)
    );
    drop(session);

    let reopened = at(&service, 20).open(LEARNER, LESSON, Role::Learner).await.unwrap();
    assert_eq!(
        reopened.phase(),
        AttemptPhase::Invalidated(InvalidReason::TabSwitch)
    );
    assert!(reopened.result_saved());
    let stored = results.get_result(LEARNER, LESSON).await.unwrap().unwrap();
    assert_eq!(stored.attempts(), 1);
    assert_eq!(
        stored.latest().invalid_reason(),
        Some(InvalidReason::TabSwitch)
    );
}

use exam_core::model::{
    AttemptSeed, InvalidReason, LearnerId, LessonId, Question, QuestionAnswer, QuestionId,
    SessionState, TestAttempt, TestResult,
};
use exam_core::time::fixed_now;
use storage::repository::{QuestionBank, QuestionImport, ResultSink, SessionSlot, SessionStore};
use storage::sqlite::SqliteRepository;

fn question(id: u64) -> Question {
    Question::new(
        QuestionId::new(id),
        format!("Question {id}"),
        vec!["w".into(), "x".into(), "y".into(), "z".into()],
        2,
    )
    .unwrap()
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_keeps_question_order() {
    let repo = connect("memdb_questions").await;
    let lesson = LessonId::new(1);
    let questions = vec![question(3), question(1), question(2)];
    repo.replace_lesson_questions(lesson, &questions)
        .await
        .unwrap();

    let fetched = repo.questions_for_lesson(lesson).await.unwrap();
    assert_eq!(fetched, questions);

    repo.replace_lesson_questions(lesson, &[question(9)])
        .await
        .unwrap();
    let replaced = repo.questions_for_lesson(lesson).await.unwrap();
    assert_eq!(replaced.len(), 1);
    assert_eq!(replaced[0].id(), QuestionId::new(9));
}

#[tokio::test]
async fn sqlite_round_trips_session_snapshot() {
    let repo = connect("memdb_sessions").await;
    let questions = vec![question(1), question(2), question(3)];
    let mut state = SessionState::begin(
        LearnerId::new(4),
        LessonId::new(2),
        fixed_now(),
        AttemptSeed::new(1),
        &questions,
    );
    state.record_answer(QuestionAnswer::grade(&questions[0], 2));
    state.advance();
    repo.save_session(&state).await.unwrap();

    // Second save overwrites the slot.
    state.record_answer(QuestionAnswer::grade(&questions[1], 0));
    repo.save_session(&state).await.unwrap();

    let slot = repo
        .load_session(LearnerId::new(4), LessonId::new(2))
        .await
        .unwrap();
    let snapshot = slot.into_snapshot().expect("session stored");
    assert_eq!(snapshot, state.snapshot());
    assert_eq!(snapshot.correct_answers_count, Some(1));

    repo.clear_session(LearnerId::new(4), LessonId::new(2))
        .await
        .unwrap();
    let cleared = repo
        .load_session(LearnerId::new(4), LessonId::new(2))
        .await
        .unwrap();
    assert_eq!(cleared, SessionSlot::Absent);
}

#[tokio::test]
async fn sqlite_overwrites_results() {
    let repo = connect("memdb_results").await;
    let learner = LearnerId::new(1);
    let lesson = LessonId::new(5);

    assert!(repo.get_result(learner, lesson).await.unwrap().is_none());

    let first = TestResult::first(TestAttempt::invalidated(
        InvalidReason::TabSwitch,
        vec![],
        20,
        fixed_now(),
    ));
    repo.put_result(learner, lesson, &first).await.unwrap();

    let second = TestResult::append(
        Some(&first),
        TestAttempt::scored(vec![], 20, 50, fixed_now()),
    );
    repo.put_result(learner, lesson, &second).await.unwrap();

    let stored = repo.get_result(learner, lesson).await.unwrap().unwrap();
    assert_eq!(stored, second);
    assert_eq!(
        stored.history()[0].invalid_reason(),
        Some(InvalidReason::TabSwitch)
    );
}

#[tokio::test]
async fn sqlite_drops_undecodable_snapshot() {
    let repo = connect("memdb_corrupt").await;
    sqlx::query(
        "INSERT INTO active_sessions (learner_id, lesson_id, snapshot, updated_at)
         VALUES (1, 1, 'not json', '2023-11-14T22:13:20Z')",
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let slot = repo
        .load_session(LearnerId::new(1), LessonId::new(1))
        .await
        .unwrap();
    assert_eq!(slot, SessionSlot::Absent);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM active_sessions")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::QuestionId;
use crate::model::question::Question;

//
// ─── ANSWERS ───────────────────────────────────────────────────────────────────
//

/// The learner's single, final choice for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnswer {
    pub question_id: QuestionId,
    pub selected_index: usize,
    pub is_correct: bool,
}

impl QuestionAnswer {
    /// Grade `selected_index` against `question`.
    #[must_use]
    pub fn grade(question: &Question, selected_index: usize) -> Self {
        Self {
            question_id: question.id(),
            selected_index,
            is_correct: question.is_correct(selected_index),
        }
    }
}

//
// ─── INVALIDATION ──────────────────────────────────────────────────────────────
//

/// Why an attempt was forcibly terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidReason {
    /// Too many switches away from the test view.
    TabSwitch,
    /// The learner confirmed "exit test".
    UserExit,
    /// A reload found the attempt already past its deadline.
    PageRefresh,
}

impl InvalidReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InvalidReason::TabSwitch => "tab-switch",
            InvalidReason::UserExit => "user-exit",
            InvalidReason::PageRefresh => "page-refresh",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── SCORING ───────────────────────────────────────────────────────────────────
//

/// `round(score / total * 100)`, half rounding up; zero when `total` is zero.
#[must_use]
pub fn round_percentage(score: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let score = u64::from(score.min(total));
    let total = u64::from(total);
    let pct = (score * 200 + total) / (total * 2);
    u32::try_from(pct).unwrap_or(100)
}

//
// ─── TEST ATTEMPT ──────────────────────────────────────────────────────────────
//

/// Immutable record of one finished or invalidated pass through a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAttempt {
    score: u32,
    total: u32,
    percentage: u32,
    passed: bool,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    answers: Vec<QuestionAnswer>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    invalidated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<InvalidReason>,
}

impl TestAttempt {
    /// Score a normally finished attempt (completion or timeout).
    ///
    /// Unanswered questions are simply absent from `answers` and count as wrong.
    #[must_use]
    pub fn scored(
        answers: Vec<QuestionAnswer>,
        total: u32,
        pass_percentage: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let correct = answers.iter().filter(|a| a.is_correct).count();
        let score = u32::try_from(correct).unwrap_or(u32::MAX).min(total);
        let percentage = round_percentage(score, total);
        Self {
            score,
            total,
            percentage,
            passed: percentage >= pass_percentage,
            timestamp,
            answers,
            invalidated: false,
            invalid_reason: None,
        }
    }

    /// Build a zero-credit attempt terminated for `reason`.
    ///
    /// Answers given so far are kept for review but never scored.
    #[must_use]
    pub fn invalidated(
        reason: InvalidReason,
        answers: Vec<QuestionAnswer>,
        total: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            score: 0,
            total,
            percentage: 0,
            passed: false,
            timestamp,
            answers,
            invalidated: true,
            invalid_reason: Some(reason),
        }
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn percentage(&self) -> u32 {
        self.percentage
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn answers(&self) -> &[QuestionAnswer] {
        &self.answers
    }

    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    #[must_use]
    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        self.invalid_reason
    }
}

//
// ─── TEST RESULT ───────────────────────────────────────────────────────────────
//

/// Aggregate result of a lesson test as seen by the rest of the portal.
///
/// Mirrors the latest attempt and carries the append-only attempt history;
/// `attempts()` is always the history length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TestResultRecord", into = "TestResultRecord")]
pub struct TestResult {
    history: Vec<TestAttempt>,
}

/// Wire shape of a result: latest-attempt fields flattened next to the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestResultRecord {
    #[serde(flatten)]
    latest: TestAttempt,
    #[serde(default)]
    attempts: usize,
    #[serde(default)]
    attempts_history: Vec<TestAttempt>,
}

impl From<TestResultRecord> for TestResult {
    fn from(record: TestResultRecord) -> Self {
        // Results written before history tracking only carry the latest fields.
        if record.attempts_history.is_empty() {
            return Self {
                history: vec![record.latest],
            };
        }
        Self {
            history: record.attempts_history,
        }
    }
}

impl From<TestResult> for TestResultRecord {
    fn from(result: TestResult) -> Self {
        let latest = result.latest().clone();
        Self {
            latest,
            attempts: result.history.len(),
            attempts_history: result.history,
        }
    }
}

impl TestResult {
    /// Start a history with its first attempt.
    #[must_use]
    pub fn first(attempt: TestAttempt) -> Self {
        Self {
            history: vec![attempt],
        }
    }

    /// Append `attempt` to an optional prior history.
    #[must_use]
    pub fn append(previous: Option<&TestResult>, attempt: TestAttempt) -> Self {
        let mut history = previous.map(|r| r.history.clone()).unwrap_or_default();
        history.push(attempt);
        Self { history }
    }

    #[must_use]
    pub fn latest(&self) -> &TestAttempt {
        // `history` is never empty: every constructor pushes at least one attempt.
        &self.history[self.history.len() - 1]
    }

    #[must_use]
    pub fn attempts(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn history(&self) -> &[TestAttempt] {
        &self.history
    }
}

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptConfigError {
    #[error("test duration must be > 0 seconds")]
    InvalidDuration,

    #[error("question count per attempt must be > 0")]
    InvalidMaxQuestions,

    #[error("at least one attempt must be allowed")]
    InvalidMaxAttempts,

    #[error("pass percentage must be between 0 and 100")]
    InvalidPassPercentage,
}

//
// ─── VIOLATION POLICY ──────────────────────────────────────────────────────────
//

/// When a switch away from the test view is counted as a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationPolicy {
    /// Count as soon as the learner leaves; warn when they come back.
    #[default]
    CountOnAway,
    /// Count only once the learner has left and come back.
    CountOnReturn,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Rules for timed lesson tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptConfig {
    duration_secs: u32,
    max_questions: usize,
    max_attempts: usize,
    max_violations: u32,
    pass_percentage: u32,
    violation_policy: ViolationPolicy,
}

impl Default for AttemptConfig {
    /// 20 minutes, 20 questions, 2 attempts, 3 tolerated tab switches, pass at 50%.
    fn default() -> Self {
        Self {
            duration_secs: 1200,
            max_questions: 20,
            max_attempts: 2,
            max_violations: 3,
            pass_percentage: 50,
            violation_policy: ViolationPolicy::CountOnAway,
        }
    }
}

impl AttemptConfig {
    /// Creates custom test rules.
    ///
    /// # Errors
    ///
    /// Returns `AttemptConfigError` if a count or duration is zero or the pass
    /// percentage is above 100.
    pub fn new(
        duration_secs: u32,
        max_questions: usize,
        max_attempts: usize,
        max_violations: u32,
        pass_percentage: u32,
        violation_policy: ViolationPolicy,
    ) -> Result<Self, AttemptConfigError> {
        if duration_secs == 0 {
            return Err(AttemptConfigError::InvalidDuration);
        }
        if max_questions == 0 {
            return Err(AttemptConfigError::InvalidMaxQuestions);
        }
        if max_attempts == 0 {
            return Err(AttemptConfigError::InvalidMaxAttempts);
        }
        if pass_percentage > 100 {
            return Err(AttemptConfigError::InvalidPassPercentage);
        }

        Ok(Self {
            duration_secs,
            max_questions,
            max_attempts,
            max_violations,
            pass_percentage,
            violation_policy,
        })
    }

    /// Same rules with a different time limit.
    ///
    /// # Errors
    ///
    /// Returns `AttemptConfigError::InvalidDuration` for a zero duration.
    pub fn with_duration_secs(self, duration_secs: u32) -> Result<Self, AttemptConfigError> {
        Self::new(
            duration_secs,
            self.max_questions,
            self.max_attempts,
            self.max_violations,
            self.pass_percentage,
            self.violation_policy,
        )
    }

    #[must_use]
    pub fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.violation_policy = policy;
        self
    }

    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::seconds(i64::from(self.duration_secs))
    }

    #[must_use]
    pub fn max_questions(&self) -> usize {
        self.max_questions
    }

    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    #[must_use]
    pub fn max_violations(&self) -> u32 {
        self.max_violations
    }

    #[must_use]
    pub fn pass_percentage(&self) -> u32 {
        self.pass_percentage
    }

    #[must_use]
    pub fn violation_policy(&self) -> ViolationPolicy {
        self.violation_policy
    }
}

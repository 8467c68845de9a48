use exam_core::model::{AttemptConfig, TestResult};

use crate::error::AttemptError;

/// Gate for starting another attempt after a terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetakeController {
    max_attempts: usize,
}

impl RetakeController {
    #[must_use]
    pub fn new(config: &AttemptConfig) -> Self {
        Self {
            max_attempts: config.max_attempts(),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    #[must_use]
    pub fn is_available(&self, history: Option<&TestResult>, terminal: bool) -> bool {
        self.check(history, terminal).is_ok()
    }

    /// # Errors
    ///
    /// Returns `AttemptError::RetakeUnavailable` while no terminal attempt is
    /// shown and `AttemptError::AttemptsExhausted` once the history is full.
    pub fn check(&self, history: Option<&TestResult>, terminal: bool) -> Result<(), AttemptError> {
        if !terminal {
            return Err(AttemptError::RetakeUnavailable);
        }
        let used = history.map_or(0, TestResult::attempts);
        if used >= self.max_attempts {
            return Err(AttemptError::AttemptsExhausted {
                max: self.max_attempts,
            });
        }
        Ok(())
    }

    /// Attempt number shown to the learner, capped at the maximum.
    #[must_use]
    pub fn attempt_number(&self, history: Option<&TestResult>, terminal: bool) -> usize {
        let used = history.map_or(0, TestResult::attempts);
        let current = if terminal { used } else { used + 1 };
        current.clamp(1, self.max_attempts)
    }
}

//! Tab-switch detection for running attempts.
//!
//! Host environments report raw events; pluggable [`ProctoringSignal`]s turn
//! them into "learner left" / "learner came back" suspicions, and the
//! [`IntegrityMonitor`] counts violations against the configured allowance.

use std::fmt;

use crate::model::{AttemptConfig, ViolationPolicy};

//
// ─── ENVIRONMENT EVENTS ────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Raw event delivered by the host shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentEvent {
    Visibility(Visibility),
    Focus { focused: bool },
}

/// Interpretation of an event by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspicion {
    Left,
    Returned,
}

//
// ─── SIGNALS ───────────────────────────────────────────────────────────────────
//

/// A source of "the learner is not looking at the test" evidence.
pub trait ProctoringSignal: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Map a host event to a suspicion, or `None` if this signal ignores it.
    fn interpret(&mut self, event: &EnvironmentEvent) -> Option<Suspicion>;
}

/// Page visibility changes (tab switch, minimized window).
#[derive(Debug, Default)]
pub struct VisibilitySignal {
    hidden: bool,
}

impl ProctoringSignal for VisibilitySignal {
    fn name(&self) -> &'static str {
        "visibility"
    }

    fn interpret(&mut self, event: &EnvironmentEvent) -> Option<Suspicion> {
        let EnvironmentEvent::Visibility(v) = event else {
            return None;
        };
        match (self.hidden, v) {
            (false, Visibility::Hidden) => {
                self.hidden = true;
                Some(Suspicion::Left)
            }
            (true, Visibility::Visible) => {
                self.hidden = false;
                Some(Suspicion::Returned)
            }
            _ => None,
        }
    }
}

/// Window focus loss. Not registered by default.
#[derive(Debug, Default)]
pub struct FocusSignal {
    blurred: bool,
}

impl ProctoringSignal for FocusSignal {
    fn name(&self) -> &'static str {
        "focus"
    }

    fn interpret(&mut self, event: &EnvironmentEvent) -> Option<Suspicion> {
        let EnvironmentEvent::Focus { focused } = *event else {
            return None;
        };
        if focused == self.blurred {
            self.blurred = !focused;
            return Some(if focused {
                Suspicion::Returned
            } else {
                Suspicion::Left
            });
        }
        None
    }
}

//
// ─── VERDICTS ──────────────────────────────────────────────────────────────────
//

/// Warning shown when the learner comes back to the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityWarning {
    pub violations: u32,
    pub remaining_allowance: u32,
}

impl IntegrityWarning {
    #[must_use]
    pub fn message(&self) -> String {
        match self.remaining_allowance {
            0 => "You left the test view. One more switch will cancel this attempt.".to_string(),
            n => format!(
                "You left the test view ({} so far). {n} more switch(es) allowed.",
                self.violations
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityVerdict {
    /// Nothing to surface.
    Ignored,
    /// A violation was recorded; no UI yet.
    Counted { violations: u32 },
    Warn(IntegrityWarning),
    /// Allowance exceeded; the attempt must be invalidated. Reported once.
    Invalidate { violations: u32 },
}

//
// ─── MONITOR ───────────────────────────────────────────────────────────────────
//

#[derive(Debug)]
pub struct IntegrityMonitor {
    signals: Vec<Box<dyn ProctoringSignal>>,
    policy: ViolationPolicy,
    max_violations: u32,
    violation_count: u32,
    /// One flag per registered signal; the learner is away while any is set.
    away: Vec<bool>,
    tripped: bool,
}

impl IntegrityMonitor {
    /// Monitor with the visibility signal registered.
    #[must_use]
    pub fn new(config: &AttemptConfig) -> Self {
        Self {
            signals: vec![Box::new(VisibilitySignal::default())],
            policy: config.violation_policy(),
            max_violations: config.max_violations(),
            violation_count: 0,
            away: vec![false],
            tripped: false,
        }
    }

    #[must_use]
    pub fn with_signal(mut self, signal: Box<dyn ProctoringSignal>) -> Self {
        self.signals.push(signal);
        self.away.push(false);
        self
    }

    /// Continue counting from a restored attempt.
    #[must_use]
    pub fn resumed_at(mut self, violation_count: u32) -> Self {
        self.violation_count = violation_count;
        self
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    #[must_use]
    pub fn remaining_allowance(&self) -> u32 {
        self.max_violations.saturating_sub(self.violation_count)
    }

    #[must_use]
    pub fn is_over_limit(&self) -> bool {
        self.violation_count > self.max_violations
    }

    #[must_use]
    pub fn signal_names(&self) -> Vec<&'static str> {
        self.signals.iter().map(|s| s.name()).collect()
    }

    /// Feed a host event through every registered signal.
    pub fn observe(&mut self, event: &EnvironmentEvent) -> IntegrityVerdict {
        let mut verdict = IntegrityVerdict::Ignored;
        for i in 0..self.signals.len() {
            if let Some(suspicion) = self.signals[i].interpret(event) {
                let next = self.handle(i, suspicion);
                if next != IntegrityVerdict::Ignored {
                    verdict = next;
                }
            }
        }
        verdict
    }

    fn is_away(&self) -> bool {
        self.away.iter().any(|away| *away)
    }

    /// Apply one suspicion from the signal at `source`. Overlapping "left"
    /// reports from different signals count once, and the learner is back
    /// only when no signal still reports them away.
    fn handle(&mut self, source: usize, suspicion: Suspicion) -> IntegrityVerdict {
        if self.tripped {
            return IntegrityVerdict::Ignored;
        }
        let was_away = self.is_away();
        self.away[source] = suspicion == Suspicion::Left;
        let now_away = self.is_away();

        match (suspicion, self.policy) {
            (Suspicion::Left, _) if was_away => IntegrityVerdict::Ignored,
            (Suspicion::Left, ViolationPolicy::CountOnAway) => self.count(),
            (Suspicion::Left, ViolationPolicy::CountOnReturn) => IntegrityVerdict::Ignored,
            (Suspicion::Returned, _) if !was_away || now_away => IntegrityVerdict::Ignored,
            (Suspicion::Returned, ViolationPolicy::CountOnAway) => self.warning(),
            (Suspicion::Returned, ViolationPolicy::CountOnReturn) => match self.count() {
                IntegrityVerdict::Counted { .. } => self.warning(),
                other => other,
            },
        }
    }

    fn count(&mut self) -> IntegrityVerdict {
        self.violation_count = self.violation_count.saturating_add(1);
        if self.is_over_limit() {
            self.tripped = true;
            return IntegrityVerdict::Invalidate {
                violations: self.violation_count,
            };
        }
        IntegrityVerdict::Counted {
            violations: self.violation_count,
        }
    }

    fn warning(&self) -> IntegrityVerdict {
        if (1..=self.max_violations).contains(&self.violation_count) {
            IntegrityVerdict::Warn(IntegrityWarning {
                violations: self.violation_count,
                remaining_allowance: self.remaining_allowance(),
            })
        } else {
            IntegrityVerdict::Ignored
        }
    }
}

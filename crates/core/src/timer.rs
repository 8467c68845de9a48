use chrono::{DateTime, Duration, Utc};

/// Outcome of polling the timer at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub remaining: Duration,
    /// `true` only for the first poll that observes the deadline.
    pub expired_now: bool,
}

/// Countdown for one attempt, anchored at its absolute start instant.
///
/// Remaining time is always `duration - (now - started_at)`, clamped at zero.
/// Expiry latches: exactly one poll reports `expired_now`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTimer {
    started_at: DateTime<Utc>,
    duration: Duration,
    fired: bool,
}

impl SessionTimer {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            started_at,
            duration,
            fired: false,
        }
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + self.duration
    }

    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let elapsed = (now - self.started_at).max(Duration::zero());
        (self.duration - elapsed).max(Duration::zero())
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now) <= Duration::zero()
    }

    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn poll(&mut self, now: DateTime<Utc>) -> TimerTick {
        let remaining = self.remaining(now);
        let expired_now = remaining <= Duration::zero() && !self.fired;
        if expired_now {
            self.fired = true;
        }
        TimerTick {
            remaining,
            expired_now,
        }
    }
}

/// Render a countdown as `MM:SS`, rounding partial seconds down.
#[must_use]
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

use std::sync::Mutex;

/// Host-shell hook that blocks navigation and logout while a test runs.
///
/// The engine raises it when an attempt starts or resumes and lowers it
/// exactly once when the attempt is finalized or the view is torn down.
pub trait NavigationGuard: Send + Sync {
    fn set_test_in_progress(&self, in_progress: bool);
}

/// Guard for hosts without navigation to block.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGuard;

impl NavigationGuard for NoopGuard {
    fn set_test_in_progress(&self, _in_progress: bool) {}
}

/// Guard that records every notification, in order.
#[derive(Debug, Default)]
pub struct RecordingGuard {
    calls: Mutex<Vec<bool>>,
}

impl RecordingGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<bool> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Current state as last reported; `false` if never raised.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.calls().last().copied().unwrap_or(false)
    }
}

impl NavigationGuard for RecordingGuard {
    fn set_test_in_progress(&self, in_progress: bool) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(in_progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_guard_tracks_order() {
        let guard = RecordingGuard::new();
        assert!(!guard.in_progress());
        guard.set_test_in_progress(true);
        guard.set_test_in_progress(false);
        assert_eq!(guard.calls(), vec![true, false]);
        assert!(!guard.in_progress());
    }
}

//! Worker lifecycle state.

use std::fmt;

/// Lifecycle of a `BoundedWorker`.
///
/// State machine: Initial -> Operational -> Stopped. `Stopped` is terminal;
/// a worker stopped before it was ever started goes straight from `Initial`
/// to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Constructed, no pool allocated yet.
    Initial,
    /// Pool running and accepting submissions.
    Operational,
    /// Shut down. Submissions are rejected forever.
    Stopped,
}

impl WorkerState {
    /// Returns the lowercase name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Operational => "operational",
            Self::Stopped => "stopped",
        }
    }

    /// Whether submissions may be admitted in this state.
    #[must_use]
    pub const fn accepts_work(self) -> bool {
        matches!(self, Self::Operational)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_operational_accepts_work() {
        assert!(!WorkerState::Initial.accepts_work());
        assert!(WorkerState::Operational.accepts_work());
        assert!(!WorkerState::Stopped.accepts_work());
    }

    #[test]
    fn display_matches_as_str() {
        for state in [
            WorkerState::Initial,
            WorkerState::Operational,
            WorkerState::Stopped,
        ] {
            assert_eq!(state.to_string(), state.as_str());
        }
    }
}

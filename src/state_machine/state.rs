//! Session lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Record exists, loop has never run
    #[default]
    Idle,
    /// Orchestration loop running
    Active,
    /// Loop stopped, transcript and configs retained
    Paused,
    /// Deleted; no further transitions
    Terminated,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Terminated => "terminated",
        }
    }

    /// Parse a stored lifecycle value. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(SessionState::Idle),
            "active" => Some(SessionState::Active),
            "paused" => Some(SessionState::Paused),
            "terminated" => Some(SessionState::Terminated),
            _ => None,
        }
    }

    /// State a session resumes in after being read back from storage.
    /// Generation never restarts on its own.
    pub fn on_load(stored: Option<Self>) -> Self {
        match stored {
            Some(SessionState::Idle) => SessionState::Idle,
            Some(SessionState::Active | SessionState::Paused | SessionState::Terminated)
            | None => SessionState::Paused,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Terminated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime facts the transition table consults besides the state itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionContext {
    /// A call to the turn generator is outstanding
    pub generation_in_flight: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips() {
        for state in [
            SessionState::Idle,
            SessionState::Active,
            SessionState::Paused,
            SessionState::Terminated,
        ] {
            assert_eq!(SessionState::parse(state.as_str()), Some(state));
        }
        assert_eq!(SessionState::parse("running"), None);
    }

    #[test]
    fn test_load_never_auto_resumes() {
        assert_eq!(SessionState::on_load(None), SessionState::Paused);
        assert_eq!(
            SessionState::on_load(Some(SessionState::Active)),
            SessionState::Paused
        );
        assert_eq!(
            SessionState::on_load(Some(SessionState::Idle)),
            SessionState::Idle
        );
    }
}

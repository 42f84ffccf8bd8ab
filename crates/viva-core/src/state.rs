//! Session state machine states
//!
//! Idle → Awaiting → Streaming → Draining → Finished
//!                                        ↘ Cancelled | Errored

use std::fmt;

/// State of a speech session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No session
    #[default]
    Idle,
    /// Request sent to the producer, no chunk yet
    Awaiting,
    /// At least one chunk received, playback underway
    Streaming,
    /// Producer finished, queued audio still playing
    Draining,
    /// All audio played
    Finished,
    /// Stopped by the caller
    Cancelled,
    /// Producer error or broken ordering
    Errored,
}

impl SessionState {
    /// A terminal state ends the session
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Finished | SessionState::Cancelled | SessionState::Errored
        )
    }

    /// An active state blocks a new session from starting
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Awaiting | SessionState::Streaming | SessionState::Draining
        )
    }

    /// Whether chunks from the producer are still expected
    pub fn accepts_chunks(self) -> bool {
        matches!(self, SessionState::Awaiting | SessionState::Streaming)
    }

    pub fn name(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Awaiting => "awaiting",
            SessionState::Streaming => "streaming",
            SessionState::Draining => "draining",
            SessionState::Finished => "finished",
            SessionState::Cancelled => "cancelled",
            SessionState::Errored => "errored",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_classes() {
        assert!(!SessionState::Idle.is_active());
        assert!(!SessionState::Idle.is_terminal());

        for state in [
            SessionState::Awaiting,
            SessionState::Streaming,
            SessionState::Draining,
        ] {
            assert!(state.is_active());
            assert!(!state.is_terminal());
        }

        for state in [
            SessionState::Finished,
            SessionState::Cancelled,
            SessionState::Errored,
        ] {
            assert!(state.is_terminal());
            assert!(!state.is_active());
        }
    }

    #[test]
    fn test_draining_rejects_chunks() {
        assert!(SessionState::Streaming.accepts_chunks());
        assert!(!SessionState::Draining.accepts_chunks());
        assert_eq!(SessionState::Draining.to_string(), "draining");
    }
}

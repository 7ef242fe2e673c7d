use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the coaching session
///
/// `Idle → Connecting` on start, `Connecting → Active` once the remote confirms
/// and capture is wired, `Active → Closed` on stop, remote close or remote error.
/// `Closed` stays put until the next start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
    Closed,
}

impl SessionState {
    /// `start()` is accepted from here
    pub fn can_start(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Closed)
    }

    /// A session is being set up or running
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

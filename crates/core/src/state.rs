use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the one authenticated session the bridge maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Driver connected, login not yet attempted or restored.
    Initializing,
    /// A QR challenge is pending, or the last authentication failed.
    AwaitingAuth,
    Ready,
    Disconnected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::AwaitingAuth => "awaiting_auth",
            SessionState::Ready => "ready",
            SessionState::Disconnected => "disconnected",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Error taxonomy for a live coaching session.
use thiserror::Error;

use crate::session::SessionState;

/// Failures surfaced by the session engine.
///
/// A server-initiated close is a graceful termination and has no variant here.
#[derive(Debug, Clone, Error)]
pub enum CoachError {
    /// Microphone denied or unavailable. The session never opens.
    #[error("microphone unavailable: {0}")]
    Permission(String),
    /// Remote open or handshake failure. The controller reverts to `Idle`.
    #[error("connection failed: {0}")]
    Connection(String),
    /// Mid-session send failure. Callers drop the affected chunk.
    #[error("transport: {0}")]
    Transport(String),
    /// Malformed inbound audio payload.
    #[error("audio decode: {0}")]
    Decode(String),
    /// `start()` while a session is already connecting or active.
    #[error("session already {0}")]
    SessionActive(SessionState),
}

pub type CoachResult<T> = std::result::Result<T, CoachError>;

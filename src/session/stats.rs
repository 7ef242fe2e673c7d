use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::SessionState;

/// Statistics about the current (or most recent) coaching session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub state: SessionState,

    /// Id of the live session, once the remote confirmed it
    pub session_id: Option<Uuid>,

    /// When the session became active
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Outbound chunks handed to the transport
    pub chunks_sent: usize,

    /// Outbound chunks dropped (queue full, link closed)
    pub chunks_dropped: usize,

    /// Inbound audio buffers scheduled for playback
    pub units_scheduled: usize,

    /// Inbound audio payloads skipped as malformed or unplayable
    pub units_dropped: usize,

    /// Buffers currently playing or queued on the device
    pub units_in_flight: usize,

    /// Entries in the transcript log
    pub transcript_entries: usize,
}

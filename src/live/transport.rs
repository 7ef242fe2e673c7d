use anyhow::Result;
use tokio::sync::mpsc;

use super::messages::{LiveSetup, RealtimeInput, ServerMessage};

/// Client → transport traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    RealtimeInput(RealtimeInput),
    /// Ask the remote end to close the session
    Close,
}

/// Transport → client traffic
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Message(ServerMessage),
    /// Remote closed the session
    Closed { reason: Option<String> },
    /// Remote or transport failure; the session is over
    Error(String),
}

/// An open link to the remote model
///
/// The transport resolves `connect` only once the remote has confirmed the
/// session, which is the "open" signal.
pub struct LiveLink {
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Bidirectional session transport to the remote conversational model
#[async_trait::async_trait]
pub trait LiveTransport: Send + Sync {
    /// Perform the handshake for `setup` and return the open link
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveLink>;

    /// Get transport name for logging
    fn name(&self) -> &str;
}

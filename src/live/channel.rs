// Session channel: the single logical connection to the remote model
//
// Wraps a `LiveTransport` with the session rules: one active session at a time,
// best-effort sends, idempotent close, and classification of inbound traffic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};
use uuid::Uuid;

use super::messages::{Blob, LiveSetup, RealtimeInput};
use super::transport::{ClientMessage, LiveTransport, TransportEvent};
use crate::audio::{ChunkSink, EncodedChunk};
use crate::error::{CoachError, CoachResult};

/// Inbound event kinds, routed to the transcript log or the playback scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Fragment of the model's spoken reply
    OutputTranscript(String),
    /// Fragment of the user's recognized speech
    InputTranscript(String),
    /// Base64 PCM audio from the model
    Audio(String),
    /// Remote closed the session
    Close(Option<String>),
    /// Remote or transport error
    Error(String),
}

/// Split one transport event into every event kind it carries
///
/// A single server message may hold transcripts and audio at once; all of them
/// are returned, transcripts first, audio parts in order.
pub fn classify(event: TransportEvent) -> Vec<InboundEvent> {
    match event {
        TransportEvent::Message(message) => {
            let mut events = Vec::new();
            let Some(content) = message.server_content else {
                return events;
            };

            if let Some(text) = content.output_transcription.and_then(|t| t.text) {
                events.push(InboundEvent::OutputTranscript(text));
            }
            if let Some(text) = content.input_transcription.and_then(|t| t.text) {
                events.push(InboundEvent::InputTranscript(text));
            }
            if let Some(turn) = content.model_turn {
                events.extend(
                    turn.parts
                        .into_iter()
                        .filter_map(|part| part.inline_data)
                        .filter(|blob| {
                            blob.mime_type
                                .as_deref()
                                .map_or(true, |mime| mime.starts_with("audio/"))
                        })
                        .map(|blob| InboundEvent::Audio(blob.data)),
                );
            }
            events
        }
        TransportEvent::Closed { reason } => vec![InboundEvent::Close(reason)],
        TransportEvent::Error(message) => vec![InboundEvent::Error(message)],
    }
}

struct HandleInner {
    id: Uuid,
    outbound: mpsc::Sender<ClientMessage>,
    open: AtomicBool,
}

/// The open session. Cheap to clone; every clone refers to the same connection
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    fn new(id: Uuid, outbound: mpsc::Sender<ClientMessage>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                outbound,
                open: AtomicBool::new(true),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Queue one chunk without waiting. A closed handle swallows it silently
    pub fn send_chunk(&self, chunk: EncodedChunk) -> CoachResult<()> {
        if !self.is_open() {
            return Ok(());
        }

        let input = RealtimeInput {
            media: Blob {
                data: chunk.data,
                mime_type: Some(chunk.mime_type),
            },
        };

        self.inner
            .outbound
            .try_send(ClientMessage::RealtimeInput(input))
            .map_err(|e| match e {
                TrySendError::Full(_) => CoachError::Transport("outbound queue full".to_string()),
                TrySendError::Closed(_) => CoachError::Transport("link closed".to_string()),
            })
    }

    /// Returns true only for the call that actually closed it
    fn mark_closed(&self) -> bool {
        self.inner.open.swap(false, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.inner.id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// As the capture sink, a closed handle rejects chunks so they count as dropped
impl ChunkSink for SessionHandle {
    fn submit(&self, chunk: EncodedChunk) -> CoachResult<()> {
        if !self.is_open() {
            return Err(CoachError::Transport("session closed".to_string()));
        }
        self.send_chunk(chunk)
    }
}

/// Owner of the single-session invariant
pub struct SessionChannel {
    transport: Arc<dyn LiveTransport>,
    active: Arc<Mutex<Option<Uuid>>>,
}

impl SessionChannel {
    pub fn new(transport: Arc<dyn LiveTransport>) -> Self {
        Self {
            transport,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Open a session. Fails if one is already active or the remote refuses
    pub async fn open(
        &self,
        setup: &LiveSetup,
    ) -> CoachResult<(SessionHandle, mpsc::Receiver<TransportEvent>)> {
        setup.validate().map_err(CoachError::Connection)?;

        let id = Uuid::new_v4();
        let reservation = self.reserve(id)?;

        info!(
            "Opening live session {} via {} (model: {})",
            id,
            self.transport.name(),
            setup.model
        );

        let link = self
            .transport
            .connect(setup)
            .await
            .map_err(|e| CoachError::Connection(format!("{:#}", e)))?;

        reservation.keep();
        info!("Live session {} open", id);

        Ok((SessionHandle::new(id, link.outbound), link.inbound))
    }

    /// Best-effort send on `handle`
    pub fn send_audio_chunk(&self, handle: &SessionHandle, chunk: EncodedChunk) -> CoachResult<()> {
        handle.send_chunk(chunk)
    }

    /// Close `handle`. Closing twice, or closing a stale handle, does nothing
    pub fn close(&self, handle: &SessionHandle) {
        if handle.mark_closed() {
            if let Err(e) = handle.inner.outbound.try_send(ClientMessage::Close) {
                debug!("Close request not queued ({}); link ends when senders drop", e);
            }
            info!("Live session {} closed", handle.id());
        }

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if *active == Some(handle.id()) {
            *active = None;
        }
    }

    /// Id of the active session, if any
    pub fn active_session(&self) -> Option<Uuid> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self, id: Uuid) -> CoachResult<Reservation> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = *active {
            return Err(CoachError::Connection(format!(
                "session {} is already active",
                existing
            )));
        }
        *active = Some(id);

        Ok(Reservation {
            active: Arc::clone(&self.active),
            id,
            armed: true,
        })
    }
}

/// Releases the session slot unless the open completed
struct Reservation {
    active: Arc<Mutex<Option<Uuid>>>,
    id: Uuid,
    armed: bool,
}

impl Reservation {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if *active == Some(self.id) {
            *active = None;
        }
    }
}

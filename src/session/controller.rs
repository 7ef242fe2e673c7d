use super::config::SessionConfig;
use super::state::SessionState;
use super::stats::SessionStats;
use super::transcript::{Speaker, TranscriptEntry, TranscriptLog};
use crate::audio::{
    AudioBackend, AudioFrame, AudioSink, CaptureHandle, CapturePipeline, CaptureStats,
    MicrophoneProvider, PlaybackScheduler,
};
use crate::error::{CoachError, CoachResult};
use crate::live::{classify, InboundEvent, LiveTransport, SessionChannel, SessionHandle, TransportEvent};
use chrono::{DateTime, Utc};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Orchestrates one coaching session at a time: microphone, live channel,
/// capture pipeline, playback scheduler and transcript
///
/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    /// Session configuration
    config: SessionConfig,

    /// Live channel to the remote model (owns the single-session invariant)
    channel: SessionChannel,

    /// Capture device access
    microphone: Arc<dyn MicrophoneProvider>,

    /// Output device and playback clock
    sink: Arc<dyn AudioSink>,

    /// Observable lifecycle state; only written while `live` is locked
    state: watch::Sender<SessionState>,

    /// Accumulated transcript, kept across sessions
    transcript: TranscriptLog,

    /// Everything owned by the running session
    live: Mutex<Live>,
}

/// Per-session resources, reset on every start
#[derive(Default)]
struct Live {
    /// Bumped by every start, stop and remote termination. Work started under
    /// an older generation must not touch the session.
    generation: u64,

    session_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    handle: Option<SessionHandle>,

    /// Microphone acquired but not yet wired (Connecting)
    pending_capture: Option<(Box<dyn AudioBackend>, mpsc::Receiver<AudioFrame>)>,

    capture: Option<CaptureHandle>,
    capture_stats: Arc<CaptureStats>,
    scheduler: Option<PlaybackScheduler>,

    /// Inbound event handler task
    dispatch: Option<JoinHandle<()>>,

    /// Playback counters of the last torn-down scheduler
    units_scheduled: usize,
    units_dropped: usize,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn LiveTransport>,
        microphone: Arc<dyn MicrophoneProvider>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);

        Self {
            inner: Arc::new(Inner {
                config,
                channel: SessionChannel::new(transport),
                microphone,
                sink,
                state,
                transcript: TranscriptLog::new(),
                live: Mutex::new(Live::default()),
            }),
        }
    }

    /// Start a session
    ///
    /// Valid from `Idle` or `Closed`. Resolves once the session is `Active`, or
    /// with `Ok` and no session if `stop()` won the race against the handshake.
    pub async fn start(&self) -> CoachResult<()> {
        let generation = {
            let mut live = self.inner.live.lock().await;
            let state = self.state();
            if !state.can_start() {
                warn!("Session already {}; ignoring start", state);
                return Err(CoachError::SessionActive(state));
            }

            live.generation += 1;
            live.session_id = None;
            live.started_at = None;
            self.inner.set_state(SessionState::Connecting);
            live.generation
        };

        info!("Starting coaching session (model: {})", self.inner.config.model);

        // Microphone first: a denied device never opens a session
        let (backend, frames) = match self.inner.microphone.acquire().await {
            Ok(capture) => capture,
            Err(e) => {
                warn!("Microphone unavailable: {}", e);
                self.inner.abandon(generation).await;
                return Err(e);
            }
        };

        {
            let mut live = self.inner.live.lock().await;
            if !self.inner.is_connecting(&live, generation) {
                drop(live);
                info!("Session stopped while acquiring microphone");
                release_backend(backend).await;
                return Ok(());
            }
            live.pending_capture = Some((backend, frames));
        }

        let setup = self.inner.config.live_setup();
        let (handle, inbound) = match self.inner.channel.open(&setup).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Failed to open live session: {}", e);
                self.inner.abandon(generation).await;
                return Err(e);
            }
        };

        let mut live = self.inner.live.lock().await;

        // The handshake may resolve after stop(); never revive a stopped session
        if !self.inner.is_connecting(&live, generation) {
            info!("Live session {} opened after stop; discarding", handle.id());
            self.inner.channel.close(&handle);
            return Ok(());
        }

        let Some((backend, mut frames)) = live.pending_capture.take() else {
            self.inner.channel.close(&handle);
            return Ok(());
        };

        // Audio captured while connecting is not sent
        let mut stale = 0usize;
        while frames.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!("Discarded {} frames captured before the session opened", stale);
        }

        let capture_stats = Arc::new(CaptureStats::default());
        let pipeline = CapturePipeline::new(self.inner.config.capture_config());
        live.capture = Some(pipeline.spawn(
            backend,
            frames,
            Arc::new(handle.clone()),
            Arc::clone(&capture_stats),
        ));
        live.capture_stats = capture_stats;

        live.scheduler = Some(PlaybackScheduler::new(
            Arc::clone(&self.inner.sink),
            self.inner.config.output_sample_rate,
            self.inner.config.output_channels,
        ));

        live.dispatch = Some(tokio::spawn(dispatch(
            Arc::clone(&self.inner),
            generation,
            inbound,
        )));

        live.session_id = Some(handle.id());
        live.started_at = Some(Utc::now());
        live.handle = Some(handle);
        live.units_scheduled = 0;
        live.units_dropped = 0;

        self.inner.set_state(SessionState::Active);
        info!("Coaching session active");

        Ok(())
    }

    /// Stop the session
    ///
    /// Safe from any state. From `Connecting` or `Active` it closes the channel,
    /// unwires capture, stops playback and lands in `Closed`; otherwise no-op.
    pub async fn stop(&self) -> CoachResult<()> {
        let mut live = self.inner.live.lock().await;
        let state = self.state();
        if !state.is_live() {
            debug!("No live session to stop ({})", state);
            return Ok(());
        }

        info!("Stopping coaching session");

        live.generation += 1;
        self.inner.teardown(&mut live, true).await;
        self.inner.set_state(SessionState::Closed);

        info!("Coaching session stopped");

        Ok(())
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Get accumulated transcript
    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.inner.transcript.snapshot().await
    }

    /// Receive transcript entries as they arrive
    pub fn subscribe_transcript(&self) -> broadcast::Receiver<TranscriptEntry> {
        self.inner.transcript.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Get current session statistics
    pub async fn stats(&self) -> SessionStats {
        let transcript_entries = self.inner.transcript.len().await;
        let live = self.inner.live.lock().await;

        let (units_scheduled, units_dropped, units_in_flight) = match &live.scheduler {
            Some(s) => (s.units_scheduled(), s.units_dropped(), s.in_flight()),
            None => (live.units_scheduled, live.units_dropped, 0),
        };

        let duration_secs = live
            .started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            state: self.state(),
            session_id: live.session_id,
            started_at: live.started_at,
            duration_secs,
            chunks_sent: live.capture_stats.chunks_sent.load(Ordering::Relaxed),
            chunks_dropped: live.capture_stats.chunks_dropped.load(Ordering::Relaxed),
            units_scheduled,
            units_dropped,
            units_in_flight,
            transcript_entries,
        }
    }
}

impl Inner {
    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Session state {} -> {}", previous, next);
        }
    }

    fn is_connecting(&self, live: &Live, generation: u64) -> bool {
        live.generation == generation && *self.state.borrow() == SessionState::Connecting
    }

    /// A start failed before going active: release the microphone, back to Idle
    async fn abandon(&self, generation: u64) {
        let mut live = self.live.lock().await;
        if !self.is_connecting(&live, generation) {
            return;
        }

        if let Some((backend, _)) = live.pending_capture.take() {
            release_backend(backend).await;
        }
        self.set_state(SessionState::Idle);
    }

    /// Append a fragment unless the session has moved on. Holds the session lock
    /// so a concurrent stop either sees the entry or the dispatcher sees the stop
    async fn append_transcript(&self, generation: u64, speaker: Speaker, text: String) -> bool {
        let live = self.live.lock().await;
        if live.generation != generation {
            return false;
        }
        self.transcript.append(speaker, text).await;
        true
    }

    /// Remote close, remote error or end of the inbound stream
    async fn terminate(&self, generation: u64) {
        let mut live = self.live.lock().await;
        if live.generation != generation || *self.state.borrow() != SessionState::Active {
            return;
        }

        live.generation += 1;
        // Called from the dispatch task itself, so detach rather than abort
        self.teardown(&mut live, false).await;
        self.set_state(SessionState::Closed);

        info!("Coaching session closed by remote");
    }

    /// Release every per-session resource
    async fn teardown(&self, live: &mut Live, abort_dispatch: bool) {
        if let Some(handle) = live.handle.take() {
            self.channel.close(&handle);
        }

        if let Some(capture) = live.capture.take() {
            capture.stop().await;
        }

        if let Some((backend, _)) = live.pending_capture.take() {
            release_backend(backend).await;
        }

        if let Some(mut scheduler) = live.scheduler.take() {
            scheduler.stop_all();
            live.units_scheduled = scheduler.units_scheduled();
            live.units_dropped = scheduler.units_dropped();
        }

        if let Some(task) = live.dispatch.take() {
            if abort_dispatch {
                task.abort();
            }
        }
    }
}

async fn release_backend(mut backend: Box<dyn AudioBackend>) {
    if let Err(e) = backend.stop().await {
        error!("Failed to stop audio backend: {}", e);
    }
}

/// Inbound event handler: one per session, events handled strictly in order
async fn dispatch(
    inner: Arc<Inner>,
    generation: u64,
    mut inbound: mpsc::Receiver<TransportEvent>,
) {
    debug!("Inbound dispatch started");

    while let Some(event) = inbound.recv().await {
        for event in classify(event) {
            match event {
                InboundEvent::OutputTranscript(text) => {
                    if !inner.append_transcript(generation, Speaker::Model, text).await {
                        return;
                    }
                }
                InboundEvent::InputTranscript(text) => {
                    if !inner.append_transcript(generation, Speaker::User, text).await {
                        return;
                    }
                }
                InboundEvent::Audio(data) => {
                    let mut live = inner.live.lock().await;
                    if live.generation != generation {
                        return;
                    }
                    if let Some(scheduler) = live.scheduler.as_mut() {
                        scheduler.enqueue_encoded(&data);
                    }
                }
                InboundEvent::Close(reason) => {
                    info!(
                        "Remote closed the session ({})",
                        reason.as_deref().unwrap_or("no reason")
                    );
                    inner.terminate(generation).await;
                    return;
                }
                InboundEvent::Error(message) => {
                    warn!("Remote session error: {}", message);
                    inner.terminate(generation).await;
                    return;
                }
            }
        }
    }

    info!("Inbound stream ended");
    inner.terminate(generation).await;
}

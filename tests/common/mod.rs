// Test doubles for the external collaborators: remote model, microphone, speaker.
#![allow(dead_code)]

use anyhow::Result;
use maestro_live::audio::{
    AudioBackend, AudioFrame, AudioSink, MicrophoneProvider, PlaybackCompletion, PlaybackUnit,
    UnitId,
};
use maestro_live::live::{ClientMessage, LiveLink, LiveSetup, LiveTransport, TransportEvent};
use maestro_live::CoachError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Remote side of one mocked live session
pub struct RemoteEnd {
    pub setup: LiveSetup,
    pub events: mpsc::Sender<TransportEvent>,
    pub outbound: mpsc::Receiver<ClientMessage>,
}

impl RemoteEnd {
    /// Next client message, or None after a short wait
    pub async fn next_message(&mut self) -> Option<ClientMessage> {
        tokio::time::timeout(Duration::from_millis(500), self.outbound.recv())
            .await
            .ok()
            .flatten()
    }
}

pub struct MockTransport {
    remotes: mpsc::UnboundedSender<RemoteEnd>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    reject: Option<String>,
    pub connects: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        Self::build(None, None)
    }

    /// Handshake blocks until the returned sender fires (or is dropped)
    pub fn gated() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>, oneshot::Sender<()>) {
        let (gate_tx, gate_rx) = oneshot::channel();
        let (transport, remotes) = Self::build(Some(gate_rx), None);
        (transport, remotes, gate_tx)
    }

    pub fn rejecting(reason: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        Self::build(None, Some(reason.to_string()))
    }

    fn build(
        gate: Option<oneshot::Receiver<()>>,
        reject: Option<String>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            remotes: tx,
            gate: Mutex::new(gate),
            reject,
            connects: AtomicUsize::new(0),
        });
        (transport, rx)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LiveTransport for MockTransport {
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveLink> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if let Some(reason) = &self.reject {
            anyhow::bail!("remote rejected: {}", reason);
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(64);

        let _ = self.remotes.send(RemoteEnd {
            setup: setup.clone(),
            events: events_tx,
            outbound: outbound_rx,
        });

        Ok(LiveLink {
            outbound: outbound_tx,
            inbound: events_rx,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockBackend {
    capturing: bool,
    stops: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    release_gate: Option<oneshot::Receiver<()>>,
}

#[async_trait::async_trait]
impl AudioBackend for MockBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        anyhow::bail!("mock backend is started by MockMicrophone")
    }

    async fn stop(&mut self) -> Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.release_gate.take() {
            let _ = gate.await;
        }
        if self.capturing {
            self.capturing = false;
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "mock microphone"
    }
}

pub struct MockMicrophone {
    deny: bool,
    frames: Mutex<Option<mpsc::Sender<AudioFrame>>>,
    release_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub acquisitions: AtomicUsize,
    pub stops: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
}

impl MockMicrophone {
    pub fn granted() -> Arc<Self> {
        Arc::new(Self::build(false))
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self::build(true))
    }

    /// Releasing the device blocks until the returned sender fires (or is dropped)
    pub fn slow_release() -> (Arc<Self>, oneshot::Sender<()>) {
        let (gate_tx, gate_rx) = oneshot::channel();
        let microphone = Self::build(false);
        *microphone.release_gate.lock().unwrap() = Some(gate_rx);
        (Arc::new(microphone), gate_tx)
    }

    fn build(deny: bool) -> Self {
        Self {
            deny,
            frames: Mutex::new(None),
            release_gate: Mutex::new(None),
            acquisitions: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Feed the most recently acquired device
    pub fn sender(&self) -> mpsc::Sender<AudioFrame> {
        self.frames
            .lock()
            .unwrap()
            .clone()
            .expect("microphone was never acquired")
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Device releases begun, finished or not
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MicrophoneProvider for MockMicrophone {
    async fn acquire(
        &self,
    ) -> Result<(Box<dyn AudioBackend>, mpsc::Receiver<AudioFrame>), CoachError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if self.deny {
            return Err(CoachError::Permission("permission denied".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        *self.frames.lock().unwrap() = Some(tx);

        let backend = MockBackend {
            capturing: true,
            stops: Arc::clone(&self.stops),
            releases: Arc::clone(&self.releases),
            release_gate: self.release_gate.lock().unwrap().take(),
        };
        Ok((Box::new(backend), rx))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartedUnit {
    pub id: UnitId,
    pub start_at: f64,
    pub duration: f64,
}

/// Output device whose clock only moves when the test says so
#[derive(Default)]
pub struct ManualSink {
    now: Mutex<f64>,
    started: Mutex<Vec<StartedUnit>>,
    completions: Mutex<Vec<PlaybackCompletion>>,
    stopped: Mutex<Vec<UnitId>>,
    fail: AtomicBool,
}

impl ManualSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_time(&self, t: f64) {
        *self.now.lock().unwrap() = t;
    }

    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn started(&self) -> Vec<StartedUnit> {
        self.started.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<UnitId> {
        self.stopped.lock().unwrap().clone()
    }

    /// Fire the completion callback of `id`, as the device would at its end
    pub fn finish(&self, id: UnitId) {
        let mut completions = self.completions.lock().unwrap();
        if let Some(pos) = completions.iter().position(|c| c.id() == id) {
            completions.remove(pos).complete();
        }
    }
}

impl AudioSink for ManualSink {
    fn current_time(&self) -> f64 {
        *self.now.lock().unwrap()
    }

    fn start(&self, unit: &PlaybackUnit, on_ended: PlaybackCompletion) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("device unavailable");
        }
        self.started.lock().unwrap().push(StartedUnit {
            id: unit.id,
            start_at: unit.start_at,
            duration: unit.duration(),
        });
        self.completions.lock().unwrap().push(on_ended);
        Ok(())
    }

    fn stop(&self, id: UnitId) {
        self.stopped.lock().unwrap().push(id);
    }
}

/// Poll a condition (which may `.await`) until it holds or about two seconds pass
#[allow(unused_macros)]
macro_rules! eventually {
    ($cond:expr) => {{
        let mut satisfied = false;
        for _ in 0..400 {
            if $cond {
                satisfied = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        satisfied
    }};
}

/// Mono frame of `len` samples all set to `value`
pub fn mono_frame(value: f32, len: usize, sample_rate: u32) -> AudioFrame {
    AudioFrame {
        samples: vec![value; len],
        sample_rate,
        channels: 1,
        timestamp_ms: 0,
    }
}

/// Base64 24kHz mono PCM payload lasting `secs`
pub fn speech_payload(secs: f64) -> String {
    let samples = vec![0.25f32; (secs * 24000.0).round() as usize];
    maestro_live::audio::codec::encode_transport(&maestro_live::audio::codec::encode_frame(&samples))
}

// Playback scheduler for streamed model speech
//
// Decoded buffers are laid back to back on the output device's own clock. The
// cursor only moves forward: a late buffer is clamped to "now" (audible gap)
// rather than dropped or overlapped.

use anyhow::Result;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, warn};

use super::codec;
use crate::error::{CoachError, CoachResult};

/// Identity of one scheduled buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

/// A decoded buffer and where it sits on the playback timeline
#[derive(Debug, Clone)]
pub struct PlaybackUnit {
    pub id: UnitId,
    /// Per-channel samples in [-1, 1]
    pub planes: Vec<Vec<f32>>,
    pub sample_rate: u32,
    /// Start offset on the sink clock, in seconds
    pub start_at: f64,
}

impl PlaybackUnit {
    pub fn frame_count(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration()
    }
}

type InFlight = Arc<Mutex<HashSet<UnitId>>>;

/// Completion signal handed to the sink with each unit
///
/// Firing it removes the unit from the scheduler's in-flight set. It holds only a
/// weak reference, so a torn-down scheduler is never kept alive by the device.
#[derive(Debug)]
pub struct PlaybackCompletion {
    id: UnitId,
    in_flight: Weak<Mutex<HashSet<UnitId>>>,
}

impl PlaybackCompletion {
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Signal that the unit finished playing
    pub fn complete(self) {
        if let Some(in_flight) = self.in_flight.upgrade() {
            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

/// Audio output device with a monotonic playback clock
pub trait AudioSink: Send + Sync {
    /// Current time on the device clock, in seconds
    fn current_time(&self) -> f64;

    /// Begin playing `unit` at `unit.start_at`; fire `on_ended` when it finishes
    fn start(&self, unit: &PlaybackUnit, on_ended: PlaybackCompletion) -> Result<()>;

    /// Stop a unit immediately, whether or not it has started
    fn stop(&self, id: UnitId);
}

/// Per-session gapless scheduler
pub struct PlaybackScheduler {
    sink: Arc<dyn AudioSink>,
    sample_rate: u32,
    channels: u16,
    next_start_time: f64,
    next_id: u64,
    in_flight: InFlight,
    units_scheduled: usize,
    units_dropped: usize,
}

impl PlaybackScheduler {
    /// The cursor starts at the sink's current time
    pub fn new(sink: Arc<dyn AudioSink>, sample_rate: u32, channels: u16) -> Self {
        let next_start_time = sink.current_time();
        Self {
            sink,
            sample_rate,
            channels,
            next_start_time,
            next_id: 0,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            units_scheduled: 0,
            units_dropped: 0,
        }
    }

    /// Decode a base64 PCM payload and schedule it
    ///
    /// Malformed payloads are skipped; the scheduler keeps going.
    pub fn enqueue_encoded(&mut self, data: &str) -> Option<UnitId> {
        let planes = match decode_payload(data, self.channels) {
            Ok(planes) => planes,
            Err(e) => {
                self.units_dropped += 1;
                debug!("Skipping malformed audio payload: {}", e);
                return None;
            }
        };

        match self.schedule(planes) {
            Ok(id) => Some(id),
            Err(e) => {
                self.units_dropped += 1;
                warn!("Failed to schedule playback unit: {}", e);
                None
            }
        }
    }

    /// Schedule decoded planes at the cursor and advance it
    pub fn schedule(&mut self, planes: Vec<Vec<f32>>) -> Result<UnitId> {
        let now = self.sink.current_time();
        self.next_start_time = self.next_start_time.max(now);

        let id = UnitId(self.next_id);
        self.next_id += 1;

        let unit = PlaybackUnit {
            id,
            planes,
            sample_rate: self.sample_rate,
            start_at: self.next_start_time,
        };

        self.lock_in_flight().insert(id);
        let completion = PlaybackCompletion {
            id,
            in_flight: Arc::downgrade(&self.in_flight),
        };

        if let Err(e) = self.sink.start(&unit, completion) {
            self.lock_in_flight().remove(&id);
            return Err(e);
        }

        debug!(
            "Scheduled {} at {:.3}s for {:.3}s",
            id,
            unit.start_at,
            unit.duration()
        );

        self.next_start_time += unit.duration();
        self.units_scheduled += 1;

        Ok(id)
    }

    /// Force-stop every unit still playing or queued
    pub fn stop_all(&mut self) {
        let ids: Vec<UnitId> = self.lock_in_flight().drain().collect();
        if !ids.is_empty() {
            debug!("Stopping {} in-flight playback units", ids.len());
        }
        for id in ids {
            self.sink.stop(id);
        }
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn in_flight(&self) -> usize {
        self.lock_in_flight().len()
    }

    pub fn is_in_flight(&self, id: UnitId) -> bool {
        self.lock_in_flight().contains(&id)
    }

    pub fn units_scheduled(&self) -> usize {
        self.units_scheduled
    }

    pub fn units_dropped(&self) -> usize {
        self.units_dropped
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<UnitId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn decode_payload(data: &str, channels: u16) -> CoachResult<Vec<Vec<f32>>> {
    let bytes = codec::decode_transport(data)?;
    if bytes.is_empty() {
        return Err(CoachError::Decode("empty audio payload".to_string()));
    }
    codec::decode_frame(&bytes, channels)
}

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

use super::playback::{AudioSink, PlaybackCompletion, PlaybackUnit, UnitId};

/// Output device simulated on the tokio clock
///
/// Time zero is the moment the sink was created. Each started unit gets a timer
/// that fires its completion at `start_at + duration`; stopping a unit cancels the
/// timer. Used headless and wherever no speaker is attached.
pub struct VirtualSink {
    origin: Instant,
    timers: Arc<Mutex<HashMap<UnitId, AbortHandle>>>,
    completed: Arc<AtomicUsize>,
}

impl VirtualSink {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            timers: Arc::new(Mutex::new(HashMap::new())),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Units currently waiting for their end time
    pub fn pending(&self) -> usize {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Units that played to completion
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl Default for VirtualSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for VirtualSink {
    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn start(&self, unit: &PlaybackUnit, on_ended: PlaybackCompletion) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("VirtualSink requires a tokio runtime")?;

        let id = unit.id;
        let deadline = self.origin + Duration::from_secs_f64(unit.end_at().max(0.0));
        let timers = Arc::clone(&self.timers);
        let completed = Arc::clone(&self.completed);

        // Hold the lock across spawn so an already-due timer cannot remove its
        // entry before it is inserted
        let mut guard = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            timers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            completed.fetch_add(1, Ordering::SeqCst);
            debug!("Playback of {} finished", id);
            on_ended.complete();
        });
        guard.insert(id, task.abort_handle());

        Ok(())
    }

    fn stop(&self, id: UnitId) {
        let timer = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(timer) = timer {
            timer.abort();
        }
    }
}

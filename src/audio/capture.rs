// Capture pipeline: device frames -> 16kHz mono blocks -> encoded chunks
//
// Runs as one tokio task per session. Submission to the outbound path is
// synchronous and never waits on the network; a chunk that cannot be queued is
// dropped and capture carries on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioFrame};
use super::codec;
use super::resample::{downmix_to_mono, BlockFramer, LinearResampler};
use crate::error::CoachResult;

/// One captured block as it goes on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Base64 text of 16-bit LE PCM
    pub data: String,
    /// Media type including the sample rate, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

/// Outbound path for encoded chunks
///
/// Must return immediately. An error means the chunk was not accepted.
pub trait ChunkSink: Send + Sync {
    fn submit(&self, chunk: EncodedChunk) -> CoachResult<()>;
}

/// Capture pipeline settings
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Samples per outbound block (after resampling)
    pub block_size: usize,
    /// Outbound sample rate
    pub target_sample_rate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            target_sample_rate: 16000,
        }
    }
}

impl CaptureConfig {
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.target_sample_rate)
    }
}

/// Counters shared between the capture task and the controller
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub chunks_sent: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
}

/// Stateful frame processor: downmix, resample, block, encode
pub struct CapturePipeline {
    config: CaptureConfig,
    mime_type: String,
    resampler: Option<LinearResampler>,
    framer: BlockFramer,
}

impl CapturePipeline {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            mime_type: config.mime_type(),
            framer: BlockFramer::new(config.block_size),
            resampler: None,
            config,
        }
    }

    /// Turn one device frame into zero or more encoded chunks
    ///
    /// Frames with a zero sample rate or channel count carry no usable audio and
    /// are dropped.
    pub fn process(&mut self, frame: &AudioFrame) -> Vec<EncodedChunk> {
        if frame.sample_rate == 0 || frame.channels == 0 {
            warn!(
                "Dropping capture frame with invalid format ({}Hz, {} channels)",
                frame.sample_rate, frame.channels
            );
            return Vec::new();
        }

        let mono = downmix_to_mono(frame);

        // Rebuild the resampler if the device rate changes mid-stream
        if self.resampler.as_ref().map(|r| r.from_rate()) != Some(frame.sample_rate) {
            self.resampler = Some(LinearResampler::new(
                frame.sample_rate,
                self.config.target_sample_rate,
            ));
        }
        let resampled = match self.resampler.as_mut() {
            Some(resampler) => resampler.process(&mono),
            None => mono,
        };

        self.framer
            .push(&resampled)
            .into_iter()
            .map(|block| EncodedChunk {
                data: codec::encode_transport(&codec::encode_frame(&block)),
                mime_type: self.mime_type.clone(),
            })
            .collect()
    }

    /// Drive the pipeline until the frame stream ends or shutdown is signalled
    pub fn spawn(
        mut self,
        mut backend: Box<dyn AudioBackend>,
        mut frames: mpsc::Receiver<AudioFrame>,
        sink: Arc<dyn ChunkSink>,
        stats: Arc<CaptureStats>,
    ) -> CaptureHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            info!("Capture pipeline started ({})", backend.name());

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    frame = frames.recv() => {
                        let Some(frame) = frame else { break };
                        for chunk in self.process(&frame) {
                            match sink.submit(chunk) {
                                Ok(()) => {
                                    stats.chunks_sent.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(e) => {
                                    stats.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                                    debug!("Dropped capture chunk: {}", e);
                                }
                            }
                        }
                    }
                }
            }

            if let Err(e) = backend.stop().await {
                error!("Failed to stop audio backend: {}", e);
            }

            info!("Capture pipeline stopped");
        });

        CaptureHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Running capture task
pub struct CaptureHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CaptureHandle {
    /// Unwire capture and release the device
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!("Capture task panicked: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// Host audio devices through cpal: microphone capture and speaker playback
//
// cpal streams are not Send on every platform, so each stream is built, played and
// dropped on a thread of its own. The thread parks on a channel until its owner
// lets go of the sender.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::backend::{AudioBackend, AudioFrame};
use super::playback::{AudioSink, PlaybackCompletion, PlaybackUnit, UnitId};
use super::timeline::OutputTimeline;

/// Device frames buffered ahead of the capture pipeline
const FRAME_QUEUE: usize = 64;

/// Owns the thread a cpal stream lives on
struct StreamThread {
    stop: Option<std_mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl StreamThread {
    /// Build and start a stream on a new thread, returning once it plays
    fn spawn<T, F>(name: &str, build: F) -> Result<(Self, T)>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<(cpal::Stream, T)> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<T>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build().and_then(|(stream, info)| {
                    stream.play().context("Failed to start audio stream")?;
                    Ok((stream, info))
                }) {
                    Ok((stream, info)) => {
                        let _ = ready_tx.send(Ok(info));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Returns once the sender is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .context("Failed to spawn audio thread")?;

        let info = ready_rx
            .recv()
            .context("Audio thread exited during setup")??;

        Ok((
            Self {
                stop: Some(stop_tx),
                thread: Some(thread),
            },
            info,
        ))
    }

    fn shutdown(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio thread panicked");
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Default system microphone
pub struct MicrophoneBackend {
    stream: Option<StreamThread>,
}

impl MicrophoneBackend {
    pub fn new() -> Self {
        Self { stream: None }
    }
}

impl Default for MicrophoneBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.stream.is_some() {
            anyhow::bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(FRAME_QUEUE);

        let (stream, (device, sample_rate, channels)) = tokio::task::spawn_blocking(move || {
            StreamThread::spawn("maestro-microphone", move || open_input(tx))
        })
        .await
        .context("Microphone setup task failed")??;

        info!(
            "Microphone capture started: {} ({}Hz, {} channels)",
            device, sample_rate, channels
        );

        self.stream = Some(stream);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown();
            info!("Microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

fn open_input(tx: mpsc::Sender<AudioFrame>) -> Result<(cpal::Stream, (String, u32, u16))> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("No input device available")?;
    let name = device.name().unwrap_or_else(|_| "unknown input".to_string());

    let supported = device
        .default_input_config()
        .context("Failed to query input format")?;
    let config = supported.config();
    let info = (name, config.sample_rate.0, config.channels);

    let stream = match supported.sample_format() {
        SampleFormat::F32 => input_stream::<f32>(&device, &config, tx)?,
        SampleFormat::I16 => input_stream::<i16>(&device, &config, tx)?,
        SampleFormat::U16 => input_stream::<u16>(&device, &config, tx)?,
        other => anyhow::bail!("Unsupported input sample format {:?}", other),
    };

    Ok((stream, info))
}

fn input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    let started = Instant::now();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let frame = AudioFrame {
                    samples: data
                        .iter()
                        .map(|&s| <f32 as FromSample<T>>::from_sample_(s))
                        .collect(),
                    sample_rate,
                    channels,
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                // The device thread never waits on the pipeline
                if tx.try_send(frame).is_err() {
                    debug!("Capture queue full; dropped device frame");
                }
            },
            |err| error!("Microphone stream error: {}", err),
            None,
        )
        .context("Failed to open microphone stream")
}

/// Default system speaker, driven by an [`OutputTimeline`]
pub struct SpeakerSink {
    timeline: Arc<Mutex<OutputTimeline>>,
    _stream: StreamThread,
}

impl SpeakerSink {
    pub fn open() -> Result<Self> {
        let (stream, (timeline, device)) = StreamThread::spawn("maestro-speaker", open_output)?;

        info!(
            "Speaker output started: {} ({}Hz)",
            device,
            lock(&timeline).sample_rate()
        );

        Ok(Self {
            timeline,
            _stream: stream,
        })
    }
}

impl AudioSink for SpeakerSink {
    fn current_time(&self) -> f64 {
        lock(&self.timeline).current_time()
    }

    fn start(&self, unit: &PlaybackUnit, on_ended: PlaybackCompletion) -> Result<()> {
        lock(&self.timeline).add(unit, on_ended);
        Ok(())
    }

    fn stop(&self, id: UnitId) {
        lock(&self.timeline).remove(id);
    }
}

type SharedTimeline = Arc<Mutex<OutputTimeline>>;

fn lock(timeline: &SharedTimeline) -> std::sync::MutexGuard<'_, OutputTimeline> {
    timeline.lock().unwrap_or_else(PoisonError::into_inner)
}

fn open_output() -> Result<(cpal::Stream, (SharedTimeline, String))> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("No output device available")?;
    let name = device.name().unwrap_or_else(|_| "unknown output".to_string());

    let supported = device
        .default_output_config()
        .context("Failed to query output format")?;
    let config = supported.config();
    let timeline = Arc::new(Mutex::new(OutputTimeline::new(config.sample_rate.0)));

    let stream = match supported.sample_format() {
        SampleFormat::F32 => output_stream::<f32>(&device, &config, Arc::clone(&timeline))?,
        SampleFormat::I16 => output_stream::<i16>(&device, &config, Arc::clone(&timeline))?,
        SampleFormat::U16 => output_stream::<u16>(&device, &config, Arc::clone(&timeline))?,
        other => anyhow::bail!("Unsupported output sample format {:?}", other),
    };

    Ok((stream, (timeline, name)))
}

fn output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    timeline: SharedTimeline,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let mut mono = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                mono.resize(data.len() / channels, 0.0);
                let finished = lock(&timeline).render(&mut mono);

                for (frame, &sample) in data.chunks_mut(channels).zip(&mono) {
                    frame.fill(<T as FromSample<f32>>::from_sample_(sample));
                }

                for completion in finished {
                    completion.complete();
                }
            },
            |err| error!("Speaker stream error: {}", err),
            None,
        )
        .context("Failed to open speaker stream")
}

use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::codec::PCM_SCALE;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            anyhow::bail!(
                "Unsupported WAV format: {} bit {:?} (expected 16 bit PCM)",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into normalized float frames of `block_size` samples per channel
    pub fn frames(&self, block_size: usize) -> Vec<AudioFrame> {
        let block_len = block_size.max(1) * self.channels.max(1) as usize;
        let mut timestamp_ms = 0u64;

        self.samples
            .chunks(block_len)
            .map(|block| {
                let frame = AudioFrame {
                    samples: block.iter().map(|&s| s as f32 / PCM_SCALE).collect(),
                    sample_rate: self.sample_rate,
                    channels: self.channels,
                    timestamp_ms,
                };
                timestamp_ms += (frame.duration_secs() * 1000.0) as u64;
                frame
            })
            .collect()
    }
}

/// Capture backend that plays a WAV file into the pipeline at real-time pace
pub struct FileBackend {
    file: Arc<AudioFile>,
    config: AudioBackendConfig,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: impl AsRef<Path>, config: AudioBackendConfig) -> Result<Self> {
        let file = AudioFile::open(path)?;

        if file.sample_rate != config.sample_rate || file.channels != config.channels {
            debug!(
                "File is {}Hz/{}ch, requested {}Hz/{}ch; pipeline will convert",
                file.sample_rate, file.channels, config.sample_rate, config.channels
            );
        }

        Ok(Self {
            file: Arc::new(file),
            config,
            task: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            anyhow::bail!("Already capturing");
        }

        let frames = self.file.frames(self.config.block_size);
        let (tx, rx) = mpsc::channel(32);

        info!(
            "Streaming {} ({} frames of {} samples)",
            self.file.path,
            frames.len(),
            self.config.block_size
        );

        let task = tokio::spawn(async move {
            for frame in frames {
                let pace = Duration::from_secs_f64(frame.duration_secs());
                if tx.send(frame).await.is_err() {
                    break;
                }
                tokio::time::sleep(pace).await;
            }
            debug!("File capture reached end of input");
        });

        self.task = Some(task);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("File capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

use anyhow::Result;
use tokio::sync::mpsc;

use super::file::FileBackend;
use crate::error::{CoachError, CoachResult};

/// Audio sample data (normalized f32, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples in [-1, 1], interleaved by channel
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Number of sample frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Native capture rate requested from the device (pipeline resamples if needed)
    pub sample_rate: u32,
    /// Channel count requested from the device
    pub channels: u16,
    /// Samples per channel delivered in each frame
    pub block_size: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // Live model input rate
            channels: 1,        // Mono
            block_size: 4096,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - File: stream a WAV recording at real-time pace (demos, soak tests)
/// - Microphone: the default system input via cpal (`audio-device` feature)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Grants access to a capture device for one session.
///
/// Acquisition is where permission is checked: a denied or missing device fails
/// with [`CoachError::Permission`] and no backend is handed out.
#[async_trait::async_trait]
pub trait MicrophoneProvider: Send + Sync {
    async fn acquire(&self) -> CoachResult<(Box<dyn AudioBackend>, mpsc::Receiver<AudioFrame>)>;
}

/// Audio backend factory
#[derive(Debug, Clone)]
pub struct AudioBackendFactory {
    source: AudioSource,
    config: AudioBackendConfig,
}

impl AudioBackendFactory {
    pub fn new(source: AudioSource, config: AudioBackendConfig) -> Self {
        Self { source, config }
    }

    /// Create audio backend based on configured source
    pub fn create(&self) -> Result<Box<dyn AudioBackend>> {
        match &self.source {
            #[cfg(feature = "audio-device")]
            AudioSource::Microphone => Ok(Box::new(super::device::MicrophoneBackend::new())),

            #[cfg(not(feature = "audio-device"))]
            AudioSource::Microphone => {
                anyhow::bail!("Built without microphone support (enable the `audio-device` feature)")
            }

            AudioSource::File(path) => {
                let backend = FileBackend::new(path, self.config.clone())?;
                Ok(Box::new(backend))
            }
        }
    }
}

#[async_trait::async_trait]
impl MicrophoneProvider for AudioBackendFactory {
    async fn acquire(&self) -> CoachResult<(Box<dyn AudioBackend>, mpsc::Receiver<AudioFrame>)> {
        let mut backend = self
            .create()
            .map_err(|e| CoachError::Permission(format!("{:#}", e)))?;

        let rx = backend
            .start()
            .await
            .map_err(|e| CoachError::Permission(format!("{}: {:#}", backend.name(), e)))?;

        Ok((backend, rx))
    }
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Default system microphone
    Microphone,
    /// File input, streamed at real-time pace
    File(String),
}

impl AudioSource {
    /// Parse the `audio.source` config value
    pub fn from_config(kind: &str, file_path: Option<&str>) -> Result<Self> {
        match kind {
            "microphone" => Ok(Self::Microphone),
            "file" => {
                let path = file_path
                    .ok_or_else(|| anyhow::anyhow!("audio.file_path is required for the file source"))?;
                Ok(Self::File(shellexpand::tilde(path).into_owned()))
            }
            other => anyhow::bail!("Unknown audio source '{}'", other),
        }
    }
}

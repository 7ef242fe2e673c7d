use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::{AudioBackendConfig, AudioSource};
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub nats: NatsConfig,
    pub audio: AudioConfig,
    pub live: LiveModelConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct NatsConfig {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// "microphone" or "file"
    pub source: String,
    /// WAV file streamed by the file source
    pub file_path: Option<String>,
    pub block_size: usize,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    /// "virtual" or "speaker"
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_output() -> String {
    "virtual".to_string()
}

/// Where model audio is played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOutput {
    /// Simulated device clock, no sound
    Virtual,
    /// Default system speaker (`audio-device` feature)
    Speaker,
}

#[derive(Debug, Deserialize)]
pub struct LiveModelConfig {
    pub model: String,
    pub system_instruction: String,
    pub handshake_timeout_ms: u64,
}

impl Config {
    /// Load `path` (any format the config crate knows), then `MAESTRO__*` env overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("MAESTRO").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            model: self.live.model.clone(),
            system_instruction: self.live.system_instruction.clone(),
            input_sample_rate: self.audio.capture_sample_rate,
            output_sample_rate: self.audio.playback_sample_rate,
            block_size: self.audio.block_size,
            ..SessionConfig::default()
        }
    }

    pub fn audio_source(&self) -> Result<AudioSource> {
        AudioSource::from_config(&self.audio.source, self.audio.file_path.as_deref())
    }

    pub fn audio_output(&self) -> Result<AudioOutput> {
        match self.audio.output.as_str() {
            "virtual" => Ok(AudioOutput::Virtual),
            "speaker" => Ok(AudioOutput::Speaker),
            other => anyhow::bail!("Unknown audio output: {}", other),
        }
    }

    pub fn backend(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            sample_rate: self.audio.capture_sample_rate,
            channels: 1,
            block_size: self.audio.block_size,
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.live.handshake_timeout_ms)
    }
}

use serde::{Deserialize, Serialize};

use crate::audio::CaptureConfig;
use crate::live::messages::{LiveConfig, LiveSetup, Modality, TranscriptionConfig};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

pub const MAESTRO_PERSONA: &str = "You are Maestro AI, a world-class music composition coach. \
Help the student with harmony, counterpoint, and orchestration in a friendly, encouraging voice.";

/// Fixed configuration for a coaching session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Remote model name
    pub model: String,

    /// Persona instruction sent with the handshake
    pub system_instruction: String,

    /// Outbound audio rate (the model expects 16kHz)
    pub input_sample_rate: u32,

    /// Inbound audio rate (the model speaks 24kHz)
    pub output_sample_rate: u32,

    /// Inbound audio channel count
    pub output_channels: u16,

    /// Samples per outbound chunk
    pub block_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_instruction: MAESTRO_PERSONA.to_string(),
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            output_channels: 1,
            block_size: 4096,
        }
    }
}

impl SessionConfig {
    /// Audio-only replies, transcription in both directions, the persona
    pub fn live_setup(&self) -> LiveSetup {
        LiveSetup {
            model: self.model.clone(),
            config: LiveConfig {
                response_modalities: vec![Modality::Audio],
                output_audio_transcription: Some(TranscriptionConfig::default()),
                input_audio_transcription: Some(TranscriptionConfig::default()),
                system_instruction: self.system_instruction.clone(),
            },
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            block_size: self.block_size,
            target_sample_rate: self.input_sample_rate,
        }
    }
}

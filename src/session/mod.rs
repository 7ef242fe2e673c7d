//! Coaching session management
//!
//! This module provides the `SessionController` that manages:
//! - Microphone acquisition and the capture pipeline
//! - The live channel to the remote model
//! - Gapless playback of the model's speech
//! - Transcript collection
//! - Session state and statistics

mod config;
mod controller;
mod state;
mod stats;
mod transcript;

pub use config::{SessionConfig, DEFAULT_MODEL, MAESTRO_PERSONA};
pub use controller::SessionController;
pub use state::SessionState;
pub use stats::SessionStats;
pub use transcript::{Speaker, TranscriptEntry, TranscriptLog};

pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSink,
    AudioSource, CaptureConfig, CapturePipeline, ChunkSink, EncodedChunk, MicrophoneProvider,
    PlaybackScheduler, PlaybackUnit, VirtualSink,
};
pub use config::{AudioOutput, Config};
pub use error::{CoachError, CoachResult};
pub use http::{create_router, AppState};
pub use live::{LiveTransport, NatsTransport, SessionChannel, SessionHandle};
pub use session::{SessionConfig, SessionController, SessionState, SessionStats, Speaker, TranscriptEntry};

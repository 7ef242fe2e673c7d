pub mod backend;
pub mod capture;
pub mod codec;
#[cfg(feature = "audio-device")]
pub mod device;
pub mod file;
pub mod playback;
pub mod resample;
pub mod sim;
pub mod timeline;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, MicrophoneProvider};
#[cfg(feature = "audio-device")]
pub use device::{MicrophoneBackend, SpeakerSink};
pub use capture::{CaptureConfig, CaptureHandle, CapturePipeline, CaptureStats, ChunkSink, EncodedChunk};
pub use file::{AudioFile, FileBackend};
pub use playback::{AudioSink, PlaybackCompletion, PlaybackScheduler, PlaybackUnit, UnitId};
pub use sim::VirtualSink;
pub use timeline::OutputTimeline;

//! Audio capture, playback, and PCM containers.

pub mod capture;
pub mod chunk;
pub mod playback;
pub mod wav;

pub use capture::{ChunkSource, ScriptedChunkSource};
pub use chunk::{AudioChunk, AudioClip, CapturedAudio, PreBuffer};
pub use playback::{AudioSink, MockAudioSink, Playback};

#[cfg(feature = "cpal-audio")]
pub use capture::{CpalChunkSource, list_input_devices};
#[cfg(feature = "cpal-audio")]
pub use playback::CpalAudioSink;

//! parlo: a hands-free voice conversation loop.
//!
//! Continuously captures microphone audio, gates recording on voice
//! activity, transcribes what was said, streams a chat reply, and plays
//! the synthesized answer sentence by sentence. The user can barge in at
//! any point; playback stops within a bounded latency and the
//! interrupting utterance seeds the next recording.

pub mod app;
pub mod asr;
pub mod audio;
pub mod chat;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod interrupt;
pub mod pipeline;
pub mod recorder;
pub mod tts;
pub mod vad;

pub use config::Config;
pub use error::{ParloError, Result};
pub use interrupt::{CancelToken, InterruptController, InterruptReason};

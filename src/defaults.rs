//! Default configuration constants for parlo.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per capture chunk.
///
/// Silero-style speech-probability oracles operate on 512-sample blocks
/// at 16kHz (32ms). The real-time capture callback emits chunks of
/// exactly this size.
pub const CHUNK_SAMPLES: usize = 512;

/// Default speech-probability threshold (0.0 to 1.0).
///
/// Chunks scoring above this are counted as speech. Lower values make
/// detection more sensitive at the cost of more false starts.
pub const VAD_THRESHOLD: f32 = 0.5;

/// Consecutive above-threshold chunks required to confirm speech start.
///
/// Hysteresis against single noisy frames: the gate stays in silence until
/// this many chunks in a row score above the threshold.
pub const CONSECUTIVE_CHUNKS: u32 = 3;

/// Pre-roll duration in milliseconds.
///
/// Recent chunks kept in a bounded ring while idle and flushed into the
/// recording at the silence-to-speech transition, so the first syllable
/// of an utterance is not clipped.
pub const PRE_ROLL_MS: u32 = 300;

/// Minimum confirmed speech duration in milliseconds.
///
/// Sessions with less confirmed speech than this report "no speech"
/// even when a speech transition occurred.
pub const MIN_SPEECH_MS: u32 = 400;

/// Trailing silence duration in milliseconds that ends a recording.
pub const SILENCE_MS: u32 = 800;

/// Maximum recording duration in seconds.
///
/// Reaching the equivalent number of chunks of total input forces the
/// session to end, regardless of whether the user is still speaking.
/// This is a timeout policy, not a failure.
pub const MAX_RECORDING_SECS: u32 = 30;

/// Continuation probe window in milliseconds.
///
/// After a segment ends, the recorder listens this long for the user to
/// resume speaking before committing the turn to transcription.
pub const CONTINUATION_PROBE_MS: u64 = 1500;

/// Polling interval for interrupt checks in milliseconds.
///
/// Every coordination loop checks the interrupt flag at least this often,
/// bounding cancellation latency.
pub const POLL_INTERVAL_MS: u64 = 50;

/// Deadline for synthesizing one sentence, in seconds.
///
/// A sentence that exceeds this is skipped; the rest of the reply
/// continues playing.
pub const SYNTHESIS_DEADLINE_SECS: u64 = 30;

/// Deadline for one transcription call, in seconds.
pub const TRANSCRIPTION_DEADLINE_SECS: u64 = 30;

/// Deadline for consuming a full chat stream, in seconds.
pub const CHAT_DEADLINE_SECS: u64 = 120;

/// Maximum conversation turns kept as chat history.
///
/// Each turn is one user message plus one assistant reply.
pub const MAX_HISTORY_TURNS: usize = 10;

/// Delay between turns in milliseconds.
///
/// Skipped entirely when the previous turn ended in a barge-in, so the
/// interrupting utterance is captured without a gap.
pub const INTER_TURN_DELAY_MS: u64 = 500;

/// Bound of the pipeline queue between synthesis and playback.
///
/// Keeps the producer from synthesizing arbitrarily far ahead of
/// playback; a barge-in then discards at most this many clips.
pub const PIPELINE_QUEUE_DEPTH: usize = 8;

/// Default language tag used when detection finds nothing conclusive.
pub const DEFAULT_LANGUAGE: &str = "en";

/// System prompt sent with every chat request.
///
/// Replies are played through speech synthesis, so the prompt steers the
/// model toward short plain-text answers.
pub const SYSTEM_PROMPT: &str = "You are a helpful voice assistant. \
Reply in short, conversational sentences suitable for being read aloud. \
Do not use markdown, lists, or code blocks.";

/// Default chat model name.
pub const CHAT_MODEL: &str = "llama3.2";

/// Default Ollama endpoint.
pub const OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434";

/// Default speech-synthesis endpoint.
pub const TTS_ENDPOINT: &str = "http://127.0.0.1:8880/v1/audio/speech";

/// Default transcription endpoint.
pub const ASR_ENDPOINT: &str = "http://127.0.0.1:8080/inference";

/// Converts a duration in milliseconds to a chunk count at the given rate.
pub fn ms_to_chunks(ms: u32, sample_rate: u32, chunk_samples: usize) -> u32 {
    let samples = ms as f64 * sample_rate as f64 / 1000.0;
    (samples / chunk_samples as f64).ceil() as u32
}

//! Hysteresis state machine turning per-chunk speech probabilities into a
//! start/stop recording decision.
//!
//! The gate is pure: it sees scores and chunks, never touches the oracle
//! or the audio device. The recording session drives it chunk by chunk.

use crate::audio::chunk::{AudioChunk, CapturedAudio, PreBuffer};
use crate::defaults;

/// Gate tuning, all counts in chunks.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Speech probability above which a chunk counts as speech.
    pub threshold: f32,
    /// Consecutive above-threshold chunks required to confirm speech.
    pub consecutive_chunks: u32,
    /// Pre-roll ring capacity.
    pub pre_roll_chunks: usize,
    /// Minimum confirmed speech chunks for the session to yield audio.
    pub min_speech_chunks: u32,
    /// Below-threshold run length that ends a speaking session.
    pub silence_chunks: u32,
    /// Hard cap on total processed chunks, speech or not.
    pub max_chunks: u32,
    pub sample_rate: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        let rate = defaults::SAMPLE_RATE;
        let chunk = defaults::CHUNK_SAMPLES;
        Self {
            threshold: defaults::VAD_THRESHOLD,
            consecutive_chunks: defaults::CONSECUTIVE_CHUNKS,
            pre_roll_chunks: defaults::ms_to_chunks(defaults::PRE_ROLL_MS, rate, chunk) as usize,
            min_speech_chunks: defaults::ms_to_chunks(defaults::MIN_SPEECH_MS, rate, chunk),
            silence_chunks: defaults::ms_to_chunks(defaults::SILENCE_MS, rate, chunk),
            max_chunks: defaults::ms_to_chunks(
                defaults::MAX_RECORDING_SECS * 1_000,
                rate,
                chunk,
            ),
            sample_rate: rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No confirmed speech yet; chunks accumulate in the pre-roll ring.
    Silence,
    /// Speech confirmed; chunks accumulate in the session.
    Speaking,
    /// Terminal. Further pushes are ignored.
    Done,
}

/// What a single push did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// Still in `Silence`.
    Waiting,
    /// This chunk confirmed the silence-to-speech transition.
    SpeechStarted,
    /// Recording continues in `Speaking`.
    Speaking,
    /// The session reached `Done` on or before this chunk.
    Finished,
}

pub struct VoiceActivityGate {
    config: GateConfig,
    state: GateState,
    pre_buffer: PreBuffer,
    frames: Vec<AudioChunk>,
    consecutive_speech: u32,
    silence_run: u32,
    speech_chunks: u32,
    total_chunks: u32,
}

impl VoiceActivityGate {
    pub fn new(config: GateConfig) -> Self {
        let pre_roll = config.pre_roll_chunks;
        Self {
            config,
            state: GateState::Silence,
            pre_buffer: PreBuffer::new(pre_roll),
            frames: Vec::new(),
            consecutive_speech: 0,
            silence_run: 0,
            speech_chunks: 0,
            total_chunks: 0,
        }
    }

    /// Starts directly in `Speaking`, seeded with the audio retained by a
    /// positive barge-in probe. The seed may carry pre-confirmation
    /// silence ahead of the confirming run, so only that run counts
    /// toward the confirmed-speech minimum.
    pub fn new_speaking(config: GateConfig, seed: Vec<AudioChunk>) -> Self {
        let mut gate = Self::new(config);
        gate.state = GateState::Speaking;
        gate.speech_chunks = gate.config.consecutive_chunks.min(seed.len() as u32);
        gate.total_chunks = seed.len() as u32;
        gate.consecutive_speech = gate.config.consecutive_chunks;
        gate.frames = seed;
        gate
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == GateState::Done
    }

    pub fn speech_chunks(&self) -> u32 {
        self.speech_chunks
    }

    /// Processes one chunk with its speech probability.
    pub fn push(&mut self, score: f32, chunk: AudioChunk) -> GateEvent {
        if self.state == GateState::Done {
            return GateEvent::Finished;
        }

        self.total_chunks += 1;
        let is_speech = score > self.config.threshold;

        let event = if is_speech {
            self.consecutive_speech += 1;
            match self.state {
                GateState::Silence => {
                    self.pre_buffer.push(chunk);
                    if self.consecutive_speech >= self.config.consecutive_chunks {
                        // Confirmed: the whole pre-roll, including the
                        // confirming run, moves into the session.
                        self.frames.extend(self.pre_buffer.drain());
                        self.speech_chunks += self.consecutive_speech;
                        self.state = GateState::Speaking;
                        GateEvent::SpeechStarted
                    } else {
                        GateEvent::Waiting
                    }
                }
                GateState::Speaking => {
                    // A single stray speech frame must not reset silence
                    // tracking; only a confirmed run does.
                    if self.consecutive_speech >= self.config.consecutive_chunks {
                        self.silence_run = 0;
                    }
                    self.frames.push(chunk);
                    self.speech_chunks += 1;
                    GateEvent::Speaking
                }
                GateState::Done => unreachable!(),
            }
        } else {
            self.consecutive_speech = 0;
            match self.state {
                GateState::Silence => {
                    self.pre_buffer.push(chunk);
                    GateEvent::Waiting
                }
                GateState::Speaking => {
                    self.frames.push(chunk);
                    self.silence_run += 1;
                    if self.silence_run >= self.config.silence_chunks
                        && self.speech_chunks >= self.config.min_speech_chunks
                    {
                        self.state = GateState::Done;
                        GateEvent::Finished
                    } else {
                        GateEvent::Speaking
                    }
                }
                GateState::Done => unreachable!(),
            }
        };

        // Hard cap counts every processed chunk, recorded or not.
        if self.state != GateState::Done && self.total_chunks >= self.config.max_chunks {
            self.state = GateState::Done;
            return GateEvent::Finished;
        }

        event
    }

    /// Forces the terminal state, keeping whatever was captured. Used on
    /// interrupt, device failure, and oracle failure.
    pub fn force_done(&mut self) {
        self.state = GateState::Done;
    }

    /// Consumes the gate and yields the session audio, or `None` when the
    /// session never accumulated enough confirmed speech.
    pub fn finish(self) -> Option<CapturedAudio> {
        if self.speech_chunks >= self.config.min_speech_chunks && !self.frames.is_empty() {
            Some(CapturedAudio::from_chunks(&self.frames, self.config.sample_rate))
        } else {
            None
        }
    }
}

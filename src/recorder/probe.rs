//! Barge-in probe: "has speech resumed?" under a short deadline.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::asr::{InferenceGate, SpeechActivityOracle};
use crate::audio::capture::ChunkSource;
use crate::audio::chunk::AudioChunk;
use crate::interrupt::InterruptController;
use crate::vad::{GateConfig, GateEvent, VoiceActivityGate};

/// Result of a probe window.
#[derive(Debug)]
pub struct ProbeOutcome {
    pub detected: bool,
    /// Every chunk observed up to and including the confirming one, in
    /// order. Seeds the next recording session so the utterance that
    /// triggered the probe is not lost. Empty on a negative probe.
    pub retained: Vec<AudioChunk>,
}

impl ProbeOutcome {
    fn negative() -> Self {
        Self {
            detected: false,
            retained: Vec::new(),
        }
    }
}

/// Watches for a silence-to-speech transition within `window`. Uses the
/// same hysteresis rule as a recording session but stops at the edge;
/// no state survives the call beyond the oracle reset performed at entry.
///
/// The probe never fails: a device or oracle error mid-window is logged
/// and reported as a negative outcome, so a turn with segments already
/// recorded is committed to transcription instead of being thrown away.
pub fn probe_speech_start(
    source: &mut dyn ChunkSource,
    oracle: &mut dyn SpeechActivityOracle,
    inference: &InferenceGate,
    interrupt: &InterruptController,
    config: GateConfig,
    window: Duration,
) -> ProbeOutcome {
    if interrupt.is_interrupted() {
        return ProbeOutcome::negative();
    }

    oracle.reset();
    let poll = Duration::from_millis(crate::defaults::POLL_INTERVAL_MS).min(window);
    let mut gate = VoiceActivityGate::new(config);
    let mut observed: Vec<AudioChunk> = Vec::new();
    let deadline = Instant::now() + window;

    if let Err(e) = source.start() {
        warn!(error = %e, "probe could not start capture");
        return ProbeOutcome::negative();
    }
    while Instant::now() < deadline {
        if interrupt.is_interrupted() {
            break;
        }
        let chunk = match source.next_chunk(poll) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                if source.is_finite() {
                    break;
                }
                continue;
            }
            Err(e) => {
                warn!(error = %e, "capture failed during probe");
                break;
            }
        };

        let score = {
            let _guard = inference.acquire();
            oracle.score(&chunk)
        };
        let score = match score {
            Ok(score) => score,
            Err(e) => {
                warn!(error = %e, "oracle failed during probe");
                break;
            }
        };
        observed.push(chunk.clone());
        if gate.push(score, chunk) == GateEvent::SpeechStarted {
            stop_quietly(source);
            return ProbeOutcome {
                detected: true,
                retained: observed,
            };
        }
    }

    stop_quietly(source);
    ProbeOutcome::negative()
}

fn stop_quietly(source: &mut dyn ChunkSource) {
    if let Err(e) = source.stop() {
        warn!(error = %e, "failed to stop capture after probe");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::MockOracle;
    use crate::audio::capture::ScriptedChunkSource;
    use crate::interrupt::InterruptReason;

    const CHUNK: usize = 4;

    fn config() -> GateConfig {
        GateConfig {
            threshold: 0.5,
            consecutive_chunks: 3,
            pre_roll_chunks: 10,
            min_speech_chunks: 3,
            silence_chunks: 5,
            max_chunks: 1000,
            sample_rate: 16_000,
        }
    }

    fn chunks(count: usize) -> Vec<AudioChunk> {
        (0..count).map(|i| vec![i as f32; CHUNK]).collect()
    }

    fn window() -> Duration {
        Duration::from_millis(500)
    }

    #[test]
    fn test_probe_detects_sustained_speech() {
        let mut source = ScriptedChunkSource::new(chunks(10));
        let mut oracle = MockOracle::new(vec![0.1, 0.1, 0.9, 0.9, 0.9]);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        let outcome = probe_speech_start(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            window(),
        );
        assert!(outcome.detected);
        // Two silence chunks plus the three confirming ones.
        assert_eq!(outcome.retained.len(), 5);
        assert_eq!(outcome.retained[0][0], 0.0);
        assert_eq!(outcome.retained[4][0], 4.0);
    }

    #[test]
    fn test_probe_negative_on_silence() {
        let mut source = ScriptedChunkSource::new(chunks(10));
        let mut oracle = MockOracle::new(vec![0.1; 10]);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        let outcome = probe_speech_start(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            window(),
        );
        assert!(!outcome.detected);
        assert!(outcome.retained.is_empty());
    }

    #[test]
    fn test_probe_ignores_unsustained_speech() {
        let mut source = ScriptedChunkSource::new(chunks(8));
        let mut oracle = MockOracle::new(vec![0.9, 0.1, 0.9, 0.1, 0.9, 0.1, 0.9, 0.1]);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        let outcome = probe_speech_start(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            window(),
        );
        assert!(!outcome.detected);
    }

    #[test]
    fn test_probe_resets_oracle() {
        let mut source = ScriptedChunkSource::new(chunks(1));
        let mut oracle = MockOracle::new(vec![0.1]);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        probe_speech_start(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            window(),
        );
        assert_eq!(oracle.reset_count(), 1);
    }

    #[test]
    fn test_probe_interrupted_is_negative() {
        let mut source = ScriptedChunkSource::new(chunks(10));
        let mut oracle = MockOracle::new(vec![0.9; 10]);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();
        interrupt.trigger(InterruptReason::Shutdown);

        let outcome = probe_speech_start(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            window(),
        );
        assert!(!outcome.detected);
        assert_eq!(source.remaining(), 10);
    }

    #[test]
    fn test_probe_oracle_failure_is_negative() {
        let mut source = ScriptedChunkSource::new(chunks(10));
        let mut oracle = MockOracle::new(vec![0.9; 10]).with_failure_on_call(0);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        let outcome = probe_speech_start(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            window(),
        );
        assert!(!outcome.detected);
        assert!(outcome.retained.is_empty());
    }
}

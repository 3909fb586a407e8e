//! One voice-activity-gated recording session.
//!
//! Runs on a blocking worker thread: pulls chunks from the source, scores
//! each under the inference gate, and feeds the gate until it terminates.

use std::time::Duration;

use tracing::warn;

use crate::asr::{InferenceGate, SpeechActivityOracle};
use crate::audio::capture::ChunkSource;
use crate::audio::chunk::{AudioChunk, CapturedAudio};
use crate::defaults;
use crate::interrupt::InterruptController;
use crate::vad::{GateConfig, VoiceActivityGate};
use crate::error::Result;

/// Records one session. Returns `Ok(None)` when no usable speech was
/// captured, including the case where the interrupt flag was already set
/// before the session began.
///
/// `seed` switches the gate into continuation mode: the chunks retained
/// by a positive barge-in probe enter the session already recorded, with
/// the confirming run counted as speech.
pub fn run_session(
    source: &mut dyn ChunkSource,
    oracle: &mut dyn SpeechActivityOracle,
    inference: &InferenceGate,
    interrupt: &InterruptController,
    config: GateConfig,
    seed: Option<Vec<AudioChunk>>,
) -> Result<Option<CapturedAudio>> {
    if interrupt.is_interrupted() {
        return Ok(None);
    }

    oracle.reset();
    let mut gate = match seed {
        Some(chunks) => VoiceActivityGate::new_speaking(config, chunks),
        None => VoiceActivityGate::new(config),
    };

    source.start()?;
    let poll = Duration::from_millis(defaults::POLL_INTERVAL_MS);

    while !gate.is_done() {
        if interrupt.is_interrupted() {
            gate.force_done();
            break;
        }

        let chunk = match source.next_chunk(poll) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                if source.is_finite() {
                    gate.force_done();
                    break;
                }
                continue;
            }
            Err(e) => {
                // Device failure truncates the session; whatever was
                // captured so far still counts.
                warn!(error = %e, "capture failed mid-session, truncating");
                gate.force_done();
                break;
            }
        };

        let score = {
            let _guard = inference.acquire();
            oracle.score(&chunk)
        };
        match score {
            Ok(score) => {
                gate.push(score, chunk);
            }
            Err(e) => {
                warn!(error = %e, "oracle failed, ending session");
                gate.force_done();
                break;
            }
        }
    }

    // A completed session beats a clean shutdown of the device.
    if let Err(e) = source.stop() {
        warn!(error = %e, "failed to stop capture after session");
    }
    Ok(gate.finish())
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

    #[test]
    fn test_session_captures_confirmed_speech() {
        let mut source = ScriptedChunkSource::new(chunks(10));
        let mut scores = vec![0.9, 0.9, 0.9, 0.9, 0.9];
        scores.extend([0.1; 5]);
        let mut oracle = MockOracle::new(scores);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        let audio = run_session(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(audio.samples.len(), 10 * CHUNK);
    }

    #[test]
    fn test_session_all_silence_yields_none() {
        let mut source = ScriptedChunkSource::new(chunks(20));
        let mut oracle = MockOracle::new(vec![0.1; 20]);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        let audio = run_session(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            None,
        )
        .unwrap();
        assert!(audio.is_none());
    }

    #[test]
    fn test_session_resets_oracle_first() {
        let mut source = ScriptedChunkSource::new(chunks(1));
        let mut oracle = MockOracle::new(vec![0.1]);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        run_session(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            None,
        )
        .unwrap();
        assert_eq!(oracle.reset_count(), 1);
    }

    #[test]
    fn test_interrupt_before_session_returns_immediately() {
        let mut source = ScriptedChunkSource::new(chunks(20));
        let mut oracle = MockOracle::new(vec![0.9; 20]);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();
        interrupt.trigger(InterruptReason::UserStop);

        let audio = run_session(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            None,
        )
        .unwrap();
        assert!(audio.is_none());
        // Nothing was consumed from the source.
        assert_eq!(source.remaining(), 20);
    }

    #[test]
    fn test_oracle_failure_preserves_captured_audio() {
        let mut source = ScriptedChunkSource::new(chunks(10));
        // 4 speech chunks, then the oracle dies.
        let mut oracle = MockOracle::new(vec![0.9; 10]).with_failure_on_call(4);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        let audio = run_session(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(audio.samples.len(), 4 * CHUNK);
    }

    #[test]
    fn test_oracle_failure_below_minimum_yields_none() {
        let mut source = ScriptedChunkSource::new(chunks(10));
        let mut oracle = MockOracle::new(vec![0.9; 10]).with_failure_on_call(1);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        let audio = run_session(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            None,
        )
        .unwrap();
        assert!(audio.is_none());
    }

    #[test]
    fn test_exhausted_finite_source_truncates() {
        let mut source = ScriptedChunkSource::new(chunks(4));
        let mut oracle = MockOracle::new(vec![0.9; 4]);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        let audio = run_session(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(audio.samples.len(), 4 * CHUNK);
    }

    #[test]
    fn test_stop_failure_keeps_completed_session() {
        struct StopFailsSource(ScriptedChunkSource);

        impl ChunkSource for StopFailsSource {
            fn start(&mut self) -> Result<()> {
                self.0.start()
            }
            fn stop(&mut self) -> Result<()> {
                Err(crate::error::ParloError::Device {
                    message: "stop failed".to_string(),
                })
            }
            fn next_chunk(&mut self, timeout: Duration) -> Result<Option<AudioChunk>> {
                self.0.next_chunk(timeout)
            }
            fn is_finite(&self) -> bool {
                true
            }
        }

        let mut source = StopFailsSource(ScriptedChunkSource::new(chunks(10)));
        let mut scores = vec![0.9; 5];
        scores.extend([0.1; 5]);
        let mut oracle = MockOracle::new(scores);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        let audio = run_session(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(audio.samples.len(), 10 * CHUNK);
    }

    #[test]
    fn test_seeded_session_enters_continuation_mode() {
        let mut source = ScriptedChunkSource::new(chunks(5));
        let mut oracle = MockOracle::new(vec![0.1; 5]);
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();

        let audio = run_session(
            &mut source,
            &mut oracle,
            &inference,
            &interrupt,
            config(),
            Some(chunks(4)),
        )
        .unwrap()
        .unwrap();
        // 4 seeded + 5 trailing silence.
        assert_eq!(audio.samples.len(), 9 * CHUNK);
    }
}

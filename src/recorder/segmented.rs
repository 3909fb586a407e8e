//! Multi-segment recording with speculative transcription.
//!
//! After each recorded segment the user gets a short window to keep
//! talking. Transcription of everything so far starts immediately as a
//! cancellable task; if the user does continue, that speculative work is
//! cancelled, awaited, and discarded, and recording resumes. The text
//! returned to the caller is always the transcription of the full
//! concatenated audio.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::asr::{InferenceGate, SpeechActivityOracle, Transcript, TranscriptionService};
use crate::audio::capture::ChunkSource;
use crate::audio::chunk::{AudioChunk, CapturedAudio};
use crate::error::{ParloError, Result};
use crate::interrupt::{CancelToken, InterruptController};
use crate::recorder::probe::probe_speech_start;
use crate::recorder::session::run_session;
use crate::vad::GateConfig;

/// Microphone-side collaborators shared between sessions, probes, and
/// the barge-in watcher. Locked for the duration of each blocking pass.
pub struct RecorderIo {
    pub source: Box<dyn ChunkSource>,
    pub oracle: Box<dyn SpeechActivityOracle>,
}

/// What one logical turn of recording produced.
#[derive(Debug, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// Nothing usable was captured.
    NoSpeech,
    /// Transcription of all segments concatenated.
    Transcribed(Transcript),
}

pub struct SegmentedRecorder {
    io: Arc<Mutex<RecorderIo>>,
    transcriber: Arc<dyn TranscriptionService>,
    inference: InferenceGate,
    interrupt: InterruptController,
    gate_config: GateConfig,
    probe_window: Duration,
}

impl SegmentedRecorder {
    pub fn new(
        io: Arc<Mutex<RecorderIo>>,
        transcriber: Arc<dyn TranscriptionService>,
        inference: InferenceGate,
        interrupt: InterruptController,
        gate_config: GateConfig,
        probe_window: Duration,
    ) -> Self {
        Self {
            io,
            transcriber,
            inference,
            interrupt,
            gate_config,
            probe_window,
        }
    }

    /// Records one logical turn. `seed` carries the audio retained by a
    /// barge-in probe, entering the first session in continuation mode.
    pub async fn record_turn(
        &self,
        mut seed: Option<Vec<AudioChunk>>,
    ) -> Result<RecordingOutcome> {
        let mut segments: Vec<CapturedAudio> = Vec::new();

        loop {
            let session_seed = seed.take();
            let segment = self.run_session_blocking(session_seed).await?;

            match segment {
                Some(audio) => segments.push(audio),
                None => {
                    if segments.is_empty() {
                        return Ok(RecordingOutcome::NoSpeech);
                    }
                    // A continuation probe fired but the follow-up session
                    // produced nothing; transcribe what we already have.
                    let transcript = self
                        .transcribe_blocking(concat(&segments), CancelToken::new())
                        .await??;
                    return Ok(RecordingOutcome::Transcribed(transcript));
                }
            }

            // Speculative transcription of everything so far, concurrent
            // with the continuation probe.
            let cancel = CancelToken::new();
            let speculative = self
                .spawn_transcription(concat(&segments), cancel.clone());

            let probe = self.run_probe_blocking().await?;

            if probe.detected {
                debug!(segments = segments.len(), "continuation detected, discarding speculative transcription");
                cancel.cancel();
                // Await cancellation before discarding; the result, even
                // a successful one, never surfaces.
                let _ = speculative.await;
                seed = Some(probe.retained);
                continue;
            }

            let transcript = speculative
                .await
                .map_err(|e| ParloError::Other(format!("transcription task failed: {}", e)))??;
            return Ok(RecordingOutcome::Transcribed(transcript));
        }
    }

    async fn run_session_blocking(
        &self,
        seed: Option<Vec<AudioChunk>>,
    ) -> Result<Option<CapturedAudio>> {
        let io = Arc::clone(&self.io);
        let inference = self.inference.clone();
        let interrupt = self.interrupt.clone();
        let config = self.gate_config.clone();
        tokio::task::spawn_blocking(move || {
            let mut io = io.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let RecorderIo { source, oracle } = &mut *io;
            run_session(
                source.as_mut(),
                oracle.as_mut(),
                &inference,
                &interrupt,
                config,
                seed,
            )
        })
        .await
        .map_err(|e| ParloError::Other(format!("recording task failed: {}", e)))?
    }

    /// Probe failures do not surface here: the probe itself degrades to a
    /// negative outcome, so recorded segments are never discarded over a
    /// transient inference or device error.
    async fn run_probe_blocking(&self) -> Result<crate::recorder::probe::ProbeOutcome> {
        let io = Arc::clone(&self.io);
        let inference = self.inference.clone();
        let interrupt = self.interrupt.clone();
        let config = self.gate_config.clone();
        let window = self.probe_window;
        tokio::task::spawn_blocking(move || {
            let mut io = io.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let RecorderIo { source, oracle } = &mut *io;
            probe_speech_start(
                source.as_mut(),
                oracle.as_mut(),
                &inference,
                &interrupt,
                config,
                window,
            )
        })
        .await
        .map_err(|e| ParloError::Other(format!("probe task failed: {}", e)))
    }

    fn spawn_transcription(
        &self,
        audio: CapturedAudio,
        cancel: CancelToken,
    ) -> tokio::task::JoinHandle<Result<Transcript>> {
        let transcriber = Arc::clone(&self.transcriber);
        let inference = self.inference.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = inference.acquire();
            if cancel.is_cancelled() {
                return Err(ParloError::Other("transcription cancelled".to_string()));
            }
            transcriber.transcribe(&audio.samples, audio.sample_rate, &cancel)
        })
    }

    async fn transcribe_blocking(
        &self,
        audio: CapturedAudio,
        cancel: CancelToken,
    ) -> Result<Result<Transcript>> {
        self.spawn_transcription(audio, cancel)
            .await
            .map_err(|e| ParloError::Other(format!("transcription task failed: {}", e)))
    }
}

fn concat(segments: &[CapturedAudio]) -> CapturedAudio {
    let sample_rate = segments.first().map(|s| s.sample_rate).unwrap_or(0);
    let mut samples = Vec::with_capacity(segments.iter().map(|s| s.samples.len()).sum());
    for segment in segments {
        samples.extend_from_slice(&segment.samples);
    }
    CapturedAudio {
        samples,
        sample_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{MockOracle, MockTranscriptionService};
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

    fn recorder(
        source_chunks: Vec<AudioChunk>,
        scores: Vec<f32>,
        transcriber: MockTranscriptionService,
    ) -> (SegmentedRecorder, Arc<MockTranscriptionService>) {
        let io = Arc::new(Mutex::new(RecorderIo {
            source: Box::new(ScriptedChunkSource::new(source_chunks)),
            oracle: Box::new(MockOracle::new(scores)),
        }));
        let transcriber = Arc::new(transcriber);
        let recorder = SegmentedRecorder::new(
            io,
            Arc::clone(&transcriber) as Arc<dyn TranscriptionService>,
            InferenceGate::new(),
            InterruptController::new(),
            config(),
            Duration::from_millis(200),
        );
        (recorder, transcriber)
    }

    #[tokio::test]
    async fn test_no_speech_turn() {
        let (recorder, transcriber) = recorder(
            chunks(20),
            vec![0.1; 20],
            MockTranscriptionService::new(),
        );
        let outcome = recorder.record_turn(None).await.unwrap();
        assert_eq!(outcome, RecordingOutcome::NoSpeech);
        assert!(transcriber.call_sample_counts().is_empty());
    }

    #[tokio::test]
    async fn test_single_segment_turn_transcribes_once() {
        // Session: 5 speech + 5 silence = done with 10 chunks.
        // Probe: remaining source is exhausted, no continuation.
        let mut scores = vec![0.9; 5];
        scores.extend([0.1; 5]);
        let (recorder, transcriber) = recorder(
            chunks(10),
            scores,
            MockTranscriptionService::new().with_result("hello world"),
        );
        let outcome = recorder.record_turn(None).await.unwrap();
        match outcome {
            RecordingOutcome::Transcribed(t) => assert_eq!(t.text, "hello world"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(transcriber.call_sample_counts(), vec![10 * CHUNK]);
    }

    #[tokio::test]
    async fn test_continuation_transcribes_full_concatenation() {
        // First session: 5 speech + 5 silence (10 chunks).
        // Probe: 3 speech chunks -> continuation, 3 chunks retained.
        // Second session (seeded): 5 speech + 5 silence (10 chunks).
        // Final probe: silence until the source is exhausted.
        let mut scores = vec![0.9; 5];
        scores.extend([0.1; 5]); // session 1
        scores.extend([0.9; 3]); // probe 1 -> detected
        scores.extend([0.9; 5]);
        scores.extend([0.1; 5]); // session 2
        scores.extend([0.1; 10]); // probe 2 -> negative

        // No scripted results: the mock echoes sample counts, which keeps
        // the assertion independent of whether the cancelled speculative
        // call got far enough to consume a result.
        let (recorder, transcriber) = recorder(
            chunks(10 + 3 + 10 + 10),
            scores,
            MockTranscriptionService::new(),
        );

        let outcome = recorder.record_turn(None).await.unwrap();
        // Everything concatenated: 10 chunks from session one, the 3
        // retained probe chunks, 10 from session two.
        let full = (10 + 3 + 10) * CHUNK;
        match outcome {
            RecordingOutcome::Transcribed(t) => {
                assert_eq!(t.text, format!("({} samples)", full));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let calls = transcriber.call_sample_counts();
        assert_eq!(*calls.last().unwrap(), full);
        assert!(calls.len() <= 2);
    }

    #[tokio::test]
    async fn test_cancelled_speculative_result_never_surfaces() {
        // Same shape as above, but the speculative transcription would
        // have succeeded with a recognizable marker.
        let mut scores = vec![0.9; 5];
        scores.extend([0.1; 5]);
        scores.extend([0.9; 3]);
        scores.extend([0.9; 5]);
        scores.extend([0.1; 5]);
        scores.extend([0.1; 10]);

        let (recorder, _transcriber) = recorder(
            chunks(33),
            scores,
            MockTranscriptionService::new(),
        );

        let outcome = recorder.record_turn(None).await.unwrap();
        // The speculative result covered only the first segment (10
        // chunks); whatever happened to it, the caller only ever sees
        // the full 23-chunk transcription.
        match outcome {
            RecordingOutcome::Transcribed(t) => {
                assert_ne!(t.text, format!("({} samples)", 10 * CHUNK));
                assert_eq!(t.text, format!("({} samples)", 23 * CHUNK));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oracle_failure_during_probe_keeps_recorded_segments() {
        // Session: 5 speech + 5 silence. The oracle's 11th score call is
        // the probe's first and fails; the turn must still be transcribed.
        let mut scores = vec![0.9; 5];
        scores.extend([0.1; 5]);
        let io = Arc::new(Mutex::new(RecorderIo {
            source: Box::new(ScriptedChunkSource::new(chunks(20))),
            oracle: Box::new(MockOracle::new(scores).with_failure_on_call(10)),
        }));
        let transcriber = Arc::new(MockTranscriptionService::new().with_result("kept"));
        let recorder = SegmentedRecorder::new(
            io,
            Arc::clone(&transcriber) as Arc<dyn TranscriptionService>,
            InferenceGate::new(),
            InterruptController::new(),
            config(),
            Duration::from_millis(200),
        );

        let outcome = recorder.record_turn(None).await.unwrap();
        match outcome {
            RecordingOutcome::Transcribed(t) => assert_eq!(t.text, "kept"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(transcriber.call_sample_counts(), vec![10 * CHUNK]);
    }

    #[tokio::test]
    async fn test_interrupted_before_turn_is_no_speech() {
        let io = Arc::new(Mutex::new(RecorderIo {
            source: Box::new(ScriptedChunkSource::new(chunks(10))),
            oracle: Box::new(MockOracle::new(vec![0.9; 10])),
        }));
        let interrupt = InterruptController::new();
        interrupt.trigger(InterruptReason::UserStop);
        let recorder = SegmentedRecorder::new(
            io,
            Arc::new(MockTranscriptionService::new()),
            InferenceGate::new(),
            interrupt,
            config(),
            Duration::from_millis(100),
        );
        let outcome = recorder.record_turn(None).await.unwrap();
        assert_eq!(outcome, RecordingOutcome::NoSpeech);
    }

    #[tokio::test]
    async fn test_seeded_turn_records_in_continuation_mode() {
        // Seeded with 4 speech chunks; immediate silence still yields a
        // valid segment containing the seed.
        let (recorder, transcriber) = recorder(
            chunks(15),
            vec![0.1; 15],
            MockTranscriptionService::new().with_result("seeded"),
        );
        let outcome = recorder.record_turn(Some(chunks(4))).await.unwrap();
        match outcome {
            RecordingOutcome::Transcribed(t) => assert_eq!(t.text, "seeded"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        // 4 seed chunks + 5 silence chunks recorded before Done.
        assert_eq!(transcriber.call_sample_counts(), vec![9 * CHUNK]);
    }
}

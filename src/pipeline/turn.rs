//! One conversation turn: record, transcribe, chat, speak.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::asr::InferenceGate;
use crate::audio::chunk::AudioChunk;
use crate::chat::{ChatCompletionService, ConversationHistory};
use crate::defaults;
use crate::error::Result;
use crate::interrupt::{CancelToken, InterruptController};
use crate::pipeline::stream::{PipelineOutcome, StreamingResponsePipeline};
use crate::recorder::probe::probe_speech_start;
use crate::recorder::{RecorderIo, RecordingOutcome, SegmentedRecorder};
use crate::vad::GateConfig;

/// Voice commands that wipe the conversation history.
const CLEAR_HISTORY_PHRASES: &[&str] = &["clear history", "start over", "reset conversation"];

/// Spoken acknowledgement after a history wipe.
const CLEAR_CONFIRMATION: &str = "Okay, starting fresh.";

/// Probe window used while watching for barge-in during playback.
const WATCH_WINDOW_MS: u64 = 300;

/// What a completed turn amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    /// Nothing usable was said.
    NoSpeech,
    /// A full exchange happened. `barge_in` tells the caller to skip the
    /// inter-turn delay and start recording immediately.
    Completed { barge_in: bool },
    /// The user asked to wipe the history.
    HistoryCleared,
}

pub struct TurnEngine {
    recorder: SegmentedRecorder,
    io: Arc<Mutex<RecorderIo>>,
    chat: Box<dyn ChatCompletionService>,
    pipeline: StreamingResponsePipeline,
    history: ConversationHistory,
    interrupt: InterruptController,
    inference: InferenceGate,
    gate_config: GateConfig,
    /// Audio retained by the barge-in watcher, seeding the next turn.
    pending_seed: Option<Vec<AudioChunk>>,
}

impl TurnEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        recorder: SegmentedRecorder,
        io: Arc<Mutex<RecorderIo>>,
        chat: Box<dyn ChatCompletionService>,
        pipeline: StreamingResponsePipeline,
        max_history: usize,
        interrupt: InterruptController,
        inference: InferenceGate,
        gate_config: GateConfig,
    ) -> Self {
        Self {
            recorder,
            io,
            chat,
            pipeline,
            history: ConversationHistory::new(max_history),
            interrupt,
            inference,
            gate_config,
            pending_seed: None,
        }
    }

    /// Whether the previous turn ended in a barge-in, leaving retained
    /// audio to seed the next one.
    pub fn has_pending_barge_in(&self) -> bool {
        self.pending_seed.is_some()
    }

    /// Runs one complete turn. The interrupt flag is cleared here, once,
    /// and nowhere else.
    pub async fn run_turn(&mut self) -> Result<TurnEvent> {
        self.interrupt.clear();

        let seed = self.pending_seed.take();
        let transcript = match self.recorder.record_turn(seed).await? {
            RecordingOutcome::NoSpeech => return Ok(TurnEvent::NoSpeech),
            RecordingOutcome::Transcribed(transcript) => transcript,
        };
        let text = transcript.text.trim().to_string();
        if text.is_empty() {
            return Ok(TurnEvent::NoSpeech);
        }
        info!(user = %text, language = %transcript.language, "transcribed");

        if is_clear_command(&text) {
            self.history.clear();
            self.speak(CLEAR_CONFIRMATION).await?;
            return Ok(TurnEvent::HistoryCleared);
        }

        let increments = self.chat.chat_stream(&text, self.history.turns()).await?;

        let stop = CancelToken::new();
        let done = Arc::new(AtomicBool::new(false));
        let retained = Arc::new(Mutex::new(None));
        let watcher = self.spawn_barge_in_watcher(
            stop.clone(),
            Arc::clone(&done),
            Arc::clone(&retained),
        );

        let report = self.pipeline.run(increments, &self.interrupt, &stop).await;

        done.store(true, Ordering::SeqCst);
        let _ = watcher.await;

        let report = report?;
        if !report.reply.is_empty() {
            self.history.push(&text, &report.reply);
        }

        let barge_in = report.outcome == PipelineOutcome::Interrupted;
        if barge_in {
            self.pending_seed = retained
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            debug!(
                seeded = self.pending_seed.is_some(),
                "turn interrupted by barge-in"
            );
        }
        Ok(TurnEvent::Completed { barge_in })
    }

    /// Synthesizes and plays a single canned sentence.
    async fn speak(&self, text: &str) -> Result<()> {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(Ok(text.to_string()));
        drop(tx);
        let stop = CancelToken::new();
        self.pipeline.run(rx, &self.interrupt, &stop).await?;
        Ok(())
    }

    /// Listens for the user speaking over playback. A positive probe
    /// trips the pipeline-local stop token and stashes the retained
    /// audio for the next turn.
    fn spawn_barge_in_watcher(
        &self,
        stop: CancelToken,
        done: Arc<AtomicBool>,
        retained: Arc<Mutex<Option<Vec<AudioChunk>>>>,
    ) -> tokio::task::JoinHandle<()> {
        let io = Arc::clone(&self.io);
        let inference = self.inference.clone();
        let interrupt = self.interrupt.clone();
        let config = self.gate_config.clone();
        let window = Duration::from_millis(WATCH_WINDOW_MS);

        tokio::task::spawn_blocking(move || {
            while !done.load(Ordering::SeqCst) && !interrupt.is_interrupted() {
                let outcome = {
                    let mut io = io.lock().unwrap_or_else(PoisonError::into_inner);
                    let RecorderIo { source, oracle } = &mut *io;
                    probe_speech_start(
                        source.as_mut(),
                        oracle.as_mut(),
                        &inference,
                        &interrupt,
                        config.clone(),
                        window,
                    )
                };
                if outcome.detected {
                    info!("barge-in detected during playback");
                    *retained.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(outcome.retained);
                    stop.cancel();
                    return;
                }
                std::thread::sleep(Duration::from_millis(defaults::POLL_INTERVAL_MS));
            }
        })
    }
}

fn is_clear_command(text: &str) -> bool {
    let lowered = text.to_lowercase();
    CLEAR_HISTORY_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{MockOracle, MockTranscriptionService, TranscriptionService};
    use crate::audio::capture::ScriptedChunkSource;
    use crate::audio::playback::{AudioSink, MockAudioSink};
    use crate::chat::MockChatService;
    use crate::tts::{MockSynthesizer, SpeechSynthesisService};

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
        (0..count).map(|i| vec![i as f32; 4]).collect()
    }

    struct Fixture {
        engine: TurnEngine,
        played: Arc<Mutex<Vec<crate::audio::chunk::AudioClip>>>,
    }

    fn fixture(
        source_chunks: Vec<AudioChunk>,
        scores: Vec<f32>,
        transcriber: MockTranscriptionService,
        chat: MockChatService,
        sink: MockAudioSink,
    ) -> Fixture {
        let io = Arc::new(Mutex::new(RecorderIo {
            source: Box::new(ScriptedChunkSource::new(source_chunks)),
            oracle: Box::new(MockOracle::new(scores)),
        }));
        let inference = InferenceGate::new();
        let interrupt = InterruptController::new();
        let recorder = SegmentedRecorder::new(
            Arc::clone(&io),
            Arc::new(transcriber) as Arc<dyn TranscriptionService>,
            inference.clone(),
            interrupt.clone(),
            config(),
            Duration::from_millis(100),
        );
        let played = sink.played();
        let sink: Arc<Mutex<Box<dyn AudioSink>>> = Arc::new(Mutex::new(Box::new(sink)));
        let pipeline = StreamingResponsePipeline::new(
            Arc::new(MockSynthesizer::new()) as Arc<dyn SpeechSynthesisService>,
            sink,
            Duration::from_secs(5),
            4,
        );
        let engine = TurnEngine::new(
            recorder,
            io,
            Box::new(chat),
            pipeline,
            4,
            interrupt,
            inference,
            config(),
        );
        Fixture { engine, played }
    }

    fn speech_then_silence() -> (Vec<AudioChunk>, Vec<f32>) {
        let mut scores = vec![0.9; 5];
        scores.extend([0.1; 5]); // session ends
        scores.extend([0.1; 30]); // probe and watcher stay silent
        (chunks(40), scores)
    }

    #[tokio::test]
    async fn test_full_turn_records_chats_and_plays() {
        let (source_chunks, scores) = speech_then_silence();
        let mut fx = fixture(
            source_chunks,
            scores,
            MockTranscriptionService::new().with_result("what time is it"),
            MockChatService::new().with_reply(&["It is noon.", "Exactly."]),
            MockAudioSink::new(),
        );

        let event = fx.engine.run_turn().await.unwrap();
        assert_eq!(event, TurnEvent::Completed { barge_in: false });
        assert_eq!(fx.played.lock().unwrap().len(), 2);
        assert_eq!(fx.engine.history.len(), 1);
        assert_eq!(fx.engine.history.turns()[0].user, "what time is it");
        assert_eq!(
            fx.engine.history.turns()[0].assistant,
            "It is noon. Exactly."
        );
    }

    #[tokio::test]
    async fn test_silent_turn_is_no_speech() {
        let mut fx = fixture(
            chunks(20),
            vec![0.1; 20],
            MockTranscriptionService::new(),
            MockChatService::new(),
            MockAudioSink::new(),
        );
        let event = fx.engine.run_turn().await.unwrap();
        assert_eq!(event, TurnEvent::NoSpeech);
        assert!(fx.engine.history.is_empty());
    }

    #[tokio::test]
    async fn test_empty_transcription_is_no_speech() {
        let (source_chunks, scores) = speech_then_silence();
        let mut fx = fixture(
            source_chunks,
            scores,
            MockTranscriptionService::new().with_result("   "),
            MockChatService::new(),
            MockAudioSink::new(),
        );
        let event = fx.engine.run_turn().await.unwrap();
        assert_eq!(event, TurnEvent::NoSpeech);
    }

    #[tokio::test]
    async fn test_clear_history_command() {
        let (source_chunks, scores) = speech_then_silence();
        let mut fx = fixture(
            source_chunks,
            scores,
            MockTranscriptionService::new().with_result("please clear history now"),
            MockChatService::new(),
            MockAudioSink::new(),
        );
        fx.engine.history.push("old", "turn");

        let event = fx.engine.run_turn().await.unwrap();
        assert_eq!(event, TurnEvent::HistoryCleared);
        assert!(fx.engine.history.is_empty());
        // The confirmation sentence was spoken.
        assert_eq!(fx.played.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_preempted_playback_reports_barge_in() {
        let (source_chunks, scores) = speech_then_silence();
        let mut fx = fixture(
            source_chunks,
            scores,
            MockTranscriptionService::new().with_result("tell me a story"),
            MockChatService::new().with_reply(&["Once.", "Upon.", "A time."]),
            MockAudioSink::new().with_preempt_on(0),
        );

        let event = fx.engine.run_turn().await.unwrap();
        assert_eq!(event, TurnEvent::Completed { barge_in: true });
        assert!(fx.played.lock().unwrap().is_empty());
        // Reply text is still recorded even though playback was cut off.
        assert_eq!(fx.engine.history.len(), 1);
    }

    #[test]
    fn test_clear_command_matching() {
        assert!(is_clear_command("Clear history"));
        assert!(is_clear_command("let's start over."));
        assert!(is_clear_command("Reset conversation please"));
        assert!(!is_clear_command("tell me some history"));
        assert!(!is_clear_command("start the song over"));
    }
}

//! Producer/consumer pipeline from chat-stream text to played audio.
//!
//! The producer synthesizes each sentence increment and enqueues it; the
//! consumer plays clips strictly in production order. A bounded queue
//! keeps synthesis from running arbitrarily far ahead of playback. On
//! interrupt the consumer keeps draining to the end sentinel, dropping
//! clips unplayed, so the producer is never left blocked on a full queue.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use crate::audio::chunk::AudioClip;
use crate::audio::playback::{AudioSink, Playback};
use crate::chat::IncrementReceiver;
use crate::error::{ParloError, Result};
use crate::interrupt::{CancelToken, InterruptController};
use crate::tts::{SpeechSynthesisService, detect_language};

/// A synthesized sentence waiting for playback. Dropping it releases the
/// clip; ownership moves through the queue exactly once.
#[derive(Debug)]
pub struct SpokenSentence {
    pub text: String,
    pub clip: AudioClip,
}

/// Queue protocol: sentences in order, then exactly one `End`.
#[derive(Debug)]
pub enum QueueItem {
    Speech(SpokenSentence),
    End,
}

/// How the pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every produced sentence played to the end.
    Completed,
    /// A barge-in or external interrupt cut the run short. The caller
    /// should resume recording without the usual inter-turn delay.
    Interrupted,
}

#[derive(Debug)]
pub struct PipelineReport {
    pub outcome: PipelineOutcome,
    /// All sentence text received from the chat stream, joined. Stored
    /// as the assistant side of the history turn.
    pub reply: String,
}

pub struct StreamingResponsePipeline {
    synthesizer: Arc<dyn SpeechSynthesisService>,
    sink: Arc<Mutex<Box<dyn AudioSink>>>,
    synthesis_deadline: Duration,
    queue_depth: usize,
}

impl StreamingResponsePipeline {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesisService>,
        sink: Arc<Mutex<Box<dyn AudioSink>>>,
        synthesis_deadline: Duration,
        queue_depth: usize,
    ) -> Self {
        Self {
            synthesizer,
            sink,
            synthesis_deadline,
            queue_depth: queue_depth.max(1),
        }
    }

    /// Plays a chat stream to completion or interruption. `stop` is the
    /// pipeline-local cancel token; the global interrupt is bridged into
    /// it so playback preemption watches a single signal.
    pub async fn run(
        &self,
        mut increments: IncrementReceiver,
        interrupt: &InterruptController,
        stop: &CancelToken,
    ) -> Result<PipelineReport> {
        let (queue_tx, queue_rx) = mpsc::channel::<QueueItem>(self.queue_depth);

        let bridge = {
            let interrupt = interrupt.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                interrupt.notified().await;
                stop.cancel();
            })
        };

        let consumer = {
            let sink = Arc::clone(&self.sink);
            let stop = stop.clone();
            tokio::task::spawn_blocking(move || consume(queue_rx, sink, stop))
        };

        let mut reply = String::new();
        let mut stream_error: Option<ParloError> = None;

        while let Some(increment) = increments.recv().await {
            // Interrupt check before beginning work on the next increment.
            if stop.is_cancelled() || interrupt.is_interrupted() {
                break;
            }

            let text = match increment {
                Ok(text) => text,
                Err(e) => {
                    stream_error = Some(e);
                    break;
                }
            };
            if text.trim().is_empty() {
                continue;
            }
            if !reply.is_empty() {
                reply.push(' ');
            }
            reply.push_str(&text);

            let language = detect_language(&text);
            let clip = match tokio::time::timeout(
                self.synthesis_deadline,
                self.synthesizer.synthesize(&text, language),
            )
            .await
            {
                Ok(Ok(clip)) => clip,
                Ok(Err(e)) => {
                    warn!(error = %e, sentence = %text, "synthesis failed, skipping sentence");
                    continue;
                }
                Err(_) => {
                    warn!(sentence = %text, "synthesis deadline expired, skipping sentence");
                    continue;
                }
            };

            let item = QueueItem::Speech(SpokenSentence { text, clip });
            if queue_tx.send(item).await.is_err() {
                break;
            }
        }

        // Always terminate the queue, even on error or interrupt.
        let _ = queue_tx.send(QueueItem::End).await;
        drop(queue_tx);

        let consumer_interrupted = consumer
            .await
            .map_err(|e| ParloError::Other(format!("playback task failed: {}", e)))??;
        bridge.abort();

        if let Some(e) = stream_error {
            return Err(e);
        }

        let outcome = if consumer_interrupted || stop.is_cancelled() || interrupt.is_interrupted()
        {
            PipelineOutcome::Interrupted
        } else {
            PipelineOutcome::Completed
        };
        Ok(PipelineReport { outcome, reply })
    }
}

/// Drains the queue to the sentinel. Returns whether playback was
/// interrupted. Items arriving after the stop token fires are dropped
/// without playing; dropping releases their clips, and moving each item
/// out of the channel makes that release happen exactly once.
fn consume(
    mut queue: mpsc::Receiver<QueueItem>,
    sink: Arc<Mutex<Box<dyn AudioSink>>>,
    stop: CancelToken,
) -> Result<bool> {
    let mut interrupted = false;

    while let Some(item) = queue.blocking_recv() {
        let sentence = match item {
            QueueItem::End => break,
            QueueItem::Speech(sentence) => sentence,
        };

        if stop.is_cancelled() {
            interrupted = true;
            continue;
        }

        let result = {
            let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
            sink.play(&sentence.clip, &stop)
        };
        match result {
            Ok(Playback::Finished) => {}
            Ok(Playback::Stopped) => {
                interrupted = true;
            }
            Err(e) => {
                warn!(error = %e, sentence = %sentence.text, "playback failed, skipping sentence");
            }
        }
    }
    Ok(interrupted)
}

//! Microphone capture delivering fixed-size sample chunks.
//!
//! The capture callback runs in a real-time context and must never block:
//! it slices incoming samples into fixed chunks and pushes them into a
//! bounded channel, dropping chunks if the consumer falls behind.

use std::collections::VecDeque;
use std::time::Duration;

use crate::audio::chunk::AudioChunk;
use crate::error::Result;

/// Source of fixed-size audio chunks in arrival order.
pub trait ChunkSource: Send {
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Waits up to `timeout` for the next chunk. `Ok(None)` means no chunk
    /// arrived within the timeout, or the source is exhausted.
    fn next_chunk(&mut self, timeout: Duration) -> Result<Option<AudioChunk>>;

    /// True for sources that run out of data (test fixtures); the live
    /// microphone never does.
    fn is_finite(&self) -> bool {
        false
    }
}

/// Scripted chunk source for tests: replays a fixed chunk sequence, then
/// reports exhaustion.
pub struct ScriptedChunkSource {
    chunks: VecDeque<AudioChunk>,
    started: bool,
}

impl ScriptedChunkSource {
    pub fn new(chunks: Vec<AudioChunk>) -> Self {
        Self {
            chunks: chunks.into(),
            started: false,
        }
    }

    /// Builds `count` chunks of `chunk_samples` samples at a constant
    /// amplitude. Handy for VAD scenarios where only chunk count matters.
    pub fn constant_chunks(count: usize, chunk_samples: usize, amplitude: f32) -> Vec<AudioChunk> {
        (0..count).map(|_| vec![amplitude; chunk_samples]).collect()
    }

    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

impl ChunkSource for ScriptedChunkSource {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn next_chunk(&mut self, _timeout: Duration) -> Result<Option<AudioChunk>> {
        Ok(self.chunks.pop_front())
    }

    fn is_finite(&self) -> bool {
        true
    }
}

#[cfg(feature = "cpal-audio")]
pub use cpal_source::{CpalChunkSource, list_input_devices};

#[cfg(feature = "cpal-audio")]
mod cpal_source {
    use super::*;
    use crate::error::ParloError;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

    /// Chunks buffered between the capture callback and the consumer.
    const CHANNEL_DEPTH: usize = 64;

    /// Lists the names of available input devices.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().map_err(|e| ParloError::Device {
            message: format!("Failed to enumerate input devices: {}", e),
        })?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    /// cpal::Stream is !Send; access is confined to start/stop on the
    /// owning thread, never shared.
    struct SendableStream(cpal::Stream);

    // SAFETY: the stream is only ever touched while holding &mut self.
    unsafe impl Send for SendableStream {}

    /// Live microphone capture via cpal, producing mono f32 chunks at the
    /// configured rate. The data callback only slices and try-sends.
    pub struct CpalChunkSource {
        device: cpal::Device,
        stream: Option<SendableStream>,
        rx: Receiver<AudioChunk>,
        tx: Sender<AudioChunk>,
        sample_rate: u32,
        chunk_samples: usize,
    }

    impl CpalChunkSource {
        pub fn new(
            device_name: Option<&str>,
            sample_rate: u32,
            chunk_samples: usize,
        ) -> Result<Self> {
            let host = cpal::default_host();
            let device = match device_name {
                Some(name) => host
                    .input_devices()
                    .map_err(|e| ParloError::Device {
                        message: format!("Failed to enumerate input devices: {}", e),
                    })?
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| ParloError::Device {
                        message: format!("Input device not found: {}", name),
                    })?,
                None => host.default_input_device().ok_or_else(|| ParloError::Device {
                    message: "No default input device".to_string(),
                })?,
            };

            let (tx, rx) = bounded(CHANNEL_DEPTH);
            Ok(Self {
                device,
                stream: None,
                rx,
                tx,
                sample_rate,
                chunk_samples,
            })
        }
    }

    impl ChunkSource for CpalChunkSource {
        fn start(&mut self) -> Result<()> {
            if self.stream.is_some() {
                return Ok(());
            }

            let config = cpal::StreamConfig {
                channels: 1,
                sample_rate: cpal::SampleRate(self.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let tx = self.tx.clone();
            let chunk_samples = self.chunk_samples;
            let mut pending: Vec<f32> = Vec::with_capacity(chunk_samples * 2);

            let stream = self
                .device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        pending.extend_from_slice(data);
                        while pending.len() >= chunk_samples {
                            let chunk: AudioChunk = pending.drain(..chunk_samples).collect();
                            // Drop the chunk if the consumer is behind;
                            // the callback must not block.
                            if let Err(TrySendError::Disconnected(_)) = tx.try_send(chunk) {
                                break;
                            }
                        }
                    },
                    |err| {
                        tracing::warn!(error = %err, "audio input stream error");
                    },
                    None,
                )
                .map_err(|e| ParloError::Device {
                    message: format!("Failed to build input stream: {}", e),
                })?;

            stream.play().map_err(|e| ParloError::Device {
                message: format!("Failed to start input stream: {}", e),
            })?;
            self.stream = Some(SendableStream(stream));
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            if let Some(stream) = self.stream.take() {
                stream.0.pause().map_err(|e| ParloError::Device {
                    message: format!("Failed to stop input stream: {}", e),
                })?;
            }
            // Discard anything captured while stopping.
            while self.rx.try_recv().is_ok() {}
            Ok(())
        }

        fn next_chunk(&mut self, timeout: Duration) -> Result<Option<AudioChunk>> {
            match self.rx.recv_timeout(timeout) {
                Ok(chunk) => Ok(Some(chunk)),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => Ok(None),
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(ParloError::Device {
                    message: "Capture channel disconnected".to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_source_replays_in_order() {
        let mut source =
            ScriptedChunkSource::new(vec![vec![0.1; 4], vec![0.2; 4], vec![0.3; 4]]);
        source.start().unwrap();
        let first = source.next_chunk(Duration::from_millis(1)).unwrap().unwrap();
        assert_eq!(first[0], 0.1);
        let second = source.next_chunk(Duration::from_millis(1)).unwrap().unwrap();
        assert_eq!(second[0], 0.2);
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn test_scripted_source_exhausts() {
        let mut source = ScriptedChunkSource::new(vec![vec![0.0; 4]]);
        source.start().unwrap();
        assert!(source.next_chunk(Duration::from_millis(1)).unwrap().is_some());
        assert!(source.next_chunk(Duration::from_millis(1)).unwrap().is_none());
        assert!(source.is_finite());
    }

    #[test]
    fn test_constant_chunks_builder() {
        let chunks = ScriptedChunkSource::constant_chunks(3, 8, 0.5);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 8);
        assert_eq!(chunks[2][7], 0.5);
    }
}

//! Audio playback with bounded-latency preemption.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::audio::chunk::AudioClip;
use crate::defaults;
use crate::error::Result;
use crate::interrupt::CancelToken;

/// How a playback call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    /// The clip played to its end.
    Finished,
    /// Playback was stopped early by the cancel token.
    Stopped,
}

/// Plays clips to completion or until the stop token fires. Implementations
/// must notice the token within [`defaults::POLL_INTERVAL_MS`].
pub trait AudioSink: Send {
    fn play(&mut self, clip: &AudioClip, stop: &CancelToken) -> Result<Playback>;
}

/// Test sink recording every play call, optionally cancelling the stop
/// token partway through the nth clip to simulate a barge-in.
pub struct MockAudioSink {
    played: Arc<Mutex<Vec<AudioClip>>>,
    preempt_on: Option<usize>,
    calls: usize,
}

impl MockAudioSink {
    pub fn new() -> Self {
        Self {
            played: Arc::new(Mutex::new(Vec::new())),
            preempt_on: None,
            calls: 0,
        }
    }

    /// When the zero-based `index`th clip is played, the sink cancels the
    /// stop token itself and reports `Stopped`.
    pub fn with_preempt_on(mut self, index: usize) -> Self {
        self.preempt_on = Some(index);
        self
    }

    /// Shared handle to the list of clips that actually played.
    pub fn played(&self) -> Arc<Mutex<Vec<AudioClip>>> {
        Arc::clone(&self.played)
    }
}

impl Default for MockAudioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for MockAudioSink {
    fn play(&mut self, clip: &AudioClip, stop: &CancelToken) -> Result<Playback> {
        let index = self.calls;
        self.calls += 1;

        if stop.is_cancelled() {
            return Ok(Playback::Stopped);
        }
        if self.preempt_on == Some(index) {
            stop.cancel();
            return Ok(Playback::Stopped);
        }

        if let Ok(mut played) = self.played.lock() {
            played.push(clip.clone());
        }
        Ok(Playback::Finished)
    }
}

#[cfg(feature = "cpal-audio")]
pub use cpal_sink::CpalAudioSink;

#[cfg(feature = "cpal-audio")]
mod cpal_sink {
    use super::*;
    use crate::error::ParloError;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Live playback via cpal. Each clip opens a short-lived output stream
    /// at the clip's sample rate; the control loop polls the stop token
    /// between short sleeps so preemption stays responsive.
    pub struct CpalAudioSink {
        device_name: Option<String>,
    }

    impl CpalAudioSink {
        pub fn new(device_name: Option<&str>) -> Self {
            Self {
                device_name: device_name.map(str::to_string),
            }
        }

        fn output_device(&self) -> Result<cpal::Device> {
            let host = cpal::default_host();
            match &self.device_name {
                Some(name) => host
                    .output_devices()
                    .map_err(|e| ParloError::Playback {
                        message: format!("Failed to enumerate output devices: {}", e),
                    })?
                    .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                    .ok_or_else(|| ParloError::Playback {
                        message: format!("Output device not found: {}", name),
                    }),
                None => host
                    .default_output_device()
                    .ok_or_else(|| ParloError::Playback {
                        message: "No default output device".to_string(),
                    }),
            }
        }
    }

    impl AudioSink for CpalAudioSink {
        fn play(&mut self, clip: &AudioClip, stop: &CancelToken) -> Result<Playback> {
            if clip.samples.is_empty() {
                return Ok(Playback::Finished);
            }

            let device = self.output_device()?;
            let config = cpal::StreamConfig {
                channels: 1,
                sample_rate: cpal::SampleRate(clip.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let samples = Arc::new(clip.samples.clone());
            let position = Arc::new(AtomicUsize::new(0));
            let total = samples.len();

            let cb_samples = Arc::clone(&samples);
            let cb_position = Arc::clone(&position);
            let stream = device
                .build_output_stream(
                    &config,
                    move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let start = cb_position.load(Ordering::Relaxed);
                        for (i, slot) in out.iter_mut().enumerate() {
                            *slot = cb_samples.get(start + i).copied().unwrap_or(0.0);
                        }
                        cb_position.store(start + out.len(), Ordering::Relaxed);
                    },
                    |err| {
                        tracing::warn!(error = %err, "audio output stream error");
                    },
                    None,
                )
                .map_err(|e| ParloError::Playback {
                    message: format!("Failed to build output stream: {}", e),
                })?;

            stream.play().map_err(|e| ParloError::Playback {
                message: format!("Failed to start playback: {}", e),
            })?;

            let poll = Duration::from_millis(defaults::POLL_INTERVAL_MS);
            loop {
                if stop.is_cancelled() {
                    drop(stream);
                    return Ok(Playback::Stopped);
                }
                if position.load(Ordering::Relaxed) >= total {
                    drop(stream);
                    return Ok(Playback::Finished);
                }
                std::thread::sleep(poll);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> AudioClip {
        AudioClip {
            samples: vec![0.0; 160],
            sample_rate: 16_000,
        }
    }

    #[test]
    fn test_mock_sink_records_played_clips() {
        let mut sink = MockAudioSink::new();
        let played = sink.played();
        let stop = CancelToken::new();
        assert_eq!(sink.play(&clip(), &stop).unwrap(), Playback::Finished);
        assert_eq!(played.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_mock_sink_respects_pre_cancelled_token() {
        let mut sink = MockAudioSink::new();
        let played = sink.played();
        let stop = CancelToken::new();
        stop.cancel();
        assert_eq!(sink.play(&clip(), &stop).unwrap(), Playback::Stopped);
        assert!(played.lock().unwrap().is_empty());
    }

    #[test]
    fn test_mock_sink_preempts_on_configured_index() {
        let mut sink = MockAudioSink::new().with_preempt_on(1);
        let played = sink.played();
        let stop = CancelToken::new();
        assert_eq!(sink.play(&clip(), &stop).unwrap(), Playback::Finished);
        assert_eq!(sink.play(&clip(), &stop).unwrap(), Playback::Stopped);
        assert!(stop.is_cancelled());
        assert_eq!(played.lock().unwrap().len(), 1);
    }
}

//! Speech-to-text service interface and HTTP implementation.

use std::time::Duration;

use serde::Deserialize;

use crate::audio::wav;
use crate::defaults;
use crate::error::{ParloError, Result, Stage};
use crate::interrupt::CancelToken;

/// A completed transcription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    /// BCP-47-ish language tag as reported by the backend.
    pub language: String,
}

/// Converts captured PCM into text. Calls run on blocking worker threads
/// under the inference gate; `cancel` is checked cooperatively inside the
/// call so a cancelled speculative transcription stops instead of running
/// to completion unobserved.
pub trait TranscriptionService: Send + Sync {
    fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
        cancel: &CancelToken,
    ) -> Result<Transcript>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

/// Posts WAV-encoded audio to a whisper.cpp-style inference server and
/// reads back `{"text": ..., "language": ...}`.
pub struct HttpTranscriptionService {
    client: reqwest::blocking::Client,
    endpoint: String,
    language_hint: String,
}

impl HttpTranscriptionService {
    pub fn new(endpoint: &str, language_hint: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(defaults::TRANSCRIPTION_DEADLINE_SECS))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            language_hint: language_hint.to_string(),
        })
    }
}

impl TranscriptionService for HttpTranscriptionService {
    fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
        cancel: &CancelToken,
    ) -> Result<Transcript> {
        if cancel.is_cancelled() {
            return Err(ParloError::Other("transcription cancelled".to_string()));
        }

        let wav_bytes = wav::encode_wav(samples, sample_rate)?;

        if cancel.is_cancelled() {
            return Err(ParloError::Other("transcription cancelled".to_string()));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("language", self.language_hint.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(wav_bytes)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ParloError::Timeout {
                        stage: Stage::Transcription,
                        secs: defaults::TRANSCRIPTION_DEADLINE_SECS,
                    }
                } else {
                    ParloError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(ParloError::Inference {
                message: format!("Transcription server returned {}", response.status()),
            });
        }

        // A cancellation that raced the request: drop the result here
        // rather than surfacing stale text.
        if cancel.is_cancelled() {
            return Err(ParloError::Other("transcription cancelled".to_string()));
        }

        let body: TranscriptionResponse = response.json()?;
        Ok(Transcript {
            text: body.text.trim().to_string(),
            language: body.language.unwrap_or_else(|| self.language_hint.clone()),
        })
    }
}

/// Scripted transcription service for tests. Records every call's sample
/// count so tests can assert what audio was actually transcribed.
pub struct MockTranscriptionService {
    results: std::sync::Mutex<std::collections::VecDeque<Result<Transcript>>>,
    calls: std::sync::Mutex<Vec<usize>>,
}

impl MockTranscriptionService {
    pub fn new() -> Self {
        Self {
            results: std::sync::Mutex::new(std::collections::VecDeque::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_result(self, text: &str) -> Self {
        self.results.lock().unwrap().push_back(Ok(Transcript {
            text: text.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
        }));
        self
    }

    pub fn with_error(self, message: &str) -> Self {
        self.results
            .lock()
            .unwrap()
            .push_back(Err(ParloError::Inference {
                message: message.to_string(),
            }));
        self
    }

    /// Sample counts of every completed call, in call order.
    pub fn call_sample_counts(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockTranscriptionService {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptionService for MockTranscriptionService {
    fn transcribe(
        &self,
        samples: &[f32],
        _sample_rate: u32,
        cancel: &CancelToken,
    ) -> Result<Transcript> {
        if cancel.is_cancelled() {
            return Err(ParloError::Other("transcription cancelled".to_string()));
        }
        self.calls.lock().unwrap().push(samples.len());
        match self.results.lock().unwrap().pop_front() {
            Some(result) => result,
            // With no scripted result the mock echoes the sample count,
            // so callers can assert exactly what audio was transcribed.
            None => Ok(Transcript {
                text: format!("({} samples)", samples.len()),
                language: defaults::DEFAULT_LANGUAGE.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_returns_scripted_results_in_order() {
        let service = MockTranscriptionService::new()
            .with_result("hello")
            .with_result("world");
        let cancel = CancelToken::new();
        let first = service.transcribe(&[0.0; 10], 16_000, &cancel).unwrap();
        assert_eq!(first.text, "hello");
        let second = service.transcribe(&[0.0; 20], 16_000, &cancel).unwrap();
        assert_eq!(second.text, "world");
        assert_eq!(service.call_sample_counts(), vec![10, 20]);
    }

    #[test]
    fn test_mock_honors_cancellation() {
        let service = MockTranscriptionService::new().with_result("unused");
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(service.transcribe(&[0.0; 10], 16_000, &cancel).is_err());
        // A cancelled call never counts as an invocation.
        assert!(service.call_sample_counts().is_empty());
    }

    #[test]
    fn test_mock_scripted_error() {
        let service = MockTranscriptionService::new().with_error("model exploded");
        let cancel = CancelToken::new();
        let result = service.transcribe(&[0.0; 10], 16_000, &cancel);
        assert!(matches!(result, Err(ParloError::Inference { .. })));
    }

    #[test]
    fn test_mock_exhausted_echoes_sample_count() {
        let service = MockTranscriptionService::new();
        let cancel = CancelToken::new();
        let transcript = service.transcribe(&[0.0; 10], 16_000, &cancel).unwrap();
        assert_eq!(transcript.text, "(10 samples)");
    }
}

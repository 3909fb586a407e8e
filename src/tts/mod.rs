//! Speech synthesis.

pub mod http;

pub use http::HttpSynthesisService;

use async_trait::async_trait;

use crate::audio::chunk::AudioClip;
use crate::defaults;
use crate::error::{ParloError, Result};

#[async_trait]
pub trait SpeechSynthesisService: Send + Sync {
    /// Renders `text` as a playable clip. `language` is a hint for voice
    /// selection, as produced by [`detect_language`].
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioClip>;
}

/// Guesses a language tag from the script of the text, for picking a
/// synthesis voice. Kana beats ideographs (Japanese text mixes both),
/// hangul means Korean, bare ideographs default to Chinese, anything
/// else falls back to the configured default.
pub fn detect_language(text: &str) -> &'static str {
    let mut has_ideographs = false;
    for c in text.chars() {
        let code = c as u32;
        // Hiragana or katakana
        if (0x3040..=0x30FF).contains(&code) {
            return "ja";
        }
        // Hangul syllables and jamo
        if (0xAC00..=0xD7AF).contains(&code) || (0x1100..=0x11FF).contains(&code) {
            return "ko";
        }
        // CJK unified ideographs
        if (0x4E00..=0x9FFF).contains(&code) {
            has_ideographs = true;
        }
    }
    if has_ideographs {
        "zh"
    } else {
        defaults::DEFAULT_LANGUAGE
    }
}

/// Scripted synthesizer for tests. Produces clips whose sample count
/// equals the text length, so tests can match clips back to sentences.
pub struct MockSynthesizer {
    fail_on: std::sync::Mutex<std::collections::HashSet<String>>,
    calls: std::sync::Mutex<Vec<String>>,
    delay: Option<std::time::Duration>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            fail_on: std::sync::Mutex::new(std::collections::HashSet::new()),
            calls: std::sync::Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Makes synthesis of exactly `text` fail.
    pub fn with_failure_for(self, text: &str) -> Self {
        self.fail_on.lock().unwrap().insert(text.to_string());
        self
    }

    /// Adds a fixed delay to every call, for deadline tests.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynthesisService for MockSynthesizer {
    async fn synthesize(&self, text: &str, _language: &str) -> Result<AudioClip> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.lock().unwrap().contains(text) {
            return Err(ParloError::Synthesis {
                message: format!("scripted failure for {:?}", text),
            });
        }
        self.calls.lock().unwrap().push(text.to_string());
        Ok(AudioClip {
            samples: vec![0.0; text.chars().count().max(1)],
            sample_rate: defaults::SAMPLE_RATE,
        })
    }
}

//! HTTP synthesis backend speaking the OpenAI-style `/v1/audio/speech`
//! protocol (Kokoro, OpenedAI-Speech, and compatible servers).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::audio::chunk::AudioClip;
use crate::audio::wav;
use crate::config::TtsConfig;
use crate::error::{ParloError, Result};
use crate::tts::SpeechSynthesisService;

#[derive(Serialize)]
struct SpeechRequest {
    model: String,
    input: String,
    voice: String,
    response_format: String,
}

pub struct HttpSynthesisService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    /// Voice per language tag; falls back to `default_voice`.
    voices: HashMap<String, String>,
    default_voice: String,
}

impl HttpSynthesisService {
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.deadline_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            voices: config.voices.clone(),
            default_voice: config.voice.clone(),
        })
    }

    fn voice_for(&self, language: &str) -> &str {
        self.voices
            .get(language)
            .map(String::as_str)
            .unwrap_or(&self.default_voice)
    }
}

#[async_trait]
impl SpeechSynthesisService for HttpSynthesisService {
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioClip> {
        let request = SpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice: self.voice_for(language).to_string(),
            response_format: "wav".to_string(),
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(ParloError::Synthesis {
                message: format!("Synthesis server returned {}", response.status()),
            });
        }

        let bytes = response.bytes().await?;
        let clip = wav::decode_wav(&bytes)?;
        if clip.samples.is_empty() {
            return Err(ParloError::Synthesis {
                message: "Synthesis server returned empty audio".to_string(),
            });
        }
        Ok(clip)
    }
}

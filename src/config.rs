//! TOML configuration with per-section defaults and environment
//! variable overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chat::ChatProvider;
use crate::defaults;
use crate::error::{ParloError, Result};
use crate::vad::GateConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub asr: AsrConfig,
    pub chat: ChatConfig,
    pub tts: TtsConfig,
    pub turn: TurnConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; `None` means system default.
    pub device: Option<String>,
    /// Output device name; `None` means system default.
    pub output_device: Option<String>,
    pub sample_rate: u32,
    pub chunk_samples: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            output_device: None,
            sample_rate: defaults::SAMPLE_RATE,
            chunk_samples: defaults::CHUNK_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub threshold: f32,
    pub consecutive_chunks: u32,
    pub pre_roll_ms: u32,
    pub min_speech_ms: u32,
    pub silence_ms: u32,
    pub max_recording_secs: u32,
    pub continuation_probe_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::VAD_THRESHOLD,
            consecutive_chunks: defaults::CONSECUTIVE_CHUNKS,
            pre_roll_ms: defaults::PRE_ROLL_MS,
            min_speech_ms: defaults::MIN_SPEECH_MS,
            silence_ms: defaults::SILENCE_MS,
            max_recording_secs: defaults::MAX_RECORDING_SECS,
            continuation_probe_ms: defaults::CONTINUATION_PROBE_MS,
        }
    }
}

impl VadConfig {
    /// Converts the millisecond-based tuning into chunk counts for the gate.
    pub fn to_gate_config(&self, audio: &AudioConfig) -> GateConfig {
        let rate = audio.sample_rate;
        let chunk = audio.chunk_samples;
        GateConfig {
            threshold: self.threshold,
            consecutive_chunks: self.consecutive_chunks,
            pre_roll_chunks: defaults::ms_to_chunks(self.pre_roll_ms, rate, chunk) as usize,
            min_speech_chunks: defaults::ms_to_chunks(self.min_speech_ms, rate, chunk),
            silence_chunks: defaults::ms_to_chunks(self.silence_ms, rate, chunk),
            max_chunks: defaults::ms_to_chunks(self.max_recording_secs * 1_000, rate, chunk),
            sample_rate: rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    pub endpoint: String,
    /// Language hint passed to the transcription server.
    pub language: String,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::ASR_ENDPOINT.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub provider: ChatProvider,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub system_prompt: String,
    pub max_history: usize,
    pub stream_deadline_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: ChatProvider::Ollama,
            base_url: defaults::OLLAMA_BASE_URL.to_string(),
            api_key: None,
            model: defaults::CHAT_MODEL.to_string(),
            system_prompt: defaults::SYSTEM_PROMPT.to_string(),
            max_history: defaults::MAX_HISTORY_TURNS,
            stream_deadline_secs: defaults::CHAT_DEADLINE_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub endpoint: String,
    pub model: String,
    /// Fallback voice when no per-language entry matches.
    pub voice: String,
    /// Voice per detected language tag.
    pub voices: HashMap<String, String>,
    pub deadline_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::TTS_ENDPOINT.to_string(),
            model: "kokoro".to_string(),
            voice: "af_heart".to_string(),
            voices: HashMap::new(),
            deadline_secs: defaults::SYNTHESIS_DEADLINE_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub inter_turn_delay_ms: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            inter_turn_delay_ms: defaults::INTER_TURN_DELAY_MS,
        }
    }
}

impl Config {
    /// Loads from an explicit path, failing if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ParloError::ConfigFileNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads the given path, or the default location, or built-in
    /// defaults when no file exists.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                let mut config = Config::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("parlo").join("config.toml"))
    }

    /// `PARLO_*` environment variables win over file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("PARLO_CHAT_BASE_URL") {
            self.chat.base_url = value;
        }
        if let Ok(value) = std::env::var("PARLO_CHAT_API_KEY") {
            self.chat.api_key = Some(value);
        }
        if let Ok(value) = std::env::var("PARLO_CHAT_MODEL") {
            self.chat.model = value;
        }
        if let Ok(value) = std::env::var("PARLO_ASR_ENDPOINT") {
            self.asr.endpoint = value;
        }
        if let Ok(value) = std::env::var("PARLO_TTS_ENDPOINT") {
            self.tts.endpoint = value;
        }
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.vad.threshold) {
            return Err(ParloError::ConfigInvalidValue {
                key: "vad.threshold".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if self.vad.consecutive_chunks == 0 {
            return Err(ParloError::ConfigInvalidValue {
                key: "vad.consecutive_chunks".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.audio.chunk_samples == 0 {
            return Err(ParloError::ConfigInvalidValue {
                key: "audio.chunk_samples".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.audio.sample_rate == 0 {
            return Err(ParloError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.vad.max_recording_secs == 0 {
            return Err(ParloError::ConfigInvalidValue {
                key: "vad.max_recording_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

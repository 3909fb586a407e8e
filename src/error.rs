//! Error types for parlo.

use thiserror::Error;

/// Stage of the conversation turn in which a deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Recording,
    Transcription,
    ChatStream,
    Synthesis,
    Playback,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Recording => "recording",
            Stage::Transcription => "transcription",
            Stage::ChatStream => "chat stream",
            Stage::Synthesis => "synthesis",
            Stage::Playback => "playback",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ParloError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device error: {message}")]
    Device { message: String },

    // Speech-probability / transcription oracle errors
    #[error("Inference failed: {message}")]
    Inference { message: String },

    // Deadline expiry, tagged with the stage it occurred in
    #[error("Timed out after {secs}s during {stage}")]
    Timeout { stage: Stage, secs: u64 },

    // Speech synthesis errors
    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    // Playback errors
    #[error("Audio playback failed: {message}")]
    Playback { message: String },

    // Malformed external control or backend message
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // HTTP transport to chat/transcription/synthesis backends
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ParloError>;

impl ParloError {
    /// Returns true if this error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ParloError::Timeout { .. })
    }
}

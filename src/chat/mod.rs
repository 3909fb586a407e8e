//! Chat completion backends.
//!
//! Replies stream back as sentence-level increments so synthesis can start
//! before the model finishes. The backend set is closed: a config enum
//! plus [`create_chat_service`] select the implementation, no runtime
//! name-based dispatch.

pub mod ollama;
pub mod openai;
pub mod sentence;

pub use ollama::OllamaChatService;
pub use openai::OpenAiChatService;
pub use sentence::SentenceSplitter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::ChatConfig;
use crate::error::Result;

/// One completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub user: String,
    pub assistant: String,
}

/// Sentence increments from an in-flight reply. An `Err` item aborts the
/// turn; the channel closing marks the end of the reply.
pub type IncrementReceiver = mpsc::Receiver<Result<String>>;

#[async_trait]
pub trait ChatCompletionService: Send + Sync {
    /// Streams the reply to `text` as complete sentences.
    async fn chat_stream(&self, text: &str, history: &[ChatTurn]) -> Result<IncrementReceiver>;

    /// Non-streaming fallback returning the full reply.
    async fn chat(&self, text: &str, history: &[ChatTurn]) -> Result<String>;
}

/// Supported chat backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    #[default]
    Ollama,
    OpenAi,
}

/// Builds the configured backend.
pub fn create_chat_service(config: &ChatConfig) -> Result<Box<dyn ChatCompletionService>> {
    match config.provider {
        ChatProvider::Ollama => Ok(Box::new(OllamaChatService::new(config)?)),
        ChatProvider::OpenAi => Ok(Box::new(OpenAiChatService::new(config)?)),
    }
}

/// Wire-format chat message shared by both backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Assembles system prompt, prior turns, and the new user message.
pub fn build_messages(system_prompt: &str, history: &[ChatTurn], text: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    if !system_prompt.is_empty() {
        messages.push(Message {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        });
    }
    for turn in history {
        messages.push(Message {
            role: "user".to_string(),
            content: turn.user.clone(),
        });
        messages.push(Message {
            role: "assistant".to_string(),
            content: turn.assistant.clone(),
        });
    }
    messages.push(Message {
        role: "user".to_string(),
        content: text.to_string(),
    });
    messages
}

/// Bounded ring of recent turns supplied to the backend on every call.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    turns: Vec<ChatTurn>,
    max_turns: usize,
}

impl ConversationHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns,
        }
    }

    pub fn push(&mut self, user: &str, assistant: &str) {
        self.turns.push(ChatTurn {
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
        while self.turns.len() > self.max_turns {
            self.turns.remove(0);
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Scripted chat service for tests: replays canned sentence lists and
/// records every prompt with the history length it was called with.
pub struct MockChatService {
    replies: std::sync::Mutex<std::collections::VecDeque<Vec<String>>>,
    calls: std::sync::Mutex<Vec<(String, usize)>>,
}

impl MockChatService {
    pub fn new() -> Self {
        Self {
            replies: std::sync::Mutex::new(std::collections::VecDeque::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(self, sentences: &[&str]) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(sentences.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockChatService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatCompletionService for MockChatService {
    async fn chat_stream(&self, text: &str, history: &[ChatTurn]) -> Result<IncrementReceiver> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), history.len()));
        let sentences = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        let (tx, rx) = mpsc::channel(sentences.len().max(1));
        tokio::spawn(async move {
            for sentence in sentences {
                if tx.send(Ok(sentence)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn chat(&self, text: &str, history: &[ChatTurn]) -> Result<String> {
        let mut rx = self.chat_stream(text, history).await?;
        let mut reply = String::new();
        while let Some(increment) = rx.recv().await {
            let sentence = increment?;
            if !reply.is_empty() {
                reply.push(' ');
            }
            reply.push_str(&sentence);
        }
        Ok(reply)
    }
}

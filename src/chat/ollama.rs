//! Ollama chat backend speaking the `/api/chat` NDJSON protocol.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::chat::sentence::SentenceSplitter;
use crate::chat::{ChatCompletionService, ChatTurn, IncrementReceiver, Message, build_messages};
use crate::config::ChatConfig;
use crate::error::{ParloError, Result, Stage};

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    done: bool,
}

pub struct OllamaChatService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    system_prompt: String,
    stream_deadline: Duration,
}

impl OllamaChatService {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            stream_deadline: Duration::from_secs(config.stream_deadline_secs),
        })
    }

    async fn send_request(&self, text: &str, history: &[ChatTurn], stream: bool) -> Result<reqwest::Response> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: build_messages(&self.system_prompt, history, text),
            stream,
        };
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ParloError::Protocol {
                message: format!("Chat backend returned {}", response.status()),
            });
        }
        Ok(response)
    }
}

/// Reads the NDJSON body, pushing complete sentences into `tx`.
async fn read_stream(
    response: reqwest::Response,
    tx: &mpsc::Sender<Result<String>>,
) -> Result<()> {
    let mut splitter = SentenceSplitter::new();
    let mut body = response.bytes_stream();
    let mut line_buf = String::new();

    'outer: while let Some(bytes) = body.next().await {
        let bytes = bytes?;
        line_buf.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(newline) = line_buf.find('\n') {
            let line: String = line_buf.drain(..=newline).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let chunk: ChatChunk = serde_json::from_str(line).map_err(|e| ParloError::Protocol {
                message: format!("Malformed chat stream line: {}", e),
            })?;
            if let Some(message) = chunk.message {
                for sentence in splitter.push(&message.content) {
                    if tx.send(Ok(sentence)).await.is_err() {
                        return Ok(());
                    }
                }
            }
            if chunk.done {
                break 'outer;
            }
        }
    }

    if let Some(sentence) = splitter.flush() {
        let _ = tx.send(Ok(sentence)).await;
    }
    Ok(())
}

#[async_trait]
impl ChatCompletionService for OllamaChatService {
    async fn chat_stream(&self, text: &str, history: &[ChatTurn]) -> Result<IncrementReceiver> {
        let response = self.send_request(text, history, true).await?;
        let (tx, rx) = mpsc::channel(32);
        let deadline = self.stream_deadline;

        tokio::spawn(async move {
            match tokio::time::timeout(deadline, read_stream(response, &tx)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let _ = tx.send(Err(e)).await;
                }
                Err(_) => {
                    let _ = tx
                        .send(Err(ParloError::Timeout {
                            stage: Stage::ChatStream,
                            secs: deadline.as_secs(),
                        }))
                        .await;
                }
            }
        });
        Ok(rx)
    }

    async fn chat(&self, text: &str, history: &[ChatTurn]) -> Result<String> {
        let response = tokio::time::timeout(
            self.stream_deadline,
            self.send_request(text, history, false),
        )
        .await
        .map_err(|_| ParloError::Timeout {
            stage: Stage::ChatStream,
            secs: self.stream_deadline.as_secs(),
        })??;

        let chunk: ChatChunk = response.json().await?;
        Ok(chunk
            .message
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default())
    }
}

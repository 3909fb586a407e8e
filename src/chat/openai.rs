//! OpenAI-compatible chat backend (`/v1/chat/completions`, SSE stream).
//!
//! Also covers local servers exposing the same protocol (llama.cpp,
//! LM Studio, vLLM).

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
struct CompletionRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Message,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

pub struct OpenAiChatService {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    stream_deadline: Duration,
}

impl OpenAiChatService {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            stream_deadline: Duration::from_secs(config.stream_deadline_secs),
        })
    }

    async fn send_request(
        &self,
        text: &str,
        history: &[ChatTurn],
        stream: bool,
    ) -> Result<reqwest::Response> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: build_messages(&self.system_prompt, history, text),
            stream,
        };
        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(ParloError::Protocol {
                message: format!("Chat backend returned {}", response.status()),
            });
        }
        Ok(response)
    }
}

/// Reads the SSE body line by line, pushing complete sentences into `tx`.
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
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                break 'outer;
            }
            let chunk: StreamChunk =
                serde_json::from_str(data).map_err(|e| ParloError::Protocol {
                    message: format!("Malformed chat stream event: {}", e),
                })?;
            let delta = chunk
                .choices
                .first()
                .and_then(|c| c.delta.content.as_deref())
                .unwrap_or_default();
            for sentence in splitter.push(delta) {
                if tx.send(Ok(sentence)).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    if let Some(sentence) = splitter.flush() {
        let _ = tx.send(Ok(sentence)).await;
    }
    Ok(())
}

#[async_trait]
impl ChatCompletionService for OpenAiChatService {
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

        let completion: CompletionResponse = response.json().await?;
        Ok(completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default())
    }
}

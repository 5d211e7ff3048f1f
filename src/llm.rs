//! Language-model clients.
//!
//! [`ChatModel`] is the seam between the responder and a hosted model.
//! [`AnthropicModel`] talks to the Anthropic Messages API; streaming reads
//! its server-sent events on a spawned task and forwards text through a
//! bounded channel.
//!
//! A stream always ends with [`StreamChunk::End`] or an `Err`. If the
//! receiver is dropped, the producer task notices at its next await,
//! returns, and drops the HTTP response, closing the connection.
//!
//! `timeout_secs` bounds a whole [`ChatModel::complete`] call. Streams have
//! no overall limit: the response headers must arrive within it, and after
//! that it is the longest allowed silence between two body reads.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use rag_chat_core::chat::{ModelMessage, ModelRole};
use rag_chat_core::{RagError, Result};

use crate::config::{Credentials, ModelConfig};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Capacity of the fragment channel between producer and consumer.
pub const STREAM_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub messages: Vec<ModelMessage>,
}

/// One item of a streamed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Text(String),
    /// The model finished normally.
    End,
}

pub type ChunkReceiver = mpsc::Receiver<Result<StreamChunk>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &ModelRequest) -> Result<String>;

    /// Start a streamed answer. Errors before the first byte are returned
    /// here; later ones arrive on the channel.
    async fn stream(&self, request: &ModelRequest) -> Result<ChunkReceiver>;
}

/// Every call fails; used when `model.provider = "disabled"`.
pub struct DisabledModel;

#[async_trait]
impl ChatModel for DisabledModel {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: &ModelRequest) -> Result<String> {
        Err(RagError::model("model provider is disabled; set [model].provider"))
    }

    async fn stream(&self, request: &ModelRequest) -> Result<ChunkReceiver> {
        self.complete(request).await.map(|_| mpsc::channel(1).1)
    }
}

pub struct AnthropicModel {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    timeout: Duration,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl AnthropicModel {
    pub fn new(config: &ModelConfig, api_key: Option<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| RagError::model(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            api_key_env: config.api_key_env.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout,
        })
    }

    async fn send(&self, request: &ModelRequest, stream: bool) -> Result<reqwest::Response> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RagError::model(format!("{} not set", self.api_key_env)))?;

        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: request.system.as_deref(),
            temperature: self.temperature,
            messages: request
                .messages
                .iter()
                .map(|m| AnthropicMessage {
                    role: match m.role {
                        ModelRole::User => "user",
                        ModelRole::Assistant => "assistant",
                    },
                    content: &m.content,
                })
                .collect(),
            stream,
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key.trim())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        if !stream {
            builder = builder.timeout(self.timeout);
        }
        let resp = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| {
                RagError::model(format!(
                    "Anthropic did not respond within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| RagError::model(format!("failed to call Anthropic messages API: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::model(format!("Anthropic returned {}: {}", status, text)));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatModel for AnthropicModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String> {
        let resp = self.send(request, false).await?;
        let parsed: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| RagError::model(format!("failed to parse Anthropic response: {}", e)))?;
        let answer = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");
        if answer.is_empty() {
            return Err(RagError::model("Anthropic response missing text content"));
        }
        Ok(answer)
    }

    async fn stream(&self, request: &ModelRequest) -> Result<ChunkReceiver> {
        let resp = self.send(request, true).await?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let mut body = resp.bytes_stream();
        let idle = self.timeout;

        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        tracing::debug!("stream consumer went away, closing model connection");
                        return;
                    }
                    next = tokio::time::timeout(idle, body.next()) => next,
                };

                let bytes = match next {
                    Ok(Some(Ok(bytes))) => bytes,
                    Ok(Some(Err(e))) => {
                        let _ = tx.send(Err(RagError::model(format!("stream read failed: {}", e)))).await;
                        return;
                    }
                    Err(_) => {
                        tracing::warn!(idle_secs = idle.as_secs(), "model stream went silent");
                        let _ = tx
                            .send(Err(RagError::model(format!(
                                "model stream stalled for {}s",
                                idle.as_secs()
                            ))))
                            .await;
                        return;
                    }
                    Ok(None) => {
                        let _ = tx
                            .send(Err(RagError::model("model stream ended before message_stop")))
                            .await;
                        return;
                    }
                };

                for event in decoder.feed(&bytes) {
                    let item = match event {
                        Ok(SseEvent::Text(text)) => Ok(StreamChunk::Text(text)),
                        Ok(SseEvent::Stop) => Ok(StreamChunk::End),
                        Ok(SseEvent::Ignored) => continue,
                        Err(e) => Err(e),
                    };
                    let last = !matches!(item, Ok(StreamChunk::Text(_)));
                    if tx.send(item).await.is_err() || last {
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// A decoded Messages API stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Text(String),
    Stop,
    Ignored,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    ContentBlockDelta { delta: WireDelta },
    MessageStop,
    Error { error: WireError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

/// Line-buffered decoder for the Messages API event stream. Bytes may be
/// split anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<SseEvent>> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                events.push(parse_event(data.trim_start()));
            }
        }
        events
    }
}

pub fn parse_event(data: &str) -> Result<SseEvent> {
    let event: WireEvent = serde_json::from_str(data)
        .map_err(|e| RagError::model(format!("malformed stream event: {}", e)))?;
    Ok(match event {
        WireEvent::ContentBlockDelta {
            delta: WireDelta::TextDelta { text },
        } => SseEvent::Text(text),
        WireEvent::ContentBlockDelta { .. } => SseEvent::Ignored,
        WireEvent::MessageStop => SseEvent::Stop,
        WireEvent::Error { error } => {
            return Err(RagError::model(format!("model stream error: {}", error.message)))
        }
        WireEvent::Other => SseEvent::Ignored,
    })
}

pub fn create_model(
    config: &ModelConfig,
    credentials: &Credentials,
) -> Result<std::sync::Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(std::sync::Arc::new(DisabledModel)),
        "anthropic" => Ok(std::sync::Arc::new(AnthropicModel::new(
            config,
            credentials.model_api_key.clone(),
        )?)),
        other => Err(RagError::model(format!("unknown model provider: {}", other))),
    }
}

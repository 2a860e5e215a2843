// ABOUTME: Model driver for any OpenAI-compatible chat completions endpoint
// ABOUTME: Non-streaming and streaming completions with retry on transient failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # `OpenAI`-Compatible Provider
//!
//! Talks to `POST {base_url}/chat/completions`. Works against `OpenAI` itself
//! and against self-hosted servers exposing the same API (vLLM, Ollama,
//! `LocalAI`).
//!
//! Streaming requests ask for `stream_options.include_usage` so the last
//! chunk carries token usage. The response body is decoded through the
//! shared [`create_sse_stream`] line buffer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

use super::sse_parser::{
    create_sse_stream, is_retryable_request_error, is_retryable_status, RetryConfig,
};
use super::{
    ChatMessage, ChatRequest, ChatResponse, ChatStream, LlmCapabilities, LlmProvider,
    StreamChunk, TokenUsage,
};
use crate::config::LlmConfig;
use crate::errors::AppError;

const PROVIDER_NAME: &str = "openai";

/// Connection establishment timeout
const CONNECT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ChatMessage> for OpenAiMessage<'a> {
    fn from(msg: &'a ChatMessage) -> Self {
        Self {
            role: msg.role.as_str(),
            content: &msg.content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<OpenAiUsage> for TokenUsage {
    fn from(u: OpenAiUsage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for an `OpenAI`-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// API base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Bearer key, absent for local servers
    pub api_key: Option<String>,
    /// Model used when the request does not name one
    pub default_model: String,
    /// Sampling temperature used when the request does not set one
    pub temperature: f32,
    /// Token cap used when the request does not set one
    pub max_tokens: u32,
    /// Timeout for non-streaming requests
    pub request_timeout: Duration,
    /// Retries for the request that opens a completion
    pub max_retries: u32,
}

impl From<&LlmConfig> for OpenAiCompatibleConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            default_model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            request_timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        }
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Model driver for `OpenAI`-compatible endpoints
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
    retry: RetryConfig,
}

impl OpenAiCompatibleProvider {
    /// Build a provider with its own HTTP client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, AppError> {
        // No overall timeout on the client: streams may legitimately run for minutes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        let retry = RetryConfig::with_max_retries(config.max_retries);
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.config.base_url.trim_end_matches('/'))
    }

    fn add_auth_header(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => request.bearer_auth(key),
            _ => request,
        }
    }

    fn build_body<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: request
                .model
                .as_deref()
                .unwrap_or(&self.config.default_model),
            messages: request.messages.iter().map(OpenAiMessage::from).collect(),
            temperature: Some(request.temperature.unwrap_or(self.config.temperature)),
            max_tokens: Some(request.max_tokens.unwrap_or(self.config.max_tokens)),
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    /// Send a completion request, retrying transient failures with back-off
    async fn send_with_retry(
        &self,
        body: &OpenAiRequest<'_>,
        timeout: Option<Duration>,
    ) -> Result<Response, AppError> {
        let mut attempt = 0;
        loop {
            let mut builder = self
                .add_auth_header(self.client.post(self.api_url("chat/completions")))
                .json(body);
            if let Some(timeout) = timeout {
                builder = builder.timeout(timeout);
            }

            match builder.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response)
                    if is_retryable_status(response.status().as_u16())
                        && attempt < self.retry.max_retries =>
                {
                    warn!(
                        status = %response.status(),
                        attempt,
                        "Retryable model API status"
                    );
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(parse_error_response(status, &text));
                }
                Err(e) if is_retryable_request_error(&e) && attempt < self.retry.max_retries => {
                    warn!(attempt, error = %e, "Retryable model API request error");
                }
                Err(e) => {
                    error!(error = %e, "Model API request failed");
                    return Err(AppError::external_service(
                        PROVIDER_NAME,
                        format!("Failed to connect to {}: {e}", self.config.base_url),
                    ));
                }
            }

            sleep(self.retry.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }
}

/// Map a non-2xx body to an error carrying the vendor message
fn parse_error_response(status: StatusCode, body: &str) -> AppError {
    serde_json::from_str::<OpenAiErrorResponse>(body).map_or_else(
        |_| {
            AppError::external_service(
                PROVIDER_NAME,
                format!(
                    "API error ({status}): {}",
                    body.chars().take(200).collect::<String>()
                ),
            )
        },
        |parsed| {
            let kind = parsed.error.error_type.unwrap_or_else(|| "error".to_owned());
            AppError::external_service(
                PROVIDER_NAME,
                format!("API error ({status}) {kind}: {}", parsed.error.message),
            )
        },
    )
}

/// Convert one streamed JSON payload into a chunk
fn parse_stream_data(data: &str) -> Option<Result<StreamChunk, AppError>> {
    let parsed = match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Skipping unparseable stream chunk: {e}");
            return None;
        }
    };

    let mut chunk = StreamChunk {
        usage: parsed.usage.map(TokenUsage::from),
        ..StreamChunk::default()
    };
    if let Some(choice) = parsed.choices.into_iter().next() {
        chunk.delta = choice.delta.content.unwrap_or_default();
        chunk.finish_reason = choice.finish_reason;
    }
    chunk.carries_information().then_some(Ok(chunk))
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::chat_completions()
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.config.default_model)))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        let body = self.build_body(request, false);
        debug!(messages = body.messages.len(), "Sending chat completion request");

        let response = self
            .send_with_retry(&body, Some(self.config.request_timeout))
            .await?;
        let text = response.text().await.map_err(|e| {
            AppError::external_service(PROVIDER_NAME, format!("Failed to read response: {e}"))
        })?;

        let parsed: OpenAiResponse = serde_json::from_str(&text).map_err(|e| {
            AppError::external_service(PROVIDER_NAME, format!("Failed to parse response: {e}"))
        })?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::external_service(PROVIDER_NAME, "API returned no choices"))?;

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            model: parsed.model,
            usage: parsed.usage.map(TokenUsage::from),
            finish_reason: choice.finish_reason,
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.config.default_model)))]
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        let body = self.build_body(request, true);
        debug!(messages = body.messages.len(), "Opening streaming chat completion");

        let response = self.send_with_retry(&body, None).await?;
        Ok(create_sse_stream(
            response.bytes_stream(),
            parse_stream_data,
            PROVIDER_NAME,
        ))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<bool, AppError> {
        let response = self
            .add_auth_header(self.client.get(self.api_url("models")))
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| {
                AppError::external_service(PROVIDER_NAME, format!("Health check failed: {e}"))
            })?;

        let healthy = response.status().is_success();
        if !healthy {
            warn!(status = %response.status(), "Model API health check failed");
        }
        Ok(healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_delta() {
        let chunk = parse_stream_data(
            r#"{"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(chunk.delta, "Hi");
        assert!(!chunk.is_final);
        assert!(chunk.finish_reason.is_none());
    }

    #[test]
    fn test_parse_finish_reason_and_usage_chunks() {
        let finish = parse_stream_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(finish.finish_reason.as_deref(), Some("stop"));

        let usage = parse_stream_data(
            r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":3,"total_tokens":8}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(usage.usage.map(|u| u.completion_tokens), Some(3));
    }

    #[test]
    fn test_role_only_delta_is_skipped() {
        assert!(parse_stream_data(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).is_none());
        assert!(parse_stream_data("not json").is_none());
    }

    #[test]
    fn test_error_body_is_surfaced() {
        let err = parse_error_response(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"bad key","type":"invalid_request_error"}}"#,
        );
        assert!(err.message.contains("bad key"));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn test_request_body_asks_for_stream_usage() {
        let provider = OpenAiCompatibleProvider::new(OpenAiCompatibleConfig {
            base_url: "http://localhost:9/v1/".into(),
            api_key: None,
            default_model: "m".into(),
            temperature: 0.2,
            max_tokens: 64,
            request_timeout: Duration::from_secs(1),
            max_retries: 0,
        })
        .unwrap();
        let request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        let body = serde_json::to_value(provider.build_body(&request, true)).unwrap();
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["model"], "m");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(provider.api_url("chat/completions"), "http://localhost:9/v1/chat/completions");
    }
}

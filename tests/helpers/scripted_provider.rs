// ABOUTME: Deterministic in-process model driver that replays queued scripts
// ABOUTME: Drives the streaming pipeline in integration tests without network access
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! Each call to `complete_stream` pops the next queued script. Scripts can
//! delay, wait for a `Notify` gate, emit deltas with or without cumulative
//! text, fail mid-way or finish with usage. Every request is recorded so
//! tests can inspect the prompt that was sent.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::sleep;

use orion_server::errors::AppError;
use orion_server::llm::{
    ChatRequest, ChatResponse, ChatStream, LlmCapabilities, LlmProvider, StreamChunk, TokenUsage,
};

const PROVIDER_NAME: &str = "scripted";

/// One step of a scripted stream
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit a content delta
    Delta(String),
    /// Emit a delta together with the driver's own cumulative text
    Cumulative {
        /// Text added by this chunk
        delta: String,
        /// Full text so far, as the driver reports it
        content: String,
    },
    /// Sleep before the next step
    Delay(Duration),
    /// Block until the gate is notified
    WaitFor(Arc<Notify>),
    /// Emit an error chunk and end the stream
    Error(String),
    /// Emit the terminal chunk and end the stream
    Finish {
        /// Completion tokens reported in usage
        tokens: Option<u32>,
        /// Finish reason
        reason: Option<String>,
    },
}

impl ScriptStep {
    /// Shorthand for a delta step
    #[must_use]
    pub fn delta(text: &str) -> Self {
        Self::Delta(text.to_owned())
    }

    /// Shorthand for a delta carrying cumulative text
    #[must_use]
    pub fn cumulative(delta: &str, content: &str) -> Self {
        Self::Cumulative {
            delta: delta.to_owned(),
            content: content.to_owned(),
        }
    }

    /// Shorthand for a `stop` terminal step
    #[must_use]
    pub fn finish(tokens: u32) -> Self {
        Self::Finish {
            tokens: Some(tokens),
            reason: Some("stop".to_owned()),
        }
    }
}

#[derive(Debug)]
enum StreamScript {
    Steps(Vec<ScriptStep>),
    OpenError(String),
}

#[derive(Debug)]
enum Completion {
    Reply(String),
    Delayed(Duration, String),
    Fail(String),
}

/// Counts streams dropped before or after exhausting their script
struct DropGuard(Arc<AtomicUsize>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Model driver replaying queued scripts
#[derive(Default)]
pub struct ScriptedProvider {
    streams: Mutex<VecDeque<StreamScript>>,
    completions: Mutex<VecDeque<Completion>>,
    requests: Mutex<Vec<ChatRequest>>,
    streams_released: Arc<AtomicUsize>,
    capabilities: Option<LlmCapabilities>,
    healthy: Option<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedProvider {
    /// Create a provider with nothing queued
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a stream script
    #[must_use]
    pub fn with_stream(self, steps: Vec<ScriptStep>) -> Self {
        self.push_stream(steps);
        self
    }

    /// Queue a stream that fails to open
    #[must_use]
    pub fn with_open_error(self, message: &str) -> Self {
        lock(&self.streams).push_back(StreamScript::OpenError(message.to_owned()));
        self
    }

    /// Queue a non-streaming reply
    #[must_use]
    pub fn with_completion(self, text: &str) -> Self {
        lock(&self.completions).push_back(Completion::Reply(text.to_owned()));
        self
    }

    /// Queue a non-streaming reply that arrives after `delay`
    #[must_use]
    pub fn with_delayed_completion(self, delay: Duration, text: &str) -> Self {
        lock(&self.completions).push_back(Completion::Delayed(delay, text.to_owned()));
        self
    }

    /// Queue a failing non-streaming call
    #[must_use]
    pub fn with_completion_error(self, message: &str) -> Self {
        lock(&self.completions).push_back(Completion::Fail(message.to_owned()));
        self
    }

    /// Advertise `capabilities` instead of a full chat completions set
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: LlmCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Report the upstream as unreachable from `health_check`
    #[must_use]
    pub const fn unreachable(mut self) -> Self {
        self.healthy = Some(false);
        self
    }

    /// Queue a stream script on a shared provider
    pub fn push_stream(&self, steps: Vec<ScriptStep>) {
        lock(&self.streams).push_back(StreamScript::Steps(steps));
    }

    /// Every request received so far, in order
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    /// Number of opened streams that have since been dropped
    #[must_use]
    pub fn streams_released(&self) -> usize {
        self.streams_released.load(Ordering::SeqCst)
    }

    fn record(&self, request: &ChatRequest) {
        lock(&self.requests).push(request.clone());
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> LlmCapabilities {
        self.capabilities
            .unwrap_or_else(LlmCapabilities::chat_completions)
    }

    fn default_model(&self) -> &str {
        PROVIDER_NAME
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        self.record(request);
        let next = lock(&self.completions).pop_front();
        let content = match next {
            Some(Completion::Reply(text)) => text,
            Some(Completion::Delayed(delay, text)) => {
                sleep(delay).await;
                text
            }
            Some(Completion::Fail(message)) => {
                return Err(AppError::external_service(PROVIDER_NAME, message));
            }
            None => {
                return Err(AppError::external_service(
                    PROVIDER_NAME,
                    "no scripted completion queued",
                ));
            }
        };

        Ok(ChatResponse {
            content,
            model: PROVIDER_NAME.to_owned(),
            usage: None,
            finish_reason: Some("stop".to_owned()),
        })
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        self.record(request);
        let next = lock(&self.streams).pop_front();
        let steps = match next {
            Some(StreamScript::Steps(steps)) => steps,
            Some(StreamScript::OpenError(message)) => {
                return Err(AppError::external_service(PROVIDER_NAME, message));
            }
            None => {
                return Err(AppError::external_service(
                    PROVIDER_NAME,
                    "no scripted stream queued",
                ));
            }
        };

        let guard = DropGuard(Arc::clone(&self.streams_released));
        let chunks = stream! {
            let _guard = guard;
            for step in steps {
                match step {
                    ScriptStep::Delta(text) => yield Ok(StreamChunk::delta(text)),
                    ScriptStep::Cumulative { delta, content } => yield Ok(StreamChunk {
                        delta,
                        content: Some(content),
                        ..StreamChunk::default()
                    }),
                    ScriptStep::Delay(delay) => sleep(delay).await,
                    ScriptStep::WaitFor(gate) => gate.notified().await,
                    ScriptStep::Error(message) => {
                        yield Err(AppError::external_service(PROVIDER_NAME, message));
                        break;
                    }
                    ScriptStep::Finish { tokens, reason } => {
                        let usage = tokens.map(|completion_tokens| TokenUsage {
                            prompt_tokens: 0,
                            completion_tokens,
                            total_tokens: completion_tokens,
                        });
                        yield Ok(StreamChunk::terminal(reason, usage));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(chunks))
    }

    async fn health_check(&self) -> Result<bool, AppError> {
        Ok(self.healthy.unwrap_or(true))
    }
}

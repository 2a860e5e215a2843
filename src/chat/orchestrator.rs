// ABOUTME: Stream orchestrator owning one assistant reply from placeholder to terminal state
// ABOUTME: Multiplexes model chunks, heartbeats and client disconnect onto the SSE writer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # Stream Orchestrator
//!
//! A stream runs in two phases:
//!
//! 1. [`StreamOrchestrator::prepare`] authorizes the caller, resolves the user
//!    turn to answer, demotes any in-flight reply of the conversation and
//!    inserts the `streaming` placeholder. Every failure here is an HTTP error
//!    and no event has been written.
//! 2. [`StreamOrchestrator::run`] emits `message_start`, drives the model
//!    driver and moves the placeholder to exactly one terminal state. Every
//!    live stream ends with `done` unless the client has already gone.
//!
//! Single-in-flight is enforced in the store, not in process: a newer stream
//! flips older placeholders to `failed`, and finalize writes only apply while
//! the row is still `streaming`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::context::{build_context, ContextRequest};
use super::sse::{SseWriter, StreamEvent};
use super::title::TitleGenerator;
use crate::config::ChatConfig;
use crate::constants::{CLIENT_CANCELED_REASON, SUPERSEDED_REASON};
use crate::database::{now_timestamp, ChatManager, FinalizeMessage};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::lifecycle::ShutdownSignal;
use crate::llm::{ChatRequest, LlmProvider, TokenUsage};
use crate::logging::AppLogger;
use crate::models::{ConversationRecord, MessageRecord, MessageStatus, SenderType};

/// Tunables of the streaming pipeline
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Period of `: ping` frames
    pub heartbeat_interval: Duration,
    /// Maximum history messages in the prompt
    pub max_history_turns: usize,
    /// Preamble placed before history
    pub system_prompt: String,
    /// Deadline of the title side task
    pub title_deadline: Duration,
    /// Sentinel title that triggers auto-titling
    pub default_title: String,
}

impl From<&ChatConfig> for OrchestratorSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            max_history_turns: config.max_history_turns,
            system_prompt: config.system_prompt.clone(),
            title_deadline: config.title_deadline(),
            default_title: config.default_conversation_title.clone(),
        }
    }
}

/// Which user turn the reply answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTarget {
    /// Most recently created user message
    LatestUserMessage,
    /// Explicit `userMessageId`, validated as a well-formed id
    UserMessage(String),
    /// The user turn an existing assistant message answered
    Regenerate(String),
}

/// One streaming request
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Authenticated caller
    pub user_id: String,
    /// Conversation to reply in
    pub conversation_id: String,
    /// User turn to answer
    pub target: ReplyTarget,
}

/// State handed from the prepare phase to the run phase
pub struct PreparedStream {
    conversation: ConversationRecord,
    parent: MessageRecord,
    placeholder: MessageRecord,
    writer: SseWriter,
    started: Instant,
}

impl PreparedStream {
    /// Id of the placeholder assistant message
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.placeholder.id
    }
}

/// Terminal summary of one stream
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    /// Assistant message id
    pub message_id: String,
    /// Status this stream tried to write
    pub status: MessageStatus,
    /// Whether the terminal write applied; `false` when a newer stream superseded it
    pub persisted: bool,
    /// Text delivered to the client
    pub content: String,
    /// Title written by the side task
    pub title: Option<String>,
    /// Bytes handed to the sink
    pub bytes_delivered: usize,
}

enum StreamEnd {
    Finished,
    Failed(String),
    Canceled,
}

/// Drives assistant replies for the HTTP surface
#[derive(Clone)]
pub struct StreamOrchestrator {
    chat: ChatManager,
    provider: Arc<dyn LlmProvider>,
    titles: TitleGenerator,
    settings: Arc<OrchestratorSettings>,
    shutdown: ShutdownSignal,
}

impl StreamOrchestrator {
    /// Create an orchestrator over a store and a model driver
    ///
    /// Live streams settle as canceled once `shutdown` triggers.
    #[must_use]
    pub fn new(
        chat: ChatManager,
        provider: Arc<dyn LlmProvider>,
        settings: OrchestratorSettings,
        shutdown: ShutdownSignal,
    ) -> Self {
        let titles = TitleGenerator::new(Arc::clone(&provider), settings.default_title.clone());
        Self {
            chat,
            provider,
            titles,
            settings: Arc::new(settings),
            shutdown,
        }
    }

    /// Prepare and run a stream to completion
    ///
    /// # Errors
    ///
    /// Returns the pre-stream error when [`Self::prepare`] fails
    pub async fn stream_assistant_reply(
        &self,
        request: StreamRequest,
        writer: SseWriter,
    ) -> AppResult<StreamOutcome> {
        let prepared = self.prepare(request, writer).await?;
        Ok(self.run(prepared).await)
    }

    /// Authorize, resolve the user turn, supersede and create the placeholder
    ///
    /// # Errors
    ///
    /// - `ConversationNotFound` when the conversation is missing, deleted or not owned
    /// - `InvalidUserMessageId` for a malformed `userMessageId`
    /// - `UserMessageNotFound` when no suitable user turn exists
    /// - `MessageNotFound`, `AssistantMessageNotFound`, `ParentMessageMissing` for regenerate targets
    /// - `SinkNotFlushable` when the writer cannot stream
    /// - `ExternalServiceError` when the model driver cannot stream
    /// - `PlaceholderCreateFailed` when the placeholder insert fails
    pub async fn prepare(&self, request: StreamRequest, writer: SseWriter) -> AppResult<PreparedStream> {
        let conversation = self
            .chat
            .get_conversation(&request.conversation_id, &request.user_id)
            .await?
            .ok_or_else(AppError::conversation_not_found)?;

        let parent = self.resolve_parent(&conversation.id, &request.target).await?;

        if !writer.is_flushable() {
            return Err(AppError::new(
                ErrorCode::SinkNotFlushable,
                "Response writer does not support streaming",
            ));
        }
        if !self.provider.capabilities().supports_streaming() {
            return Err(AppError::external_service(
                self.provider.name(),
                "model driver does not support streaming",
            ));
        }

        let created = self
            .chat
            .create_placeholder(&conversation.id, &parent.id)
            .await
            .map_err(|e| {
                AppError::new(
                    ErrorCode::PlaceholderCreateFailed,
                    format!("Failed to create assistant message: {}", e.message),
                )
                .with_source(e)
            })?;
        if created.superseded > 0 {
            info!(
                conversation_id = %conversation.id,
                superseded = created.superseded,
                "Superseded in-flight assistant replies"
            );
        }
        let placeholder = created.message;
        debug!(
            conversation_id = %conversation.id,
            message_id = %placeholder.id,
            parent_id = %parent.id,
            "Created streaming placeholder"
        );

        Ok(PreparedStream {
            conversation,
            parent,
            placeholder,
            writer,
            started: Instant::now(),
        })
    }

    async fn resolve_parent(
        &self,
        conversation_id: &str,
        target: &ReplyTarget,
    ) -> AppResult<MessageRecord> {
        let user_message_missing =
            || AppError::new(ErrorCode::UserMessageNotFound, "User message not found");

        match target {
            ReplyTarget::LatestUserMessage => self
                .chat
                .latest_user_message(conversation_id)
                .await?
                .ok_or_else(user_message_missing),
            ReplyTarget::UserMessage(raw) => {
                let id = Uuid::parse_str(raw.trim()).map_err(|_| {
                    AppError::new(ErrorCode::InvalidUserMessageId, "Invalid userMessageId")
                })?;
                self.chat
                    .get_message(conversation_id, &id.to_string())
                    .await?
                    .filter(|m| m.sender_type == SenderType::User)
                    .ok_or_else(user_message_missing)
            }
            ReplyTarget::Regenerate(message_id) => {
                let reply = self
                    .chat
                    .get_message(conversation_id, message_id)
                    .await?
                    .ok_or_else(|| AppError::new(ErrorCode::MessageNotFound, "Message not found"))?;
                if reply.sender_type != SenderType::Ai {
                    return Err(AppError::new(
                        ErrorCode::AssistantMessageNotFound,
                        "Only assistant messages can be regenerated",
                    ));
                }
                let parent_id = reply.parent_message_id.ok_or_else(|| {
                    AppError::new(
                        ErrorCode::ParentMessageMissing,
                        "Assistant message is not linked to a user message",
                    )
                })?;
                self.chat
                    .get_message(conversation_id, &parent_id)
                    .await?
                    .filter(|m| m.sender_type == SenderType::User)
                    .ok_or_else(user_message_missing)
            }
        }
    }

    /// Stream the reply and settle the placeholder
    pub async fn run(&self, prepared: PreparedStream) -> StreamOutcome {
        let PreparedStream {
            conversation,
            parent,
            placeholder,
            writer,
            started,
        } = prepared;
        let message_id = placeholder.id;

        let start = StreamEvent::MessageStart {
            message_id: message_id.clone(),
            timestamp: placeholder.created_at,
        };
        let mut outcome = if writer.send(&start).await.is_err() {
            self.settle_canceled(&message_id, String::new(), started).await
        } else {
            self.pump(&conversation, &parent, &message_id, &writer, started)
                .await
        };

        outcome.bytes_delivered = writer.bytes_delivered();
        AppLogger::log_stream_outcome(
            &conversation.id,
            &message_id,
            outcome.status.as_str(),
            outcome.bytes_delivered,
            elapsed_ms(started).unsigned_abs(),
        );
        outcome
    }

    async fn pump(
        &self,
        conversation: &ConversationRecord,
        parent: &MessageRecord,
        message_id: &str,
        writer: &SseWriter,
        started: Instant,
    ) -> StreamOutcome {
        let request = match self.prompt_for(&conversation.id, &parent.id).await {
            Ok(request) => request,
            Err(e) => return self.settle_failed(message_id, String::new(), e.message, started, writer).await,
        };

        let period = self.settings.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Heartbeats also cover a slow upstream connect.
        let mut open = self.provider.complete_stream(&request);
        let opened = loop {
            tokio::select! {
                biased;
                () = writer.closed() => break None,
                () = self.shutdown.triggered() => break None,
                opened = &mut open => break Some(opened),
                _ = heartbeat.tick() => {
                    if writer.heartbeat().await.is_err() {
                        break None;
                    }
                }
            }
        };
        drop(open);
        let mut chunks = match opened {
            None => return self.settle_canceled(message_id, String::new(), started).await,
            Some(Err(e)) => {
                warn!(message_id, error = %e, "Model driver refused to open stream");
                return self.settle_failed(message_id, String::new(), e.message, started, writer).await;
            }
            Some(Ok(chunks)) => chunks,
        };

        let mut content = String::new();
        let mut finish_reason = None;
        let mut usage: Option<TokenUsage> = None;

        let end = loop {
            tokio::select! {
                biased;
                () = writer.closed() => break StreamEnd::Canceled,
                () = self.shutdown.triggered() => break StreamEnd::Canceled,
                next = chunks.next() => match next {
                    Some(Ok(chunk)) => {
                        if chunk.finish_reason.is_some() {
                            finish_reason = chunk.finish_reason;
                        }
                        if chunk.usage.is_some() {
                            usage = chunk.usage;
                        }
                        if !chunk.delta.is_empty() {
                            match chunk.content {
                                Some(cumulative) => content = cumulative,
                                None => content.push_str(&chunk.delta),
                            }
                            let delta = StreamEvent::ContentDelta {
                                message_id: message_id.to_owned(),
                                delta: chunk.delta,
                                content: content.clone(),
                            };
                            if writer.send(&delta).await.is_err() {
                                break StreamEnd::Canceled;
                            }
                        }
                        if chunk.is_final {
                            break StreamEnd::Finished;
                        }
                    }
                    Some(Err(e)) => break StreamEnd::Failed(e.message),
                    None => break StreamEnd::Finished,
                },
                _ = heartbeat.tick() => {
                    if writer.heartbeat().await.is_err() {
                        break StreamEnd::Canceled;
                    }
                }
            }
        };
        // Release the upstream connection before touching the store.
        drop(chunks);

        match end {
            StreamEnd::Canceled => self.settle_canceled(message_id, content, started).await,
            StreamEnd::Failed(error) => {
                warn!(message_id, %error, "Model driver failed mid-stream");
                self.settle_failed(message_id, content, error, started, writer).await
            }
            StreamEnd::Finished => {
                let token_count = usage.map(|u| i64::from(u.completion_tokens));
                self.settle_completed(
                    conversation,
                    parent,
                    message_id,
                    content,
                    token_count,
                    finish_reason,
                    started,
                    writer,
                )
                .await
            }
        }
    }

    async fn prompt_for(&self, conversation_id: &str, parent_id: &str) -> AppResult<ChatRequest> {
        let history = self.chat.get_history(conversation_id).await?;
        let messages = build_context(
            &history,
            ContextRequest {
                anchor_message_id: Some(parent_id),
                max_history_turns: self.settings.max_history_turns,
                system_prompt: &self.settings.system_prompt,
            },
        )?;
        Ok(ChatRequest::new(messages).with_streaming())
    }

    async fn finalize(&self, message_id: &str, outcome: FinalizeMessage) -> bool {
        match self.chat.finalize_message(message_id, &outcome).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    message_id,
                    status = outcome.status.as_str(),
                    "Placeholder already terminal, newer stream wins"
                );
                false
            }
            Err(e) => {
                error!(message_id, error = %e, "Failed to finalize assistant message");
                false
            }
        }
    }

    async fn settle_canceled(&self, message_id: &str, content: String, started: Instant) -> StreamOutcome {
        if self.shutdown.is_triggered() {
            info!(message_id, delivered = content.len(), "Server shutting down mid-stream");
        } else {
            info!(message_id, delivered = content.len(), "Client disconnected mid-stream");
        }
        let persisted = self
            .finalize(
                message_id,
                FinalizeMessage {
                    content: content.clone(),
                    status: MessageStatus::Partial,
                    token_count: None,
                    processing_time_ms: elapsed_ms(started),
                    finish_reason: None,
                    error_message: Some(CLIENT_CANCELED_REASON.to_owned()),
                },
            )
            .await;
        StreamOutcome {
            message_id: message_id.to_owned(),
            status: MessageStatus::Partial,
            persisted,
            content,
            title: None,
            bytes_delivered: 0,
        }
    }

    async fn settle_failed(
        &self,
        message_id: &str,
        content: String,
        error: String,
        started: Instant,
        writer: &SseWriter,
    ) -> StreamOutcome {
        let persisted = self
            .finalize(
                message_id,
                FinalizeMessage {
                    content: content.clone(),
                    status: MessageStatus::Failed,
                    token_count: None,
                    processing_time_ms: elapsed_ms(started),
                    finish_reason: None,
                    error_message: Some(error.clone()),
                },
            )
            .await;

        let failure = StreamEvent::AiError {
            message_id: message_id.to_owned(),
            error,
        };
        if writer.send(&failure).await.is_ok() {
            let _ = writer.send(&StreamEvent::Done {}).await;
        }

        StreamOutcome {
            message_id: message_id.to_owned(),
            status: MessageStatus::Failed,
            persisted,
            content,
            title: None,
            bytes_delivered: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn settle_completed(
        &self,
        conversation: &ConversationRecord,
        parent: &MessageRecord,
        message_id: &str,
        content: String,
        token_count: Option<i64>,
        finish_reason: Option<String>,
        started: Instant,
        writer: &SseWriter,
    ) -> StreamOutcome {
        let processing_time_ms = elapsed_ms(started);
        let persisted = self
            .finalize(
                message_id,
                FinalizeMessage {
                    content: content.clone(),
                    status: MessageStatus::Completed,
                    token_count,
                    processing_time_ms,
                    finish_reason: finish_reason.clone(),
                    error_message: None,
                },
            )
            .await;

        let mut outcome = StreamOutcome {
            message_id: message_id.to_owned(),
            status: MessageStatus::Completed,
            persisted,
            content,
            title: None,
            bytes_delivered: 0,
        };

        // A superseded stream must not report a completion its row does not hold.
        if !persisted {
            let superseded = StreamEvent::AiError {
                message_id: message_id.to_owned(),
                error: SUPERSEDED_REASON.to_owned(),
            };
            if writer.send(&superseded).await.is_ok() {
                let _ = writer.send(&StreamEvent::Done {}).await;
            }
            return outcome;
        }

        if let Err(e) = self.chat.record_completion(&conversation.id).await {
            error!(conversation_id = %conversation.id, error = %e, "Failed to update conversation counters");
        }

        let complete = StreamEvent::MessageComplete {
            message_id: message_id.to_owned(),
            token_count,
            processing_time_ms,
            finish_reason,
            timestamp: now_timestamp(),
        };
        if writer.send(&complete).await.is_err() {
            return outcome;
        }

        if conversation.has_default_title(&self.settings.default_title) {
            let generated = tokio::select! {
                biased;
                () = writer.closed() => None,
                () = self.shutdown.triggered() => None,
                title = self.titles.generate(&parent.content, &outcome.content, self.settings.title_deadline) => Some(title),
            };
            let Some(title) = generated else {
                return outcome;
            };
            outcome.title = self.apply_title(conversation, title, writer).await;
        }

        let _ = writer.send(&StreamEvent::Done {}).await;
        outcome
    }

    async fn apply_title(
        &self,
        conversation: &ConversationRecord,
        title: String,
        writer: &SseWriter,
    ) -> Option<String> {
        match self
            .chat
            .update_title_if_default(&conversation.id, &title, &self.settings.default_title)
            .await
        {
            Ok(true) => {
                info!(conversation_id = %conversation.id, %title, "Conversation auto-titled");
                let updated = StreamEvent::ConversationTitleUpdated {
                    conversation_id: conversation.id.clone(),
                    title: title.clone(),
                };
                let _ = writer.send(&updated).await;
                Some(title)
            }
            Ok(false) => {
                debug!(conversation_id = %conversation.id, "Title changed concurrently, keeping it");
                None
            }
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "Failed to store generated title");
                None
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

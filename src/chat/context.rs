// ABOUTME: Builds the prompt sequence sent to the model driver from conversation history
// ABOUTME: Bounded tail of settled turns ending on a user turn, with an optional preamble
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # Context Builder
//!
//! A pure function over already-loaded history. Rows that are still
//! `streaming` (including the placeholder of the current stream), deleted
//! rows and assistant rows that never produced text are skipped. The window
//! ends at the anchor user turn, or at the latest user turn when no anchor
//! is given, and holds at most `max_history_turns` messages.

use thiserror::Error;

use crate::errors::{AppError, ErrorCode};
use crate::llm::ChatMessage;
use crate::models::{MessageRecord, MessageStatus, SenderType};

/// Context assembly failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// History holds no user turn the reply could answer
    #[error("conversation has no user message to answer")]
    NoUserPrompt,
}

impl From<ContextError> for AppError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::NoUserPrompt => Self::new(ErrorCode::UserMessageNotFound, err.to_string()),
        }
    }
}

/// Inputs of one context build
#[derive(Debug, Clone, Copy)]
pub struct ContextRequest<'a> {
    /// User turn the reply answers; latest user turn when absent
    pub anchor_message_id: Option<&'a str>,
    /// Maximum number of history messages, system preamble excluded
    pub max_history_turns: usize,
    /// Preamble placed first; skipped when blank
    pub system_prompt: &'a str,
}

fn is_settled(message: &MessageRecord) -> bool {
    if message.is_deleted() || message.status == MessageStatus::Streaming {
        return false;
    }
    !(message.sender_type == SenderType::Ai && message.content.trim().is_empty())
}

fn to_chat_message(message: &MessageRecord) -> ChatMessage {
    match message.sender_type {
        SenderType::User => ChatMessage::user(&message.content),
        SenderType::Ai => ChatMessage::assistant(&message.content),
        SenderType::System => ChatMessage::system(&message.content),
    }
}

/// Build the ordered prompt for the model driver
///
/// # Errors
///
/// Returns [`ContextError::NoUserPrompt`] when no eligible user turn exists
pub fn build_context(
    history: &[MessageRecord],
    request: ContextRequest<'_>,
) -> Result<Vec<ChatMessage>, ContextError> {
    let settled: Vec<&MessageRecord> = history.iter().filter(|m| is_settled(m)).collect();

    let is_user = |m: &&MessageRecord| m.sender_type == SenderType::User;
    let anchored = request
        .anchor_message_id
        .and_then(|anchor| settled.iter().position(|m| is_user(m) && m.id == anchor));
    let end = anchored
        .or_else(|| settled.iter().rposition(is_user))
        .ok_or(ContextError::NoUserPrompt)?;

    let window = request.max_history_turns.max(1);
    let start = (end + 1).saturating_sub(window);

    let mut messages = Vec::with_capacity(end + 2 - start);
    if !request.system_prompt.trim().is_empty() {
        messages.push(ChatMessage::system(request.system_prompt));
    }
    messages.extend(settled[start..=end].iter().map(|m| to_chat_message(m)));
    Ok(messages)
}

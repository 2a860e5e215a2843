// ABOUTME: Chat conversation and message record types for database persistence
// ABOUTME: Lifecycle enums for conversations, message status and sender roles
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    /// Visible in the default listing
    #[default]
    Active,
    /// Hidden from the default listing but still readable
    Archived,
    /// Soft-deleted, treated as absent everywhere
    Deleted,
}

impl ConversationStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown conversation status '{other}'")),
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a message
///
/// `Streaming` is the only non-terminal state. An assistant message enters it
/// when its placeholder row is inserted and leaves it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Fully delivered
    Completed,
    /// Placeholder still being filled by a live stream
    Streaming,
    /// Client went away mid-stream; content holds what was delivered
    Partial,
    /// Driver error or superseded by a newer stream
    Failed,
}

impl MessageStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Streaming => "streaming",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition may overwrite this status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Streaming)
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "streaming" => Ok(Self::Streaming),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown message status '{other}'")),
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored a message
///
/// Assistant replies are stored as `ai`; the model driver boundary maps them
/// to the `assistant` role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    /// End user turn
    User,
    /// Assistant reply
    Ai,
    /// System note
    System,
}

impl SenderType {
    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
            Self::System => "system",
        }
    }
}

impl FromStr for SenderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "ai" | "assistant" => Ok(Self::Ai),
            "system" => Ok(Self::System),
            other => Err(format!("unknown sender type '{other}'")),
        }
    }
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database representation of a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Unique conversation ID
    pub id: String,
    /// User ID who owns the conversation
    pub user_id: String,
    /// Conversation title (sentinel until auto-titled or renamed)
    pub title: String,
    /// Free-form JSON context supplied by the client
    pub context: Value,
    /// Lifecycle status
    pub status: ConversationStatus,
    /// Number of committed messages
    pub total_messages: i64,
    /// When the last message was committed (RFC 3339)
    pub last_message_at: Option<String>,
    /// When the conversation was created (RFC 3339)
    pub created_at: String,
    /// When the conversation was last updated (RFC 3339)
    pub updated_at: String,
}

impl ConversationRecord {
    /// Whether the title is still the sentinel (or empty) and may be auto-generated
    #[must_use]
    pub fn has_default_title(&self, sentinel: &str) -> bool {
        let title = self.title.trim();
        title.is_empty() || title == sentinel
    }
}

/// Database representation of a chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique message ID
    pub id: String,
    /// Conversation ID this message belongs to
    pub conversation_id: String,
    /// User turn an assistant reply answers
    pub parent_message_id: Option<String>,
    /// Author of the message
    pub sender_type: SenderType,
    /// Message content
    pub content: String,
    /// Content type, `text` unless the client says otherwise
    pub content_type: String,
    /// Client supplied metadata
    pub metadata: Option<Value>,
    /// Token count reported by the model driver
    pub token_count: Option<i64>,
    /// Wall-clock generation time
    pub processing_time_ms: Option<i64>,
    /// Finish reason reported by the model driver
    pub finish_reason: Option<String>,
    /// Lifecycle status
    pub status: MessageStatus,
    /// Error text for failed or partial replies
    pub error_message: Option<String>,
    /// Soft-delete timestamp
    pub deleted_at: Option<String>,
    /// When the message was created (RFC 3339)
    pub created_at: String,
    /// When the message was last updated (RFC 3339)
    pub updated_at: String,
}

impl MessageRecord {
    /// Whether the message was soft-deleted
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// ABOUTME: Core data models for the chat server
// ABOUTME: Re-exports conversation, message, tool and user records
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

/// Conversation and message records with lifecycle enums
pub mod conversation;

/// Tool registry and execution records
pub mod tool;

/// User account record
pub mod user;

pub use conversation::{
    ConversationRecord, ConversationStatus, MessageRecord, MessageStatus, SenderType,
};
pub use tool::{ToolExecutionRecord, ToolExecutionStatus, ToolRecord, ToolType};
pub use user::{UserRecord, UserRole};

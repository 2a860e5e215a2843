// ABOUTME: System prompts for LLM interactions loaded at compile time
// ABOUTME: Default assistant preamble and the conversation title prompt
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # System Prompts
//!
//! Prompts are loaded at compile time from markdown files for easy maintenance.

/// Default preamble placed before conversation history
pub const ORION_SYSTEM_PROMPT: &str = include_str!("orion_system.md");

/// Instructions for the title generator
pub const TITLE_SYSTEM_PROMPT: &str = include_str!("title_system.md");

/// Build the user turn sent to the title generator
#[must_use]
pub fn title_user_prompt(user_text: &str, assistant_text: &str) -> String {
    format!(
        "User question:\n{user_text}\n\nAssistant answer:\n{assistant_text}\n\nNow output only one short title."
    )
}

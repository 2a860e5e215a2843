// ABOUTME: Best-effort conversation title generation from the first exchange
// ABOUTME: Short non-streaming completion, punctuation cleanup, and a user-text fallback
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::constants::titles::{FALLBACK_TITLE_CHARS, TITLE_MAX_CHARS, TITLE_MAX_TOKENS};
use crate::llm::prompts::{title_user_prompt, TITLE_SYSTEM_PROMPT};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};

/// Punctuation removed from generated titles, CJK and ASCII
const STRIPPED_PUNCTUATION: &[char] = &[
    '"', '\'', '“', '”', '‘', '’', '【', '】', '（', '）', '(', ')', '[', ']', '{', '}', '。',
    '，', ',', '！', '!', '?', '？', '：', ':', '；', ';', '、', '—', '-',
];

/// Generates short titles; never fails
#[derive(Clone)]
pub struct TitleGenerator {
    provider: Arc<dyn LlmProvider>,
    default_title: String,
}

impl TitleGenerator {
    /// Create a generator that falls back to `default_title` when nothing usable remains
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, default_title: impl Into<String>) -> Self {
        Self {
            provider,
            default_title: default_title.into(),
        }
    }

    /// Ask the model for a title, falling back on error, empty output or deadline
    pub async fn generate(&self, user_text: &str, assistant_text: &str, deadline: Duration) -> String {
        let request = ChatRequest::new(vec![
            ChatMessage::system(TITLE_SYSTEM_PROMPT),
            ChatMessage::user(title_user_prompt(user_text, assistant_text)),
        ])
        .with_max_tokens(TITLE_MAX_TOKENS)
        .with_temperature(0.3);

        match timeout(deadline, self.provider.complete(&request)).await {
            Ok(Ok(response)) => {
                let title = sanitize_title(&response.content);
                if title.is_empty() {
                    debug!("Model returned an unusable title, using fallback");
                    self.fallback(user_text)
                } else {
                    title
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Title generation failed, using fallback");
                self.fallback(user_text)
            }
            Err(_) => {
                warn!(deadline_ms = deadline.as_millis(), "Title generation timed out, using fallback");
                self.fallback(user_text)
            }
        }
    }

    /// First characters of the user text, or the default title when it is blank
    #[must_use]
    pub fn fallback(&self, user_text: &str) -> String {
        let cleaned: String = user_text
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        let prefix: String = cleaned.trim().chars().take(FALLBACK_TITLE_CHARS).collect();
        let prefix = prefix.trim_end();
        if prefix.is_empty() {
            self.default_title.clone()
        } else {
            prefix.to_owned()
        }
    }
}

/// Strip control characters and punctuation, trim, and cap the length
#[must_use]
pub fn sanitize_title(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !c.is_control() && !STRIPPED_PUNCTUATION.contains(c))
        .collect();
    let truncated: String = stripped.trim().chars().take(TITLE_MAX_CHARS).collect();
    truncated.trim_end().to_owned()
}

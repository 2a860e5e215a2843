// ABOUTME: Line-buffering parser for the SSE bodies returned by streaming model APIs
// ABOUTME: Survives lines split across TCP reads and several events packed into one read
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # Upstream SSE Parser
//!
//! Streaming completion APIs answer with a `text/event-stream` body. Network
//! reads do not line up with event boundaries: one read may carry several
//! `data:` lines, and a JSON payload may be split across two reads. The
//! [`SseLineBuffer`] accumulates bytes until a full line is available, and
//! [`create_sse_stream`] turns a raw byte stream into a [`ChatStream`] using a
//! provider-specific `parse_data` closure.

use std::mem;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_stream::stream;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::{ChatStream, StreamChunk};
use crate::errors::AppError;

const DONE_MARKER: &str = "[DONE]";

/// A parsed upstream SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload with the prefix stripped
    Data(String),
    /// The `[DONE]` terminator
    Done,
}

/// Accumulates bytes and yields events for every complete line
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    /// Create an empty buffer
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append a network read and return the events of every line it completed
    ///
    /// Bytes are buffered raw so a multi-byte UTF-8 character split across
    /// reads is decoded intact.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Parse whatever is left once the byte stream ends
    pub fn flush(&mut self) -> Option<SseEvent> {
        let remaining = mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&remaining))
    }
}

/// Parse one SSE line; only `data:` fields matter to completion APIs
fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    // `event:`, `id:`, `retry:` and `:` comments carry nothing we consume
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim().is_empty() {
        return None;
    }
    if data.trim() == DONE_MARKER {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(data.to_owned()))
}

/// Wrap a raw byte stream into a [`ChatStream`]
///
/// `parse_data` converts one JSON payload into a chunk; returning `None` skips
/// payloads that carry nothing (role-only deltas, keep-alives). The stream
/// ends after the `[DONE]` terminator, which is surfaced as a final chunk.
pub fn create_sse_stream<S, F>(byte_stream: S, parse_data: F, provider_name: &'static str) -> ChatStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    F: Fn(&str) -> Option<Result<StreamChunk, AppError>> + Send + 'static,
{
    let chunks = stream! {
        let mut parser = SseLineBuffer::new();
        let mut byte_stream = Box::pin(byte_stream);

        'read: loop {
            let events = match byte_stream.next().await {
                Some(Ok(bytes)) => parser.feed(&bytes),
                Some(Err(e)) => {
                    yield Err(AppError::external_service(
                        provider_name,
                        format!("Stream read error: {e}"),
                    ));
                    break 'read;
                }
                None => {
                    if let Some(event) = parser.flush() {
                        for item in dispatch(event, &parse_data) {
                            yield item;
                        }
                    }
                    break 'read;
                }
            };

            for event in events {
                let done = event == SseEvent::Done;
                for item in dispatch(event, &parse_data) {
                    yield item;
                }
                if done {
                    break 'read;
                }
            }
        }
    };

    Box::pin(chunks.filter(|result| {
        let keep = result.as_ref().map_or(true, StreamChunk::carries_information);
        async move { keep }
    }))
}

fn dispatch<F>(event: SseEvent, parse_data: &F) -> Option<Result<StreamChunk, AppError>>
where
    F: Fn(&str) -> Option<Result<StreamChunk, AppError>>,
{
    match event {
        SseEvent::Data(json) => parse_data(&json),
        SseEvent::Done => Some(Ok(StreamChunk::terminal(None, None))),
    }
}

// ============================================================================
// Retry Configuration
// ============================================================================

/// Back-off settings for the request that opens a completion
///
/// Only the opening request is retried. Once bytes reach the client a
/// stream is never replayed.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Cap on the exponential delay in milliseconds
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// Back-off with `max_retries` retries starting at 500ms, capped at 5s
    #[must_use]
    pub const fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }

    /// `min(initial * 2^attempt, max)` plus up to 99ms of jitter
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self
            .initial_delay_ms
            .saturating_mul(1_u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::from(d.subsec_millis()))
            % 100;
        Duration::from_millis(base.min(self.max_delay_ms) + jitter)
    }
}

/// Rate limits and transient gateway failures are worth another attempt
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Connection and timeout failures are worth another attempt
#[must_use]
pub fn is_retryable_request_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

// ABOUTME: Server-sent event rendering and the sink the stream orchestrator writes to
// ABOUTME: Typed chat stream events, heartbeat comments and the channel-backed axum Sse body
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # SSE Writer
//!
//! Every event becomes one axum [`Event`] handed to the sink as a single
//! channel item, so a heartbeat can never land inside a half-written event.
//! The HTTP body is an [`Sse`] stream over a bounded channel: once the client
//! disconnects the body is dropped and [`EventSink::closed`] resolves.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Comment text of the heartbeat written between events
pub const HEARTBEAT_COMMENT: &str = "ping";

/// Events buffered between the orchestrator and the HTTP body
const CHANNEL_CAPACITY: usize = 64;

/// Events emitted on the chat stream, serialized as the `data` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum StreamEvent {
    /// Placeholder created; precedes every delta
    MessageStart {
        /// Assistant message id
        message_id: String,
        /// Placeholder creation time
        timestamp: String,
    },
    /// New text from the model
    ContentDelta {
        /// Assistant message id
        message_id: String,
        /// Text added by this chunk
        delta: String,
        /// Cumulative text so far
        content: String,
    },
    /// Reply stored as completed
    MessageComplete {
        /// Assistant message id
        message_id: String,
        /// Token count reported by the model driver
        token_count: Option<i64>,
        /// Wall-clock generation time
        processing_time_ms: i64,
        /// Finish reason reported by the model driver
        finish_reason: Option<String>,
        /// Completion time
        timestamp: String,
    },
    /// The model driver failed
    AiError {
        /// Assistant message id
        message_id: String,
        /// Driver error text
        error: String,
    },
    /// Conversation was auto-titled
    ConversationTitleUpdated {
        /// Conversation id
        conversation_id: String,
        /// New title
        title: String,
    },
    /// Last event of a live stream
    Done {},
}

impl StreamEvent {
    /// SSE `event:` field
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentDelta { .. } => "content_delta",
            Self::MessageComplete { .. } => "message_complete",
            Self::AiError { .. } => "ai_error",
            Self::ConversationTitleUpdated { .. } => "conversation_title_updated",
            Self::Done {} => "done",
        }
    }

    /// JSON `data:` payload
    #[must_use]
    pub fn payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}

// ============================================================================
// Sink
// ============================================================================

/// The client is gone; nothing more can be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event sink closed")]
pub struct SinkClosed;

/// Destination of SSE events for one stream
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Whether every written event reaches the client without buffering
    fn is_flushable(&self) -> bool;

    /// Deliver one complete event
    async fn write_event(&self, event: Event) -> Result<(), SinkClosed>;

    /// Resolve once the client has gone away
    async fn closed(&self);
}

/// Sink feeding an axum [`Sse`] response through a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<Event>,
}

impl ChannelSink {
    /// Create a sink and the streaming response that drains it
    #[must_use]
    pub fn response() -> (Self, Response) {
        let (sender, receiver) = mpsc::channel::<Event>(CHANNEL_CAPACITY);
        let stream = ReceiverStream::new(receiver).map(Ok::<_, Infallible>);
        // Keeps nginx-style proxies from buffering the stream.
        let response = ([("x-accel-buffering", "no")], Sse::new(stream)).into_response();
        (Self { sender }, response)
    }

    /// Wrap an existing channel
    #[must_use]
    pub const fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    fn is_flushable(&self) -> bool {
        true
    }

    async fn write_event(&self, event: Event) -> Result<(), SinkClosed> {
        self.sender.send(event).await.map_err(|_| SinkClosed)
    }

    async fn closed(&self) {
        self.sender.closed().await;
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Frames events onto a sink it owns exclusively
pub struct SseWriter {
    sink: Box<dyn EventSink>,
    bytes_delivered: AtomicUsize,
}

impl SseWriter {
    /// Take ownership of a sink
    #[must_use]
    pub fn new(sink: impl EventSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            bytes_delivered: AtomicUsize::new(0),
        }
    }

    /// Whether the underlying sink can stream
    #[must_use]
    pub fn is_flushable(&self) -> bool {
        self.sink.is_flushable()
    }

    /// Write one event
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] when the client has disconnected
    pub async fn send(&self, event: &StreamEvent) -> Result<(), SinkClosed> {
        let payload = event.payload();
        let len = payload.len();
        self.sink
            .write_event(Event::default().event(event.event_type()).data(payload))
            .await?;
        self.bytes_delivered.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    /// Write a heartbeat comment
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] when the client has disconnected
    pub async fn heartbeat(&self) -> Result<(), SinkClosed> {
        self.sink
            .write_event(Event::default().comment(HEARTBEAT_COMMENT))
            .await
    }

    /// Resolve once the client has gone away
    pub async fn closed(&self) {
        self.sink.closed().await;
    }

    /// Event payload bytes handed to the sink
    #[must_use]
    pub fn bytes_delivered(&self) -> usize {
        self.bytes_delivered.load(Ordering::Relaxed)
    }
}

/// Split a raw SSE body into `(event type, payload)` pairs and count heartbeats
///
/// Used by clients of this crate's own streams, such as integration tests.
#[must_use]
pub fn parse_frames(body: &str) -> (Vec<(String, serde_json::Value)>, usize) {
    let mut events = Vec::new();
    let mut heartbeats = 0;
    for frame in body.split("\n\n").filter(|f| !f.is_empty()) {
        if frame.starts_with(':') {
            heartbeats += 1;
            continue;
        }
        let mut event_type = None;
        let mut data = None;
        for line in frame.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event_type = Some(value.trim_start().to_owned());
            } else if let Some(value) = line.strip_prefix("data:") {
                data = serde_json::from_str(value.trim_start()).ok();
            }
        }
        if let (Some(event_type), Some(data)) = (event_type, data) {
            events.push((event_type, data));
        }
    }
    (events, heartbeats)
}

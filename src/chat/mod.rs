// ABOUTME: Streaming chat pipeline: context assembly, SSE framing, titling and orchestration
// ABOUTME: Turns a user turn into a persisted, live-streamed assistant reply
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # Streaming Chat Pipeline
//!
//! - [`context`]: bounded, well-ordered prompt from stored history
//! - [`sse`]: event framing and the sink the HTTP body drains
//! - [`title`]: best-effort conversation titles
//! - [`orchestrator`]: placeholder lifecycle, multiplexing and finalize

pub mod context;
pub mod orchestrator;
pub mod sse;
pub mod title;

pub use context::{build_context, ContextError, ContextRequest};
pub use orchestrator::{
    OrchestratorSettings, PreparedStream, ReplyTarget, StreamOrchestrator, StreamOutcome,
    StreamRequest,
};
pub use sse::{
    parse_frames, ChannelSink, EventSink, SinkClosed, SseWriter, StreamEvent, HEARTBEAT_COMMENT,
};
pub use title::{sanitize_title, TitleGenerator};

// ABOUTME: Main library entry point for the Orion chat server
// ABOUTME: Streaming chat backend of an engineering-productivity AI assistant
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

#![deny(unsafe_code)]

//! # Orion Server
//!
//! Authenticated users open conversations, post messages and receive model
//! replies as a live server-sent event stream while every exchange is
//! persisted with an explicit lifecycle status.
//!
//! ## Architecture
//!
//! - **chat**: context builder, SSE writer, title generator and the stream orchestrator
//! - **llm**: model driver trait with an OpenAI-compatible implementation
//! - **database**: `SQLite` store for users, conversations, messages and tools
//! - **tools**: api, webhook and MCP tool runners behind the tool registry
//! - **routes** / **middleware** / **server**: the axum HTTP surface
//! - **config** / **logging**: environment configuration and tracing set-up
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use orion_server::config::ServerConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("{}", config.summary());
//!     Ok(())
//! }
//! ```

/// Token issuance, validation and password hashing
pub mod auth;

/// Streaming chat pipeline
pub mod chat;

/// Environment configuration
pub mod config;

/// Application constants
pub mod constants;

/// Persistent store
pub mod database;

/// Error types shared with `orion-core`
pub mod errors;

/// Model driver abstraction and implementations
pub mod llm;

/// Process-wide shutdown signal
pub mod lifecycle;

/// Tracing subscriber set-up and structured log helpers
pub mod logging;

/// HTTP middleware
pub mod middleware;

/// Domain records
pub mod models;

/// HTTP route groups
pub mod routes;

/// Router assembly and server lifecycle
pub mod server;

/// Registered tool execution over HTTP, webhooks and MCP
pub mod tools;

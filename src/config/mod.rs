// ABOUTME: Configuration management module for centralized server settings
// ABOUTME: Re-exports the environment-driven ServerConfig and its sections
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! Configuration module for the Orion server
//!
//! All configuration comes from environment variables (optionally seeded
//! from a `.env` file). See [`environment::ServerConfig::from_env`].

/// Environment and server configuration
pub mod environment;

pub use environment::{
    AuthConfig, ChatConfig, CorsConfig, DatabaseConfig, DatabaseUrl, Environment, LlmConfig,
    LogLevel, ServerConfig,
};

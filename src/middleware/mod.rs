// ABOUTME: HTTP middleware for authentication and cross-origin access
// ABOUTME: Token resolution for handlers and the CORS layer applied to the router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

/// Bearer and query-token authentication
pub mod auth;
/// CORS layer construction
pub mod cors;

pub use auth::{bearer_token, AuthMiddleware};
pub use cors::setup_cors;

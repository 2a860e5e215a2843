// ABOUTME: Route module organization for the Orion HTTP API
// ABOUTME: Domain route groups plus the shared success envelope
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! Route module for the Orion server
//!
//! Each domain module contains route definitions and thin handlers that
//! delegate to the store and the stream orchestrator. Successful JSON
//! responses use [`ApiResponse`]; failures use the `AppError` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{AppError, AppResult, ErrorCode};

/// Registration, login, refresh and profile routes
pub mod auth;
/// Conversation, message and streaming routes
pub mod chat;
/// Health and readiness probes
pub mod health;
/// Tool registry, execution and execution history routes
pub mod tools;

pub use auth::AuthRoutes;
pub use chat::ChatRoutes;
pub use health::HealthRoutes;
pub use tools::ToolRoutes;

/// `{"success": true, "data": ...}` envelope for successful responses
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true`
    pub success: bool,
    /// Response payload
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 response
    pub fn ok(data: T) -> Response {
        Self::with_status(StatusCode::OK, data)
    }

    /// 201 response
    pub fn created(data: T) -> Response {
        Self::with_status(StatusCode::CREATED, data)
    }

    /// Response with an explicit status
    pub fn with_status(status: StatusCode, data: T) -> Response {
        (status, Json(Self { success: true, data })).into_response()
    }
}

/// Parse a JSON body, mapping malformed input to `code`
pub(crate) fn parse_json_body<T: DeserializeOwned>(body: &[u8], code: ErrorCode) -> AppResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::new(code, format!("Invalid request body: {e}")))
}

/// Like [`parse_json_body`], but an empty body yields the default value
pub(crate) fn parse_optional_body<T: DeserializeOwned + Default>(
    body: &[u8],
    code: ErrorCode,
) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json_body(body, code)
}

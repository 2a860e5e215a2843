// ABOUTME: Unified application error type with numeric error codes
// ABOUTME: Codes embed the HTTP status in their first three digits (40413 -> 404)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # Unified Error Handling
//!
//! Every error that can reach a client is an [`AppError`] carrying an
//! [`ErrorCode`]. The numeric code is part of the public wire contract: the
//! first three digits are the HTTP status, the remaining two identify the
//! failure within that status.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Axum `IntoResponse` implementation rendering the JSON envelope
#[cfg(feature = "http-response")]
pub mod response;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
#[repr(u32)]
pub enum ErrorCode {
    // 400 Bad Request
    /// Generic invalid input
    InvalidInput = 40000,
    /// Create-conversation body rejected
    InvalidConversationRequest = 40011,
    /// Send-message body rejected
    InvalidMessageRequest = 40012,
    /// Update-conversation body rejected
    InvalidConversationUpdate = 40013,
    /// `userMessageId` is not a well-formed id
    InvalidUserMessageId = 40014,
    /// Tool create/update body rejected
    InvalidToolRequest = 40031,
    /// Tool `config` or `authConfig` does not fit its tool type
    InvalidToolConfig = 40032,
    /// Tool execute body rejected
    InvalidToolExecution = 40033,

    // 401 Unauthorized
    /// No credentials were supplied
    AuthRequired = 40100,
    /// Credentials were supplied but are not valid
    AuthInvalid = 40101,
    /// Token has expired
    AuthExpired = 40102,
    /// Username/password mismatch
    InvalidCredentials = 40103,

    // 403 Forbidden
    /// Authenticated but not allowed
    PermissionDenied = 40300,
    /// Operation reserved for administrators
    AdminRequired = 40301,

    // 404 Not Found
    /// Generic missing resource
    ResourceNotFound = 40400,
    /// User record missing
    UserNotFound = 40401,
    /// Conversation missing, deleted, or owned by someone else
    ConversationNotFound = 40413,
    /// No suitable user message to answer
    UserMessageNotFound = 40414,
    /// Message missing
    MessageNotFound = 40416,
    /// Regenerate target is not an assistant message
    AssistantMessageNotFound = 40418,
    /// Assistant message is not linked to a user turn
    ParentMessageMissing = 40419,
    /// Tool missing
    ToolNotFound = 40431,
    /// Tool missing or disabled at execution time
    ToolDisabled = 40434,

    // 409 Conflict
    /// Unique constraint violated
    ResourceAlreadyExists = 40900,
    /// Another tool already uses this name
    ToolNameTaken = 40931,

    // 500 Internal Server Error
    /// Unexpected failure
    InternalError = 50000,
    /// Store failure
    DatabaseError = 50001,
    /// Model driver or other upstream failure
    ExternalServiceError = 50002,
    /// Misconfiguration detected at runtime
    ConfigError = 50003,
    /// Response writer cannot stream
    SinkNotFlushable = 50015,
    /// Placeholder assistant message could not be inserted
    PlaceholderCreateFailed = 50018,
}

impl ErrorCode {
    /// Every known code, used for decoding numeric codes
    pub const ALL: [Self; 31] = [
        Self::InvalidInput,
        Self::InvalidConversationRequest,
        Self::InvalidMessageRequest,
        Self::InvalidConversationUpdate,
        Self::InvalidUserMessageId,
        Self::InvalidToolRequest,
        Self::InvalidToolConfig,
        Self::InvalidToolExecution,
        Self::AuthRequired,
        Self::AuthInvalid,
        Self::AuthExpired,
        Self::InvalidCredentials,
        Self::PermissionDenied,
        Self::AdminRequired,
        Self::ResourceNotFound,
        Self::UserNotFound,
        Self::ConversationNotFound,
        Self::UserMessageNotFound,
        Self::MessageNotFound,
        Self::AssistantMessageNotFound,
        Self::ParentMessageMissing,
        Self::ToolNotFound,
        Self::ToolDisabled,
        Self::ResourceAlreadyExists,
        Self::ToolNameTaken,
        Self::InternalError,
        Self::DatabaseError,
        Self::ExternalServiceError,
        Self::ConfigError,
        Self::SinkNotFlushable,
        Self::PlaceholderCreateFailed,
    ];

    /// Numeric application code as sent on the wire
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// HTTP status embedded in the application code
    #[must_use]
    pub const fn http_status(self) -> u16 {
        (self.as_u32() / 100) as u16
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidInput => "The request contains invalid input",
            Self::InvalidConversationRequest => "Invalid conversation request",
            Self::InvalidMessageRequest => "Invalid message request",
            Self::InvalidConversationUpdate => "Invalid conversation update",
            Self::InvalidUserMessageId => "Invalid user message id",
            Self::InvalidToolRequest => "Invalid tool request",
            Self::InvalidToolConfig => "Invalid tool configuration",
            Self::InvalidToolExecution => "Invalid tool execution request",
            Self::AuthRequired => "Authentication is required to access this resource",
            Self::AuthInvalid => "The provided authentication token is invalid",
            Self::AuthExpired => "The authentication token has expired",
            Self::InvalidCredentials => "Invalid username or password",
            Self::PermissionDenied => "You do not have permission to perform this action",
            Self::AdminRequired => "Administrator role required",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::UserNotFound => "User not found",
            Self::ConversationNotFound => "Conversation not found",
            Self::UserMessageNotFound => "User message not found",
            Self::MessageNotFound => "Message not found",
            Self::AssistantMessageNotFound => "Assistant message not found",
            Self::ParentMessageMissing => "Assistant message has no parent user message",
            Self::ToolNotFound => "Tool not found",
            Self::ToolDisabled => "Tool not found or disabled",
            Self::ToolNameTaken => "Tool name already exists",
            Self::ResourceAlreadyExists => "The resource already exists",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database operation failed",
            Self::ExternalServiceError => "External service error",
            Self::ConfigError => "Configuration error",
            Self::SinkNotFlushable => "Streaming is not supported by this connection",
            Self::PlaceholderCreateFailed => "Failed to create assistant message",
        }
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        code.as_u32()
    }
}

impl TryFrom<u32> for ErrorCode {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_u32() == value)
            .ok_or_else(|| format!("unknown error code {value}"))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional structured payload placed in the envelope's `data` field
    pub data: Option<Value>,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            source: None,
        }
    }

    /// Attach a structured payload
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Authentication required
    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, "Authentication required")
    }

    /// Invalid authentication
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Authentication expired
    #[must_use]
    pub fn auth_expired() -> Self {
        Self::new(ErrorCode::AuthExpired, "Authentication token has expired")
    }

    /// Authenticated caller lacks permission
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Generic resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Conversation missing, deleted or not owned by the caller
    #[must_use]
    pub fn conversation_not_found() -> Self {
        Self::new(ErrorCode::ConversationNotFound, "Conversation not found")
    }

    /// Tool missing
    #[must_use]
    pub fn tool_not_found() -> Self {
        Self::new(ErrorCode::ToolNotFound, "Tool not found")
    }

    /// Caller is not an administrator
    #[must_use]
    pub fn admin_required() -> Self {
        Self::new(ErrorCode::AdminRequired, "Administrator role required")
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Resource already exists
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceAlreadyExists, message)
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// External service error
    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ExternalServiceError,
            format!("{}: {}", service.into(), message.into()),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// JSON envelope returned for every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Always `false`
    pub success: bool,
    /// Numeric application code
    pub error_code: u32,
    /// Human-readable message
    pub message: String,
    /// Optional structured payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&AppError> for ErrorEnvelope {
    fn from(error: &AppError) -> Self {
        Self {
            success: false,
            error_code: error.code.as_u32(),
            message: error.message.clone(),
            data: error.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::ConversationNotFound.http_status(), 404);
        assert_eq!(ErrorCode::UserMessageNotFound.http_status(), 404);
        assert_eq!(ErrorCode::InvalidUserMessageId.http_status(), 400);
        assert_eq!(ErrorCode::AuthRequired.http_status(), 401);
        assert_eq!(ErrorCode::SinkNotFlushable.http_status(), 500);
        assert_eq!(ErrorCode::PlaceholderCreateFailed.http_status(), 500);
        assert_eq!(ErrorCode::AdminRequired.http_status(), 403);
        assert_eq!(ErrorCode::ToolDisabled.http_status(), 404);
        assert_eq!(ErrorCode::ToolNameTaken.http_status(), 409);
        assert_eq!(ErrorCode::InvalidToolConfig.http_status(), 400);
    }

    #[test]
    fn test_error_code_serializes_as_number() {
        let json = serde_json::to_value(ErrorCode::ConversationNotFound).unwrap();
        assert_eq!(json, serde_json::json!(40413));

        let decoded: ErrorCode = serde_json::from_value(serde_json::json!(50015)).unwrap();
        assert_eq!(decoded, ErrorCode::SinkNotFlushable);
        assert!(serde_json::from_value::<ErrorCode>(serde_json::json!(12345)).is_err());
    }

    #[test]
    fn test_envelope_shape() {
        let error = AppError::new(ErrorCode::InvalidUserMessageId, "bad id")
            .with_data(serde_json::json!({"userMessageId": "nope"}));
        let envelope = ErrorEnvelope::from(&error);
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["errorCode"], 40014);
        assert_eq!(json["message"], "bad id");
        assert_eq!(json["data"]["userMessageId"], "nope");
    }

    #[test]
    fn test_envelope_omits_missing_data() {
        let envelope = ErrorEnvelope::from(&AppError::conversation_not_found());
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("data").is_none());
    }
}

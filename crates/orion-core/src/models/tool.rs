// ABOUTME: Tool registry and tool execution record types for database persistence
// ABOUTME: Tool kinds and execution status enums with their storage representations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a registered tool is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    /// Plain HTTP API call
    Api,
    /// JSON `POST` to a webhook
    Webhook,
    /// Remote MCP server tool over streamable HTTP
    Mcp,
}

impl ToolType {
    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Webhook => "webhook",
            Self::Mcp => "mcp",
        }
    }
}

impl FromStr for ToolType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(Self::Api),
            "webhook" => Ok(Self::Webhook),
            "mcp" => Ok(Self::Mcp),
            other => Err(format!("unknown tool type '{other}'")),
        }
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single tool run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolExecutionStatus {
    /// Recorded, not finished yet
    Pending,
    /// Tool answered successfully
    Success,
    /// Tool answered with an error or could not be reached
    Failed,
    /// Tool did not answer within its time budget
    Timeout,
}

impl ToolExecutionStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

impl FromStr for ToolExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "timeout" => Ok(Self::Timeout),
            other => Err(format!("unknown tool execution status '{other}'")),
        }
    }
}

impl fmt::Display for ToolExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database representation of a registered tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRecord {
    /// Unique tool ID
    pub id: String,
    /// Machine name, unique across the registry
    pub name: String,
    /// Name shown in the UI
    pub display_name: String,
    /// Free-form description
    pub description: String,
    /// Invocation kind
    pub tool_type: ToolType,
    /// Type-specific endpoint configuration
    pub config: Value,
    /// Credentials attached to outgoing calls
    pub auth_config: Option<Value>,
    /// Disabled tools cannot be executed
    pub enabled: bool,
    /// Administrator who registered the tool
    pub created_by: Option<String>,
    /// When the tool was registered
    pub created_at: String,
    /// Last update time
    pub updated_at: String,
}

/// Database representation of one tool run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    /// Unique execution ID
    pub id: String,
    /// Tool that ran
    pub tool_id: String,
    /// Chat message the run belongs to, if any
    pub message_id: Option<String>,
    /// Caller
    pub user_id: String,
    /// Arguments sent to the tool
    pub input_params: Value,
    /// Tool answer on success
    pub output_result: Option<Value>,
    /// Wall-clock run time
    pub execution_time_ms: Option<i64>,
    /// Outcome
    pub status: ToolExecutionStatus,
    /// Failure text for failed and timed-out runs
    pub error_message: Option<String>,
    /// When the run started
    pub created_at: String,
}

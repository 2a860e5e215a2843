// ABOUTME: Tool execution for registered api, webhook and MCP tools
// ABOUTME: ToolRunner dispatches one run under its time budget and maps failures to ToolError
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # Tools
//!
//! A registered tool is a [`ToolRecord`] whose JSON `config` decodes into a
//! [`ToolSpec`]. [`ToolRunner`] owns one HTTP client and runs a tool with
//! its input parameters:
//!
//! - `api`: one request to `config.url` with `config.method`
//! - `webhook`: the input `POST`ed as JSON to `config.url`
//! - `mcp`: `initialize`, then `tools/call` on a streamable-HTTP MCP server
//!
//! Every run is bounded by the tool's `timeoutSecs`.

mod http;

/// Typed tool configurations and validation
pub mod config;

/// Streamable-HTTP MCP client
pub mod mcp;

pub use config::{AuthConfig, HeaderSpec, ToolSpec};
pub use mcp::{McpClient, McpServerInfo, McpToolInfo};

use std::time::Duration;

use reqwest::{Client, Error as ReqwestError};
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::models::ToolRecord;

/// Connection establishment timeout for tool endpoints
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Why a tool run or connection test failed
#[derive(Debug, Error)]
pub enum ToolError {
    /// Stored `config` does not decode for the tool type
    #[error("invalid tool config: {0}")]
    InvalidConfig(String),
    /// Stored `authConfig` does not decode
    #[error("invalid auth config: {0}")]
    InvalidAuth(String),
    /// The endpoint could not be reached
    #[error("request failed: {0}")]
    Transport(String),
    /// The endpoint answered with a non-success status
    #[error("endpoint returned HTTP {status}: {body}")]
    Status {
        /// HTTP status
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },
    /// The MCP server answered with a JSON-RPC error
    #[error("mcp error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// JSON-RPC error message
        message: String,
    },
    /// The MCP tool ran and reported a failure
    #[error("tool reported an error: {0}")]
    Reported(String),
    /// The response did not follow the expected protocol
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The run exceeded its time budget
    #[error("tool timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl ToolError {
    /// Whether the failure is a timeout rather than an error answer
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<ReqwestError> for ToolError {
    fn from(error: ReqwestError) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Runs registered tools
#[derive(Clone)]
pub struct ToolRunner {
    client: Client,
}

impl ToolRunner {
    /// Build a runner with its own HTTP client
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to the default HTTP client for tools: {e}");
                Client::new()
            });
        Self { client }
    }

    /// Run `tool` once with `input`
    ///
    /// # Errors
    ///
    /// Returns a `ToolError` when the config is invalid, the endpoint fails,
    /// or the run exceeds its time budget
    #[instrument(skip(self, tool, input), fields(tool = %tool.name, tool_type = %tool.tool_type))]
    pub async fn run(&self, tool: &ToolRecord, input: &Value) -> Result<Value, ToolError> {
        let spec = ToolSpec::parse(tool.tool_type, &tool.config)?;
        let auth = AuthConfig::parse(tool.auth_config.as_ref())?;
        let budget = spec.timeout();

        let call = async {
            match &spec {
                ToolSpec::Api(api) => http::call_api(&self.client, api, auth.as_ref(), input).await,
                ToolSpec::Webhook(webhook) => {
                    http::call_webhook(&self.client, webhook, auth.as_ref(), input).await
                }
                ToolSpec::Mcp(mcp) => {
                    let name = mcp.tool_name.as_deref().unwrap_or(&tool.name);
                    let mut session = McpClient::connect(&self.client, mcp, auth.as_ref()).await?;
                    let result = session.call_tool(name, input).await;
                    session.close().await;
                    result
                }
            }
        };

        let output = timeout(budget, call)
            .await
            .map_err(|_| ToolError::Timeout(budget))??;
        debug!("Tool run succeeded");
        Ok(output)
    }

    /// Connect to an MCP tool's server and list the tools it offers
    ///
    /// # Errors
    ///
    /// Returns a `ToolError` when the tool is not an MCP tool or the server
    /// cannot be initialized within the tool's time budget
    #[instrument(skip(self, tool), fields(tool = %tool.name))]
    pub async fn test_connection(&self, tool: &ToolRecord) -> Result<McpServerInfo, ToolError> {
        let spec = ToolSpec::parse(tool.tool_type, &tool.config)?;
        let budget = spec.timeout();
        let ToolSpec::Mcp(mcp) = spec else {
            return Err(ToolError::InvalidConfig(
                "connection tests apply to mcp tools only".to_owned(),
            ));
        };
        let auth = AuthConfig::parse(tool.auth_config.as_ref())?;

        timeout(budget, async {
            let mut session = McpClient::connect(&self.client, &mcp, auth.as_ref()).await?;
            let tools = session.list_tools().await;
            session.close().await;
            Ok(McpServerInfo {
                server: session.server_info().clone(),
                tools: tools?,
            })
        })
        .await
        .map_err(|_| ToolError::Timeout(budget))?
    }
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new()
    }
}

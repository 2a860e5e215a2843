// ABOUTME: Minimal MCP client over the streamable HTTP transport
// ABOUTME: initialize, tools/list and tools/call with JSON or SSE-framed JSON-RPC responses
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # MCP Client
//!
//! Every JSON-RPC message is `POST`ed to the server endpoint. The server
//! answers with either `application/json` or a `text/event-stream` whose
//! `data:` lines carry JSON-RPC messages; the response whose `id` matches
//! the request wins. The `Mcp-Session-Id` header returned by `initialize`
//! is echoed on every later request and the session is released with
//! `DELETE` when the client closes.

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::config::{with_bearer, AuthConfig, McpConfig};
use super::http::with_headers;
use super::ToolError;
use crate::constants::tools::{MCP_CLIENT_NAME, MCP_PROTOCOL_VERSION, MCP_SESSION_HEADER};
use crate::constants::SERVICE_VERSION;
use crate::llm::sse_parser::{SseEvent, SseLineBuffer};

const JSONRPC_VERSION: &str = "2.0";

/// Header carrying the negotiated protocol revision after `initialize`
const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";

/// Upper bound on `tools/list` pages followed through `nextCursor`
const MAX_LIST_PAGES: usize = 20;

// ============================================================================
// JSON-RPC Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

// ============================================================================
// Public Types
// ============================================================================

/// One tool advertised by an MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolInfo {
    /// Tool name used in `tools/call`
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema of the arguments
    #[serde(default)]
    pub input_schema: Value,
}

/// Result of a connection test
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerInfo {
    /// The server's `initialize` result
    pub server: Value,
    /// Tools the server offers
    pub tools: Vec<McpToolInfo>,
}

/// An initialized MCP session
pub struct McpClient<'a> {
    http: &'a Client,
    endpoint: String,
    headers: McpHeaders<'a>,
    session_id: Option<String>,
    protocol_version: Option<String>,
    server: Value,
    next_id: u64,
}

struct McpHeaders<'a> {
    config: &'a McpConfig,
    auth: Option<&'a AuthConfig>,
}

impl McpHeaders<'_> {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        let request = with_headers(request, &self.config.headers, self.auth);
        match self.config.authorization.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(value) if self.auth.is_none() => request.header("Authorization", with_bearer(value)),
            _ => request,
        }
    }
}

impl<'a> McpClient<'a> {
    /// Open a session: `initialize` followed by `notifications/initialized`
    ///
    /// # Errors
    ///
    /// Returns a `ToolError` when the server is unreachable or rejects the handshake
    pub async fn connect(
        http: &'a Client,
        config: &'a McpConfig,
        auth: Option<&'a AuthConfig>,
    ) -> Result<Self, ToolError> {
        let mut client = Self {
            http,
            endpoint: config.endpoint.clone(),
            headers: McpHeaders { config, auth },
            session_id: None,
            protocol_version: None,
            server: Value::Null,
            next_id: 1,
        };

        let server = client
            .request(
                "initialize",
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": MCP_CLIENT_NAME, "version": SERVICE_VERSION },
                }),
            )
            .await?;
        client.protocol_version = server
            .get("protocolVersion")
            .and_then(Value::as_str)
            .map(str::to_owned);
        client.server = server;
        client.notify("notifications/initialized").await?;

        debug!(endpoint = %client.endpoint, session = ?client.session_id, "MCP session initialized");
        Ok(client)
    }

    /// The server's `initialize` result
    #[must_use]
    pub const fn server_info(&self) -> &Value {
        &self.server
    }

    /// Every tool the server offers
    ///
    /// # Errors
    ///
    /// Returns a `ToolError` when the request fails or the result is malformed
    pub async fn list_tools(&mut self) -> Result<Vec<McpToolInfo>, ToolError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.map_or_else(|| json!({}), |c| json!({ "cursor": c }));
            let mut result = self.request("tools/list", params).await?;
            let listed = result.get_mut("tools").map(Value::take).unwrap_or_default();
            let page: Vec<McpToolInfo> = serde_json::from_value(listed)
                .map_err(|e| ToolError::Protocol(format!("malformed tools/list result: {e}")))?;
            tools.extend(page);
            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_owned);
            if cursor.is_none() {
                break;
            }
        }
        Ok(tools)
    }

    /// Call `name` with `arguments` and return the `CallToolResult`
    ///
    /// # Errors
    ///
    /// Returns `ToolError::Reported` when the result has `isError` set, or
    /// another `ToolError` when the call itself fails
    pub async fn call_tool(&mut self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(ToolError::Reported(content_text(&result)));
        }
        Ok(result)
    }

    /// Release the server-side session; failures are only logged
    pub async fn close(&self) {
        let Some(session) = self.session_id.as_deref() else {
            return;
        };
        let request = self
            .headers
            .apply(self.http.delete(&self.endpoint))
            .header(MCP_SESSION_HEADER, session);
        if let Err(e) = request.send().await {
            debug!("Failed to close MCP session: {e}");
        }
    }

    fn post(&self, body: &RpcRequest<'_>) -> RequestBuilder {
        let mut request = self
            .headers
            .apply(self.http.post(&self.endpoint))
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = self.session_id.as_deref() {
            request = request.header(MCP_SESSION_HEADER, session);
        }
        if let Some(version) = self.protocol_version.as_deref() {
            request = request.header(PROTOCOL_VERSION_HEADER, version);
        }
        request
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value, ToolError> {
        let id = self.next_id;
        self.next_id += 1;

        let response = self
            .post(&RpcRequest {
                jsonrpc: JSONRPC_VERSION,
                method,
                params: Some(params),
                id: Some(id),
            })
            .send()
            .await?;
        let response = check_status(response).await?;

        if self.session_id.is_none() {
            self.session_id = response
                .headers()
                .get(MCP_SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
        }

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let rpc = if is_stream {
            read_event_stream(response, id).await?
        } else {
            let bytes = response.bytes().await?;
            serde_json::from_slice(&bytes)
                .map_err(|e| ToolError::Protocol(format!("malformed {method} response: {e}")))?
        };
        into_result(rpc)
    }

    async fn notify(&self, method: &str) -> Result<(), ToolError> {
        let response = self
            .post(&RpcRequest {
                jsonrpc: JSONRPC_VERSION,
                method,
                params: None,
                id: None,
            })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, ToolError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ToolError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn read_event_stream(response: Response, id: u64) -> Result<RpcResponse, ToolError> {
    let mut buffer = SseLineBuffer::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if let Some(found) = buffer.feed(&chunk).into_iter().find_map(|e| match_response(e, id)) {
            return Ok(found);
        }
    }
    buffer
        .flush()
        .and_then(|e| match_response(e, id))
        .ok_or_else(|| ToolError::Protocol("event stream ended without a response".to_owned()))
}

/// Requests and notifications the server interleaves are skipped
fn match_response(event: SseEvent, id: u64) -> Option<RpcResponse> {
    let SseEvent::Data(data) = event else {
        return None;
    };
    let response: RpcResponse = serde_json::from_str(&data).ok()?;
    let is_answer = response.result.is_some() || response.error.is_some();
    (is_answer && response.id.as_ref().and_then(Value::as_u64) == Some(id)).then_some(response)
}

fn into_result(response: RpcResponse) -> Result<Value, ToolError> {
    if let Some(error) = response.error {
        return Err(ToolError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    response
        .result
        .ok_or_else(|| ToolError::Protocol("response carries neither result nor error".to_owned()))
}

/// Text blocks of a `CallToolResult`, joined by newlines
fn content_text(result: &Value) -> String {
    let text: Vec<&str> = result["content"]
        .as_array()
        .map(|blocks| blocks.iter().filter_map(|b| b["text"].as_str()).collect())
        .unwrap_or_default();
    if text.is_empty() {
        "tool returned isError without text".to_owned()
    } else {
        text.join("\n")
    }
}

// ABOUTME: Local HTTP servers standing in for tool endpoints during integration tests
// ABOUTME: An api/webhook upstream and a streamable-HTTP MCP server with canned tools
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::sleep;

/// API key the upstream expects in `X-Api-Key`
pub const UPSTREAM_API_KEY: &str = "upstream-key";

/// Token the MCP server expects as `Authorization: Bearer ...`
pub const MCP_TOKEN: &str = "mcp-token";

/// Session id handed out by the MCP server
pub const MCP_SESSION: &str = "session-42";

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_upstream(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// `GET /status` echoes its query, `POST /hook` echoes its body,
/// `GET /slow` never answers in time, `GET /broken` fails
pub fn api_upstream() -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/hook", post(hook))
        .route("/slow", get(slow))
        .route("/broken", get(broken))
}

async fn status(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> Response {
    if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some(UPSTREAM_API_KEY) {
        return (StatusCode::UNAUTHORIZED, "missing api key").into_response();
    }
    Json(json!({ "ok": true, "query": query })).into_response()
}

async fn hook(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({ "received": body }))
}

async fn slow() -> &'static str {
    sleep(Duration::from_secs(5)).await;
    "too late"
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "exploded")
}

/// Counters observed by MCP tests
#[derive(Default)]
pub struct McpServerState {
    /// `DELETE` requests that released the session
    pub closed_sessions: AtomicUsize,
    /// `tools/call` requests served
    pub calls: AtomicUsize,
}

/// Streamable-HTTP MCP server at `/mcp` offering `echo` and `fail`
///
/// `tools/list` answers as an event stream; everything else as JSON.
pub fn mcp_upstream(state: Arc<McpServerState>) -> Router {
    Router::new()
        .route("/mcp", post(mcp_post).delete(mcp_delete))
        .with_state(state)
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some(&format!("Bearer {MCP_TOKEN}"))
}

fn has_session(headers: &HeaderMap) -> bool {
    headers.get("mcp-session-id").and_then(|v| v.to_str().ok()) == Some(MCP_SESSION)
}

async fn mcp_post(
    State(state): State<Arc<McpServerState>>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default();
    if method != "initialize" && !has_session(&headers) {
        return (StatusCode::BAD_REQUEST, "missing session").into_response();
    }

    match method {
        "initialize" => (
            [("mcp-session-id", MCP_SESSION)],
            Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": request["params"]["protocolVersion"],
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "ops-mcp", "version": "0.3.0" }
                }
            })),
        )
            .into_response(),
        "notifications/initialized" => StatusCode::ACCEPTED.into_response(),
        "tools/list" => {
            let progress = json!({ "jsonrpc": "2.0", "method": "notifications/message", "params": {} });
            let answer = json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "tools": [
                    { "name": "echo", "description": "Echo text", "inputSchema": { "type": "object" } },
                    { "name": "fail", "inputSchema": { "type": "object" } }
                ] }
            });
            (
                [("content-type", "text/event-stream")],
                format!("event: message\ndata: {progress}\n\nevent: message\ndata: {answer}\n\n"),
            )
                .into_response()
        }
        "tools/call" => {
            state.calls.fetch_add(1, Ordering::SeqCst);
            let params = &request["params"];
            let body = match params["name"].as_str() {
                Some("echo") => json!({
                    "jsonrpc": "2.0", "id": id,
                    "result": { "content": [{ "type": "text", "text": params["arguments"]["text"] }], "isError": false }
                }),
                Some("fail") => json!({
                    "jsonrpc": "2.0", "id": id,
                    "result": { "content": [{ "type": "text", "text": "boom" }], "isError": true }
                }),
                _ => json!({
                    "jsonrpc": "2.0", "id": id,
                    "error": { "code": -32602, "message": "Unknown tool" }
                }),
            };
            Json(body).into_response()
        }
        _ => Json(json!({
            "jsonrpc": "2.0", "id": id,
            "error": { "code": -32601, "message": "Method not found" }
        }))
        .into_response(),
    }
}

async fn mcp_delete(State(state): State<Arc<McpServerState>>, headers: HeaderMap) -> StatusCode {
    if has_session(&headers) {
        state.closed_sessions.fetch_add(1, Ordering::SeqCst);
    }
    StatusCode::OK
}

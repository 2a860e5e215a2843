// ABOUTME: Integration tests for the tool registry, tool execution and MCP connection routes
// ABOUTME: Runs tools against local fake HTTP and MCP endpoints and checks recorded executions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::http::StatusCode;
use common::{fast_settings, TestApp};
use helpers::axum_test::AxumTestRequest;
use helpers::scripted_provider::ScriptedProvider;
use helpers::tool_upstream::{
    api_upstream, mcp_upstream, spawn_upstream, McpServerState, MCP_TOKEN, UPSTREAM_API_KEY,
};
use orion_server::errors::ErrorCode;
use orion_server::models::SenderType;
use serde_json::{json, Value};

const TOOLS: &str = "/api/v1/tools";
const EXECUTIONS: &str = "/api/v1/tools/executions";

async fn app() -> TestApp {
    TestApp::new(Arc::new(ScriptedProvider::new()), fast_settings()).await
}

fn code(expected: ErrorCode) -> u64 {
    u64::from(expected.as_u32())
}

fn tool_uri(id: &str) -> String {
    format!("{TOOLS}/{id}")
}

fn execute_uri(id: &str) -> String {
    format!("{TOOLS}/{id}/execute")
}

/// Register a tool as `admin_token` and return its id
async fn register(app: &TestApp, admin_token: &str, body: &Value) -> String {
    let response = AxumTestRequest::post(TOOLS)
        .bearer(admin_token)
        .json(body)
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.data()["id"].as_str().unwrap().to_owned()
}

fn status_tool(base: &str) -> Value {
    json!({
        "name": "service-status",
        "displayName": "Service status",
        "toolType": "api",
        "config": { "url": format!("{base}/status"), "method": "GET" },
        "authConfig": { "type": "header", "name": "X-Api-Key", "value": UPSTREAM_API_KEY }
    })
}

async fn execute(app: &TestApp, token: &str, tool_id: &str, input: &Value) -> Value {
    let response = AxumTestRequest::post(&execute_uri(tool_id))
        .bearer(token)
        .json(&json!({ "inputParams": input }))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.data()
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn test_registry_writes_require_admin() {
    let app = app().await;
    let (_, user_token) = app.create_user("tool_user").await;
    let (_, admin_token) = app.create_admin("tool_admin").await;
    let body = status_tool("http://127.0.0.1:9");

    let response = AxumTestRequest::post(TOOLS)
        .bearer(&user_token)
        .json(&body)
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(response.error_code(), code(ErrorCode::AdminRequired));

    let tool_id = register(&app, &admin_token, &body).await;

    let response = AxumTestRequest::put(&tool_uri(&tool_id))
        .bearer(&user_token)
        .json(&json!({ "enabled": false }))
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::AdminRequired));

    let response = AxumTestRequest::delete(&tool_uri(&tool_id))
        .bearer(&user_token)
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::AdminRequired));

    // Any user can read the registry; credentials stay hidden
    let response = AxumTestRequest::get(&tool_uri(&tool_id))
        .bearer(&user_token)
        .send(app.router())
        .await;
    let data = response.data();
    assert_eq!(data["name"], "service-status");
    assert_eq!(data["hasAuth"], true);
    assert!(data.get("authConfig").is_none());

    let response = AxumTestRequest::get(TOOLS).send(app.router()).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_rejects_invalid_tools() {
    let app = app().await;
    let (_, admin_token) = app.create_admin("registry_admin").await;
    register(&app, &admin_token, &status_tool("http://127.0.0.1:9")).await;

    let response = AxumTestRequest::post(TOOLS)
        .bearer(&admin_token)
        .json(&status_tool("http://127.0.0.1:10"))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(response.error_code(), code(ErrorCode::ToolNameTaken));

    let response = AxumTestRequest::post(TOOLS)
        .bearer(&admin_token)
        .json(&json!({
            "name": "shell",
            "displayName": "Shell",
            "toolType": "script",
            "config": { "code": "rm -rf /" }
        }))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), code(ErrorCode::InvalidToolRequest));

    let response = AxumTestRequest::post(TOOLS)
        .bearer(&admin_token)
        .json(&json!({
            "name": "no-method",
            "displayName": "No method",
            "toolType": "api",
            "config": { "url": "http://127.0.0.1:9/status" }
        }))
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::InvalidToolConfig));

    let response = AxumTestRequest::post(TOOLS)
        .bearer(&admin_token)
        .json(&json!({
            "name": "local-mcp",
            "displayName": "Local MCP",
            "toolType": "mcp",
            "config": { "endpoint": "http://127.0.0.1:9/mcp", "protocol": "stdio" }
        }))
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::InvalidToolConfig));

    let response = AxumTestRequest::post(TOOLS)
        .bearer(&admin_token)
        .raw_body("{ not json")
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::InvalidToolRequest));
}

#[tokio::test]
async fn test_list_tools_filters_by_type_and_enabled() {
    let app = app().await;
    let (_, admin_token) = app.create_admin("list_admin").await;
    let (_, user_token) = app.create_user("list_user").await;

    register(&app, &admin_token, &status_tool("http://127.0.0.1:9")).await;
    let hook_id = register(
        &app,
        &admin_token,
        &json!({
            "name": "deploy-hook",
            "displayName": "Deploy hook",
            "toolType": "webhook",
            "config": { "url": "http://127.0.0.1:9/hook" },
            "enabled": false
        }),
    )
    .await;

    let data = AxumTestRequest::get(TOOLS)
        .bearer(&user_token)
        .send(app.router())
        .await
        .data();
    assert_eq!(data["pagination"]["total"], 2);

    let data = AxumTestRequest::get(&format!("{TOOLS}?toolType=webhook"))
        .bearer(&user_token)
        .send(app.router())
        .await
        .data();
    assert_eq!(data["items"].as_array().unwrap().len(), 1);
    assert_eq!(data["items"][0]["id"], hook_id.as_str());

    let data = AxumTestRequest::get(&format!("{TOOLS}?enabled=true"))
        .bearer(&user_token)
        .send(app.router())
        .await
        .data();
    assert_eq!(data["items"].as_array().unwrap().len(), 1);
    assert_eq!(data["items"][0]["name"], "service-status");

    let response = AxumTestRequest::get(&format!("{TOOLS}?toolType=script"))
        .bearer(&user_token)
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_disabled_or_missing_tools_cannot_run() {
    let app = app().await;
    let (_, admin_token) = app.create_admin("toggle_admin").await;
    let (_, user_token) = app.create_user("toggle_user").await;
    let tool_id = register(&app, &admin_token, &status_tool("http://127.0.0.1:9")).await;

    let data = AxumTestRequest::put(&tool_uri(&tool_id))
        .bearer(&admin_token)
        .json(&json!({ "enabled": false, "displayName": "Status (paused)" }))
        .send(app.router())
        .await
        .data();
    assert_eq!(data["enabled"], false);
    assert_eq!(data["displayName"], "Status (paused)");
    assert_eq!(data["toolType"], "api");

    let response = AxumTestRequest::post(&execute_uri(&tool_id))
        .bearer(&user_token)
        .json(&json!({ "inputParams": {} }))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.error_code(), code(ErrorCode::ToolDisabled));

    let response = AxumTestRequest::post(&execute_uri("no-such-tool"))
        .bearer(&user_token)
        .json(&json!({ "inputParams": {} }))
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::ToolDisabled));

    let response = AxumTestRequest::get(&tool_uri("no-such-tool"))
        .bearer(&user_token)
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::ToolNotFound));

    let response = AxumTestRequest::put(&tool_uri("no-such-tool"))
        .bearer(&admin_token)
        .json(&json!({ "enabled": true }))
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::ToolNotFound));
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_api_tool_run_is_recorded() {
    let app = app().await;
    let base = spawn_upstream(api_upstream()).await;
    let (_, admin_token) = app.create_admin("api_admin").await;
    let (user, user_token) = app.create_user("api_user").await;
    let tool_id = register(&app, &admin_token, &status_tool(&base)).await;

    let data = execute(&app, &user_token, &tool_id, &json!({ "host": "db-1", "limit": 5 })).await;
    assert_eq!(data["status"], "success");
    assert_eq!(data["userId"], user.id.as_str());
    assert_eq!(data["outputResult"]["status"], 200);
    assert_eq!(data["outputResult"]["body"]["ok"], true);
    assert_eq!(data["outputResult"]["body"]["query"], json!({ "host": "db-1", "limit": "5" }));
    assert!(data["executionTimeMs"].as_i64().unwrap() >= 0);
    assert!(data["errorMessage"].is_null());
    assert_eq!(data["tool"]["name"], "service-status");
    assert_eq!(data["tool"]["toolType"], "api");

    let response = AxumTestRequest::post(&execute_uri(&tool_id))
        .bearer(&user_token)
        .json(&json!({ "inputParams": ["not", "an", "object"] }))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), code(ErrorCode::InvalidToolExecution));
}

#[tokio::test]
async fn test_webhook_posts_input_as_json() {
    let app = app().await;
    let base = spawn_upstream(api_upstream()).await;
    let (_, admin_token) = app.create_admin("hook_admin").await;
    let tool_id = register(
        &app,
        &admin_token,
        &json!({
            "name": "deploy-hook",
            "displayName": "Deploy hook",
            "toolType": "webhook",
            "config": { "url": format!("{base}/hook"), "headers": "X-Team: infra" }
        }),
    )
    .await;

    let data = execute(&app, &admin_token, &tool_id, &json!({ "service": "api", "version": "1.4.2" })).await;
    assert_eq!(data["status"], "success");
    assert_eq!(
        data["outputResult"]["body"]["received"],
        json!({ "service": "api", "version": "1.4.2" })
    );
}

#[tokio::test]
async fn test_failed_and_timed_out_runs_are_recorded() {
    let app = app().await;
    let base = spawn_upstream(api_upstream()).await;
    let (_, admin_token) = app.create_admin("fail_admin").await;

    let broken = register(
        &app,
        &admin_token,
        &json!({
            "name": "broken",
            "displayName": "Broken",
            "toolType": "api",
            "config": { "url": format!("{base}/broken"), "method": "GET" }
        }),
    )
    .await;
    let data = execute(&app, &admin_token, &broken, &json!({})).await;
    assert_eq!(data["status"], "failed");
    assert!(data["outputResult"].is_null());
    let error = data["errorMessage"].as_str().unwrap();
    assert!(error.contains("500"), "{error}");
    assert!(error.contains("exploded"), "{error}");

    let slow = register(
        &app,
        &admin_token,
        &json!({
            "name": "slow",
            "displayName": "Slow",
            "toolType": "api",
            "config": { "url": format!("{base}/slow"), "method": "GET", "timeoutSecs": 1 }
        }),
    )
    .await;
    let data = execute(&app, &admin_token, &slow, &json!({})).await;
    assert_eq!(data["status"], "timeout");
    assert_eq!(data["errorMessage"], "tool timed out after 1s");
    assert!(data["executionTimeMs"].as_i64().unwrap() >= 1000);

    let unauthorized = register(
        &app,
        &admin_token,
        &json!({
            "name": "status-no-key",
            "displayName": "Status without key",
            "toolType": "api",
            "config": { "url": format!("{base}/status"), "method": "GET" }
        }),
    )
    .await;
    let data = execute(&app, &admin_token, &unauthorized, &json!({})).await;
    assert_eq!(data["status"], "failed");
    assert!(data["errorMessage"].as_str().unwrap().contains("401"));
}

#[tokio::test]
async fn test_delete_disables_tools_with_history() {
    let app = app().await;
    let base = spawn_upstream(api_upstream()).await;
    let (_, admin_token) = app.create_admin("delete_admin").await;

    let used = register(&app, &admin_token, &status_tool(&base)).await;
    execute(&app, &admin_token, &used, &json!({})).await;
    let unused = register(
        &app,
        &admin_token,
        &json!({
            "name": "unused-hook",
            "displayName": "Unused",
            "toolType": "webhook",
            "config": { "url": format!("{base}/hook") }
        }),
    )
    .await;

    let data = AxumTestRequest::delete(&tool_uri(&used))
        .bearer(&admin_token)
        .send(app.router())
        .await
        .data();
    assert_eq!(data, json!({ "id": used.as_str(), "deleted": false, "disabled": true }));
    let data = AxumTestRequest::get(&tool_uri(&used))
        .bearer(&admin_token)
        .send(app.router())
        .await
        .data();
    assert_eq!(data["enabled"], false);

    let data = AxumTestRequest::delete(&tool_uri(&unused))
        .bearer(&admin_token)
        .send(app.router())
        .await
        .data();
    assert_eq!(data["deleted"], true);
    assert_eq!(data["disabled"], false);
    let response = AxumTestRequest::get(&tool_uri(&unused))
        .bearer(&admin_token)
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::ToolNotFound));

    let response = AxumTestRequest::delete(&tool_uri(&unused))
        .bearer(&admin_token)
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::ToolNotFound));
}

#[tokio::test]
async fn test_execution_history_is_scoped_to_caller() {
    let app = app().await;
    let base = spawn_upstream(api_upstream()).await;
    let (_, admin_token) = app.create_admin("history_admin").await;
    let (alice, alice_token) = app.create_user("history_alice").await;
    let (_, bob_token) = app.create_user("history_bob").await;

    let status = register(&app, &admin_token, &status_tool(&base)).await;
    let broken = register(
        &app,
        &admin_token,
        &json!({
            "name": "broken",
            "displayName": "Broken",
            "toolType": "api",
            "config": { "url": format!("{base}/broken"), "method": "GET" }
        }),
    )
    .await;
    execute(&app, &alice_token, &status, &json!({})).await;
    execute(&app, &alice_token, &broken, &json!({})).await;
    execute(&app, &bob_token, &status, &json!({})).await;

    let data = AxumTestRequest::get(EXECUTIONS)
        .bearer(&alice_token)
        .send(app.router())
        .await
        .data();
    assert_eq!(data["pagination"]["total"], 2);
    assert!(data["items"]
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["userId"] == alice.id.as_str()));

    let data = AxumTestRequest::get(&format!("{EXECUTIONS}?status=failed"))
        .bearer(&alice_token)
        .send(app.router())
        .await
        .data();
    assert_eq!(data["items"].as_array().unwrap().len(), 1);
    assert_eq!(data["items"][0]["toolId"], broken.as_str());

    let data = AxumTestRequest::get(EXECUTIONS)
        .bearer(&admin_token)
        .send(app.router())
        .await
        .data();
    assert_eq!(data["pagination"]["total"], 3);

    let data = AxumTestRequest::get(&format!("{EXECUTIONS}?toolId={status}"))
        .bearer(&admin_token)
        .send(app.router())
        .await
        .data();
    assert_eq!(data["pagination"]["total"], 2);

    let response = AxumTestRequest::get(&format!("{EXECUTIONS}?status=exploded"))
        .bearer(&admin_token)
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_execution_links_only_callers_messages() {
    let app = app().await;
    let base = spawn_upstream(api_upstream()).await;
    let (_, admin_token) = app.create_admin("link_admin").await;
    let (alice, alice_token) = app.create_user("link_alice").await;
    let (bob, _) = app.create_user("link_bob").await;
    let tool_id = register(&app, &admin_token, &status_tool(&base)).await;

    let mine = app.create_conversation(&alice.id, "Mine").await;
    let my_message = app.post_message(&mine.id, SenderType::User, "check db-1").await;
    let theirs = app.create_conversation(&bob.id, "Theirs").await;
    let their_message = app.post_message(&theirs.id, SenderType::User, "secret").await;

    let data = AxumTestRequest::post(&execute_uri(&tool_id))
        .bearer(&alice_token)
        .json(&json!({ "inputParams": { "host": "db-1" }, "messageId": my_message.id }))
        .send(app.router())
        .await
        .data();
    assert_eq!(data["messageId"], my_message.id.as_str());

    let response = AxumTestRequest::post(&execute_uri(&tool_id))
        .bearer(&alice_token)
        .json(&json!({ "inputParams": {}, "messageId": their_message.id }))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.error_code(), code(ErrorCode::MessageNotFound));

    let data = AxumTestRequest::get(EXECUTIONS)
        .bearer(&alice_token)
        .send(app.router())
        .await
        .data();
    assert_eq!(data["pagination"]["total"], 1);
}

// ============================================================================
// MCP
// ============================================================================

fn mcp_tool(base: &str, name: &str) -> Value {
    json!({
        "name": name,
        "displayName": format!("MCP {name}"),
        "toolType": "mcp",
        "config": {
            "endpoint": format!("{base}/mcp"),
            "protocol": "http_streamable",
            "authorization": MCP_TOKEN,
            "timeout": 5
        }
    })
}

#[tokio::test]
async fn test_mcp_tool_call_and_connection_test() {
    let app = app().await;
    let state = Arc::new(McpServerState::default());
    let base = spawn_upstream(mcp_upstream(Arc::clone(&state))).await;
    let (_, admin_token) = app.create_admin("mcp_admin").await;
    let (_, user_token) = app.create_user("mcp_user").await;
    let echo = register(&app, &admin_token, &mcp_tool(&base, "echo")).await;

    let data = execute(&app, &user_token, &echo, &json!({ "text": "hello ops" })).await;
    assert_eq!(data["status"], "success");
    assert_eq!(data["outputResult"]["content"][0]["text"], "hello ops");
    assert_eq!(state.calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.closed_sessions.load(Ordering::SeqCst), 1);

    let response = AxumTestRequest::post(&format!("{TOOLS}/{echo}/test"))
        .bearer(&user_token)
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::AdminRequired));

    let data = AxumTestRequest::post(&format!("{TOOLS}/{echo}/test"))
        .bearer(&admin_token)
        .send(app.router())
        .await
        .data();
    assert_eq!(data["toolCount"], 2);
    assert_eq!(data["tools"][0]["name"], "echo");
    assert_eq!(data["tools"][1]["name"], "fail");
    assert_eq!(data["server"]["serverInfo"]["name"], "ops-mcp");
    assert_eq!(state.closed_sessions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_mcp_failures_are_recorded() {
    let app = app().await;
    let state = Arc::new(McpServerState::default());
    let base = spawn_upstream(mcp_upstream(Arc::clone(&state))).await;
    let (_, admin_token) = app.create_admin("mcp_fail_admin").await;

    let fail = register(&app, &admin_token, &mcp_tool(&base, "fail")).await;
    let data = execute(&app, &admin_token, &fail, &json!({})).await;
    assert_eq!(data["status"], "failed");
    assert_eq!(data["errorMessage"], "tool reported an error: boom");

    let unknown = register(&app, &admin_token, &mcp_tool(&base, "missing")).await;
    let data = execute(&app, &admin_token, &unknown, &json!({})).await;
    assert_eq!(data["status"], "failed");
    assert!(data["errorMessage"].as_str().unwrap().contains("-32602"));

    let mut no_token = mcp_tool(&base, "echo");
    no_token["config"]["authorization"] = Value::Null;
    let locked_out = register(&app, &admin_token, &no_token).await;
    let data = execute(&app, &admin_token, &locked_out, &json!({ "text": "x" })).await;
    assert_eq!(data["status"], "failed");
    assert!(data["errorMessage"].as_str().unwrap().contains("401"));

    let response = AxumTestRequest::post(&format!("{TOOLS}/{locked_out}/test"))
        .bearer(&admin_token)
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::ExternalServiceError));
}

#[tokio::test]
async fn test_connection_test_rejects_non_mcp_tools() {
    let app = app().await;
    let (_, admin_token) = app.create_admin("conn_admin").await;
    let tool_id = register(&app, &admin_token, &status_tool("http://127.0.0.1:9")).await;

    let response = AxumTestRequest::post(&format!("{TOOLS}/{tool_id}/test"))
        .bearer(&admin_token)
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), code(ErrorCode::InvalidToolConfig));

    let response = AxumTestRequest::post(&format!("{TOOLS}/no-such-tool/test"))
        .bearer(&admin_token)
        .send(app.router())
        .await;
    assert_eq!(response.error_code(), code(ErrorCode::ToolNotFound));
}

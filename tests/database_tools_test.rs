// ABOUTME: Integration tests for the SQLite tool registry and tool execution store
// ABOUTME: Covers unique names, delete-or-disable, single terminal writes and message ownership
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::create_test_database;
use orion_server::database::{
    Database, ExecutionFilter, ExecutionOutcome, NewMessage, NewTool, ToolFilter, ToolRemoval,
    ToolUpdate,
};
use orion_server::errors::ErrorCode;
use orion_server::models::{
    PageRequest, SenderType, ToolExecutionStatus, ToolType, UserRecord, UserRole,
};
use serde_json::json;

async fn seed_user(database: &Database, username: &str, role: UserRole) -> UserRecord {
    database
        .users()
        .create_user(username, &format!("{username}@example.com"), "hash", role)
        .await
        .unwrap()
}

fn webhook(name: &str, created_by: &str) -> NewTool {
    NewTool {
        name: name.to_owned(),
        display_name: name.to_uppercase(),
        description: String::new(),
        tool_type: ToolType::Webhook,
        config: json!({ "url": "https://hooks.test/deploy" }),
        auth_config: Some(json!({ "type": "bearer", "token": "t" })),
        enabled: true,
        created_by: created_by.to_owned(),
    }
}

fn succeeded(ms: i64) -> ExecutionOutcome {
    ExecutionOutcome {
        status: ToolExecutionStatus::Success,
        output_result: Some(json!({ "status": 200, "body": null })),
        error_message: None,
        execution_time_ms: ms,
    }
}

fn first_page() -> PageRequest {
    PageRequest::new(None, None, 20)
}

#[tokio::test]
async fn test_tool_names_are_unique() {
    let database = create_test_database().await.unwrap();
    let admin = seed_user(&database, "admin", UserRole::Admin).await;
    let tools = database.tools();

    let tool = tools.create_tool(webhook("deploy", &admin.id)).await.unwrap();
    assert_eq!(tool.created_by.as_deref(), Some(admin.id.as_str()));
    assert_eq!(tool.auth_config, Some(json!({ "type": "bearer", "token": "t" })));

    let err = tools.create_tool(webhook("deploy", &admin.id)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ToolNameTaken);
}

#[tokio::test]
async fn test_update_keeps_unset_columns() {
    let database = create_test_database().await.unwrap();
    let admin = seed_user(&database, "admin", UserRole::Admin).await;
    let tools = database.tools();
    let tool = tools.create_tool(webhook("deploy", &admin.id)).await.unwrap();

    let updated = tools
        .update_tool(
            &tool.id,
            &ToolUpdate {
                enabled: Some(false),
                description: Some("Triggers a deploy".to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(!updated.enabled);
    assert_eq!(updated.description, "Triggers a deploy");
    assert_eq!(updated.display_name, "DEPLOY");
    assert_eq!(updated.config, tool.config);
    assert!(updated.auth_config.is_some());

    let listed = tools
        .list_tools(
            ToolFilter {
                tool_type: Some(ToolType::Webhook),
                enabled: Some(true),
            },
            first_page(),
        )
        .await
        .unwrap();
    assert!(listed.items.is_empty());

    assert!(tools
        .update_tool("missing", &ToolUpdate { enabled: Some(true), ..Default::default() })
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_delete_or_disable() {
    let database = create_test_database().await.unwrap();
    let admin = seed_user(&database, "admin", UserRole::Admin).await;
    let tools = database.tools();
    let used = tools.create_tool(webhook("used", &admin.id)).await.unwrap();
    let unused = tools.create_tool(webhook("unused", &admin.id)).await.unwrap();
    tools.create_execution(&used.id, &admin.id, None, &json!({})).await.unwrap();

    assert_eq!(tools.delete_tool(&used.id).await.unwrap(), Some(ToolRemoval::Disabled));
    assert!(!tools.get_tool(&used.id).await.unwrap().unwrap().enabled);

    assert_eq!(tools.delete_tool(&unused.id).await.unwrap(), Some(ToolRemoval::Deleted));
    assert!(tools.get_tool(&unused.id).await.unwrap().is_none());
    assert_eq!(tools.delete_tool(&unused.id).await.unwrap(), None);
}

#[tokio::test]
async fn test_execution_completes_once() {
    let database = create_test_database().await.unwrap();
    let admin = seed_user(&database, "admin", UserRole::Admin).await;
    let tools = database.tools();
    let tool = tools.create_tool(webhook("deploy", &admin.id)).await.unwrap();

    let pending = tools
        .create_execution(&tool.id, &admin.id, None, &json!({ "service": "api" }))
        .await
        .unwrap();
    assert_eq!(pending.status, ToolExecutionStatus::Pending);
    assert!(pending.execution_time_ms.is_none());

    let done = tools.complete_execution(&pending.id, &succeeded(42)).await.unwrap().unwrap();
    assert_eq!(done.status, ToolExecutionStatus::Success);
    assert_eq!(done.execution_time_ms, Some(42));
    assert_eq!(done.input_params, json!({ "service": "api" }));

    let late = ExecutionOutcome {
        status: ToolExecutionStatus::Timeout,
        output_result: None,
        error_message: Some("tool timed out after 1s".to_owned()),
        execution_time_ms: 1000,
    };
    assert!(tools.complete_execution(&pending.id, &late).await.unwrap().is_none());
    let stored = tools.get_execution(&pending.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ToolExecutionStatus::Success);
}

#[tokio::test]
async fn test_execution_filters() {
    let database = create_test_database().await.unwrap();
    let admin = seed_user(&database, "admin", UserRole::Admin).await;
    let alice = seed_user(&database, "alice", UserRole::User).await;
    let tools = database.tools();
    let deploy = tools.create_tool(webhook("deploy", &admin.id)).await.unwrap();
    let notify = tools.create_tool(webhook("notify", &admin.id)).await.unwrap();

    let first = tools.create_execution(&deploy.id, &alice.id, None, &json!({})).await.unwrap();
    tools.complete_execution(&first.id, &succeeded(5)).await.unwrap();
    tools.create_execution(&notify.id, &alice.id, None, &json!({})).await.unwrap();
    tools.create_execution(&deploy.id, &admin.id, None, &json!({})).await.unwrap();

    let mine = ExecutionFilter {
        user_id: Some(alice.id.clone()),
        ..Default::default()
    };
    assert_eq!(tools.list_executions(&mine, first_page()).await.unwrap().pagination.total, 2);

    let pending_deploys = ExecutionFilter {
        tool_id: Some(deploy.id.clone()),
        status: Some(ToolExecutionStatus::Pending),
        ..Default::default()
    };
    let page = tools.list_executions(&pending_deploys, first_page()).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].user_id, admin.id);

    let all = tools
        .list_executions(&ExecutionFilter::default(), first_page())
        .await
        .unwrap();
    assert_eq!(all.pagination.total, 3);
}

#[tokio::test]
async fn test_message_ownership() {
    let database = create_test_database().await.unwrap();
    let alice = seed_user(&database, "alice", UserRole::User).await;
    let bob = seed_user(&database, "bob", UserRole::User).await;
    let chat = database.chat();
    let conversation = chat.create_conversation(&alice.id, "Ops", json!({})).await.unwrap();
    let message = chat
        .create_message(NewMessage {
            conversation_id: conversation.id.clone(),
            sender_type: SenderType::User,
            content: "restart api".to_owned(),
            content_type: None,
            metadata: None,
        })
        .await
        .unwrap();

    let tools = database.tools();
    assert!(tools.message_owned_by(&message.id, &alice.id).await.unwrap());
    assert!(!tools.message_owned_by(&message.id, &bob.id).await.unwrap());
    assert!(!tools.message_owned_by("missing", &alice.id).await.unwrap());

    assert!(chat.delete_conversation(&conversation.id, &alice.id).await.unwrap());
    assert!(!tools.message_owned_by(&message.id, &alice.id).await.unwrap());
}

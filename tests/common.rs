// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides in-memory configuration, app wiring, user and conversation helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `orion_server`

use std::env;
use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use orion_server::auth::TokenType;
use orion_server::chat::OrchestratorSettings;
use orion_server::config::{
    AuthConfig, ChatConfig, CorsConfig, DatabaseConfig, DatabaseUrl, Environment, LlmConfig,
    LogLevel, ServerConfig,
};
use orion_server::constants::DEFAULT_CONVERSATION_TITLE;
use orion_server::database::{Database, NewMessage};
use orion_server::llm::LlmProvider;
use orion_server::models::{ConversationRecord, MessageRecord, SenderType, UserRecord, UserRole};
use orion_server::server::{build_router, ServerResources};
use serde_json::json;
use tracing::Level;
use uuid::Uuid;

static INIT_LOGGER: Once = Once::new();

/// Fixed signing secret for tests
pub const TEST_JWT_SECRET: &str = "orion-test-secret-0123456789-abcdefghijklmnop";

/// Password given to every test user
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Minimum bcrypt cost keeps user fixtures fast
const TEST_BCRYPT_COST: u32 = 4;

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => Level::TRACE,
            Ok("DEBUG") => Level::DEBUG,
            Ok("INFO") => Level::INFO,
            _ => Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Configuration for an in-memory test server
pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_host: "127.0.0.1".to_owned(),
        http_port: 0,
        environment: Environment::Testing,
        log_level: LogLevel::Warn,
        database: DatabaseConfig {
            url: DatabaseUrl::Memory,
            max_connections: 1,
        },
        auth: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_owned(),
            jwt_expiry_hours: 1,
            refresh_expiry_hours: 24,
            issuer: "orion-test".to_owned(),
        },
        llm: LlmConfig {
            base_url: "http://127.0.0.1:9/v1".to_owned(),
            api_key: None,
            model: "scripted".to_owned(),
            temperature: 0.7,
            max_tokens: 256,
            timeout_secs: 5,
            max_retries: 0,
        },
        chat: ChatConfig::default(),
        cors: CorsConfig {
            allowed_origins: vec!["*".to_owned()],
        },
    }
}

/// Streaming settings with short timers
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        heartbeat_interval: Duration::from_secs(5),
        title_deadline: Duration::from_secs(2),
        ..OrchestratorSettings::from(&ChatConfig::default())
    }
}

/// Standard test database setup
pub async fn create_test_database() -> Result<Database> {
    init_test_logging();
    Database::new(&DatabaseUrl::Memory, 1).await
}

/// A wired application over an in-memory store and a test model driver
pub struct TestApp {
    pub resources: Arc<ServerResources>,
    pub router: Router,
}

impl TestApp {
    /// Build resources and router
    pub async fn new(provider: Arc<dyn LlmProvider>, settings: OrchestratorSettings) -> Self {
        let database = create_test_database().await.expect("test database");
        let resources = Arc::new(ServerResources::with_settings(
            database,
            provider,
            test_config(),
            settings,
        ));
        let router = build_router(&resources);
        Self { resources, router }
    }

    /// A fresh router clone for one request
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Create a user and mint an access token
    pub async fn create_user(&self, username: &str) -> (UserRecord, String) {
        create_test_user(&self.resources, username).await
    }

    /// Create an administrator and mint an access token
    pub async fn create_admin(&self, username: &str) -> (UserRecord, String) {
        create_test_user_with_role(&self.resources, username, UserRole::Admin).await
    }

    /// Create a conversation owned by `user_id`
    pub async fn create_conversation(&self, user_id: &str, title: &str) -> ConversationRecord {
        self.resources
            .database
            .chat()
            .create_conversation(user_id, title, json!({}))
            .await
            .expect("create conversation")
    }

    /// Create a conversation still carrying the default title
    pub async fn create_untitled_conversation(&self, user_id: &str) -> ConversationRecord {
        self.create_conversation(user_id, DEFAULT_CONVERSATION_TITLE).await
    }

    /// Post a committed message
    pub async fn post_message(
        &self,
        conversation_id: &str,
        sender_type: SenderType,
        content: &str,
    ) -> MessageRecord {
        self.resources
            .database
            .chat()
            .create_message(NewMessage {
                conversation_id: conversation_id.to_owned(),
                sender_type,
                content: content.to_owned(),
                content_type: None,
                metadata: None,
            })
            .await
            .expect("create message")
    }

    /// Reload a message by id
    pub async fn message(&self, conversation_id: &str, message_id: &str) -> MessageRecord {
        self.resources
            .database
            .chat()
            .get_message(conversation_id, message_id)
            .await
            .expect("get message")
            .expect("message exists")
    }

    /// Reload a conversation by id
    pub async fn conversation(&self, conversation_id: &str, user_id: &str) -> ConversationRecord {
        self.resources
            .database
            .chat()
            .get_conversation(conversation_id, user_id)
            .await
            .expect("get conversation")
            .expect("conversation exists")
    }

    /// Every visible message of a conversation in creation order
    pub async fn history(&self, conversation_id: &str) -> Vec<MessageRecord> {
        self.resources
            .database
            .chat()
            .get_history(conversation_id)
            .await
            .expect("history")
    }
}

/// Insert a user directly and return it with an access token
pub async fn create_test_user(resources: &ServerResources, username: &str) -> (UserRecord, String) {
    create_test_user_with_role(resources, username, UserRole::User).await
}

/// Insert a user with `role` and return it with an access token
pub async fn create_test_user_with_role(
    resources: &ServerResources,
    username: &str,
    role: UserRole,
) -> (UserRecord, String) {
    let password_hash = bcrypt::hash(TEST_PASSWORD, TEST_BCRYPT_COST).expect("hash password");
    let user = resources
        .database
        .users()
        .create_user(
            username,
            &format!("{username}@example.com"),
            &password_hash,
            role,
        )
        .await
        .expect("create user");
    let token = resources
        .auth_manager
        .generate_token(&user, TokenType::Access)
        .expect("generate token");
    (user, token)
}

/// Unique username for tests sharing a process
pub fn unique_username(prefix: &str) -> String {
    format!("{prefix}_{}", &Uuid::new_v4().simple().to_string()[..8])
}

/// Stream endpoint for a conversation
pub fn stream_uri(conversation_id: &str) -> String {
    format!("/api/v1/chat/conversations/{conversation_id}/stream")
}

/// Stream endpoint answering a specific user message
pub fn stream_uri_for(conversation_id: &str, user_message_id: &str) -> String {
    format!("/api/v1/chat/conversations/{conversation_id}/stream?userMessageId={user_message_id}")
}

/// Regenerate endpoint for an assistant message
pub fn regenerate_uri(conversation_id: &str, message_id: &str) -> String {
    format!("/api/v1/chat/conversations/{conversation_id}/messages/{message_id}/regenerate")
}

// ABOUTME: Database connection management and schema migrations
// ABOUTME: SQLite pool setup plus the users, chat and tool registry tables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # Database Management
//!
//! A single `SQLite` pool backs every store operation. The schema is created
//! with idempotent `CREATE TABLE IF NOT EXISTS` statements on start-up.

mod chat;
mod tools;
mod users;

pub use chat::{ChatManager, ConversationUpdate, FinalizeMessage, NewMessage, Placeholder};
pub use tools::{
    ExecutionFilter, ExecutionOutcome, NewTool, ToolFilter, ToolManager, ToolRemoval, ToolUpdate,
};
pub use users::UserManager;

use std::fs;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::config::DatabaseUrl;

/// How long a writer waits on a locked database file
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Current time as a fixed-width RFC 3339 string, so lexical order is chronological
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Database manager owning the connection pool
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened or migrations fail
    pub async fn new(url: &DatabaseUrl, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&url.to_connection_string())
            .context("Invalid database URL")?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        // An in-memory database lives as long as its connection, and a single
        // connection serializes writers.
        let pool_options = if url.is_memory() {
            SqlitePoolOptions::new().max_connections(1).min_connections(1)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };
        let options = if url.is_memory() {
            options
        } else {
            if let DatabaseUrl::SQLite { path } = url {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
            }
            options.journal_mode(SqliteJournalMode::Wal)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.migrate().await?;
        info!(database = %url, "Database ready");
        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Conversation and message store
    #[must_use]
    pub fn chat(&self) -> ChatManager {
        ChatManager::new(self.pool.clone())
    }

    /// User store
    #[must_use]
    pub fn users(&self) -> UserManager {
        UserManager::new(self.pool.clone())
    }

    /// Tool registry and execution store
    #[must_use]
    pub fn tools(&self) -> ToolManager {
        ToolManager::new(self.pool.clone())
    }

    /// Liveness check used by the readiness endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the database does not answer
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails
    pub async fn migrate(&self) -> Result<()> {
        self.migrate_users().await?;
        self.migrate_chat().await?;
        self.migrate_tools().await?;
        Ok(())
    }

    async fn migrate_users(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create users table")?;

        Ok(())
    }

    async fn migrate_chat(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL DEFAULT '',
                context TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'archived', 'deleted')),
                total_messages INTEGER NOT NULL DEFAULT 0,
                last_message_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create conversations table")?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                parent_message_id TEXT REFERENCES messages(id),
                sender_type TEXT NOT NULL CHECK (sender_type IN ('user', 'ai', 'system')),
                content TEXT NOT NULL DEFAULT '',
                content_type TEXT NOT NULL DEFAULT 'text',
                metadata TEXT,
                token_count INTEGER,
                processing_time_ms INTEGER,
                finish_reason TEXT,
                status TEXT NOT NULL
                    CHECK (status IN ('completed', 'streaming', 'partial', 'failed')),
                error_message TEXT,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create messages table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_user_status ON conversations(user_id, status, last_message_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation_created ON messages(conversation_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation_status ON messages(conversation_id, sender_type, status)",
        )
        .execute(&self.pool)
        .await?;

        // At most one in-flight assistant reply per conversation.
        sqlx::query(
            r"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_single_streaming
            ON messages(conversation_id) WHERE sender_type = 'ai' AND status = 'streaming'
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create single-streaming index")?;

        Ok(())
    }

    async fn migrate_tools(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS tools (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                tool_type TEXT NOT NULL CHECK (tool_type IN ('api', 'webhook', 'mcp')),
                config TEXT NOT NULL,
                auth_config TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_by TEXT REFERENCES users(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create tools table")?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS tool_executions (
                id TEXT PRIMARY KEY,
                tool_id TEXT NOT NULL REFERENCES tools(id),
                message_id TEXT REFERENCES messages(id) ON DELETE SET NULL,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                input_params TEXT NOT NULL,
                output_result TEXT,
                execution_time_ms INTEGER,
                status TEXT NOT NULL
                    CHECK (status IN ('pending', 'success', 'failed', 'timeout')),
                error_message TEXT,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create tool_executions table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tools_type_enabled ON tools(tool_type, enabled)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tool_executions_user_created ON tool_executions(user_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tool_executions_tool ON tool_executions(tool_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

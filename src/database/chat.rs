// ABOUTME: Database operations for chat conversations and messages
// ABOUTME: Owner-scoped CRUD plus the conditional writes the streaming pipeline relies on
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::now_timestamp;
use crate::constants::{SUPERSEDED_REASON, TEXT_CONTENT_TYPE};
use crate::errors::{AppError, AppResult};
use crate::models::{
    ConversationRecord, ConversationStatus, MessageRecord, MessageStatus, Page, PageRequest,
    SenderType,
};

const CONVERSATION_COLUMNS: &str = "id, user_id, title, context, status, total_messages, \
     last_message_at, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, parent_message_id, sender_type, content, \
     content_type, metadata, token_count, processing_time_ms, finish_reason, status, \
     error_message, deleted_at, created_at, updated_at";

// ============================================================================
// Input Types
// ============================================================================

/// Partial update of a conversation; `None` leaves the column unchanged
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    /// New title
    pub title: Option<String>,
    /// New client context
    pub context: Option<Value>,
    /// New lifecycle status
    pub status: Option<ConversationStatus>,
}

/// A committed message posted into a conversation
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Target conversation
    pub conversation_id: String,
    /// Author
    pub sender_type: SenderType,
    /// Message body
    pub content: String,
    /// Content type, `text` when absent
    pub content_type: Option<String>,
    /// Client metadata
    pub metadata: Option<Value>,
}

/// Terminal state written onto a streaming placeholder
#[derive(Debug, Clone)]
pub struct FinalizeMessage {
    /// Content actually delivered to the client
    pub content: String,
    /// Terminal status
    pub status: MessageStatus,
    /// Token count reported by the model driver
    pub token_count: Option<i64>,
    /// Wall-clock time since the placeholder was created
    pub processing_time_ms: i64,
    /// Finish reason reported by the model driver
    pub finish_reason: Option<String>,
    /// Error text for partial and failed replies
    pub error_message: Option<String>,
}

/// A freshly inserted streaming placeholder
#[derive(Debug, Clone)]
pub struct Placeholder {
    /// The empty assistant reply in `streaming` state
    pub message: MessageRecord,
    /// In-flight replies demoted to `failed` in the same transaction
    pub superseded: u64,
}

// ============================================================================
// Chat Manager
// ============================================================================

/// Chat database operations manager
#[derive(Clone)]
pub struct ChatManager {
    pool: SqlitePool,
}

impl ChatManager {
    /// Create a new chat manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Conversation Operations
    // ========================================================================

    /// Create a new conversation
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
        context: Value,
    ) -> AppResult<ConversationRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        sqlx::query(
            r"
            INSERT INTO conversations (id, user_id, title, context, status, total_messages, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'active', 0, $5, $5)
            ",
        )
        .bind(&id)
        .bind(user_id)
        .bind(title)
        .bind(context.to_string())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create conversation: {e}")).with_source(e))?;

        Ok(ConversationRecord {
            id,
            user_id: user_id.to_owned(),
            title: title.to_owned(),
            context,
            status: ConversationStatus::Active,
            total_messages: 0,
            last_message_at: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a conversation owned by `user_id`; deleted conversations are absent
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn get_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<Option<ConversationRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE id = $1 AND user_id = $2 AND status != 'deleted'"
        ))
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get conversation: {e}")).with_source(e))?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    /// List a user's conversations with the given status, most recently active first
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn list_conversations(
        &self,
        user_id: &str,
        status: ConversationStatus,
        page: PageRequest,
    ) -> AppResult<Page<ConversationRecord>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conversations WHERE user_id = $1 AND status = $2",
        )
        .bind(user_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to count conversations: {e}")).with_source(e))?;

        let rows = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE user_id = $1 AND status = $2 \
             ORDER BY last_message_at DESC NULLS LAST, created_at DESC \
             LIMIT $3 OFFSET $4"
        ))
        .bind(user_id)
        .bind(status.as_str())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list conversations: {e}")).with_source(e))?;

        let items = rows
            .iter()
            .map(row_to_conversation)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Page::new(items, page, total))
    }

    /// Apply a partial update and return the fresh row, `None` when not found
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn update_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
        update: &ConversationUpdate,
    ) -> AppResult<Option<ConversationRecord>> {
        let result = sqlx::query(
            r"
            UPDATE conversations
            SET title = COALESCE($1, title),
                context = COALESCE($2, context),
                status = COALESCE($3, status),
                updated_at = $4
            WHERE id = $5 AND user_id = $6 AND status != 'deleted'
            ",
        )
        .bind(update.title.as_deref())
        .bind(update.context.as_ref().map(Value::to_string))
        .bind(update.status.map(ConversationStatus::as_str))
        .bind(now_timestamp())
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update conversation: {e}")).with_source(e))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_conversation(conversation_id, user_id).await
    }

    /// Soft delete a conversation by flipping its status to `deleted`
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn delete_conversation(&self, conversation_id: &str, user_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE conversations
            SET status = 'deleted', updated_at = $1
            WHERE id = $2 AND user_id = $3 AND status != 'deleted'
            ",
        )
        .bind(now_timestamp())
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to delete conversation: {e}")).with_source(e))?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    /// Insert a committed message and bump the conversation counter in one transaction
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn create_message(&self, message: NewMessage) -> AppResult<MessageRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let content_type = message
            .content_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| TEXT_CONTENT_TYPE.to_owned());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")).with_source(e))?;

        sqlx::query(
            r"
            INSERT INTO messages (id, conversation_id, sender_type, content, content_type, metadata, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'completed', $7, $7)
            ",
        )
        .bind(&id)
        .bind(&message.conversation_id)
        .bind(message.sender_type.as_str())
        .bind(&message.content)
        .bind(&content_type)
        .bind(message.metadata.as_ref().map(Value::to_string))
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to create message: {e}")).with_source(e))?;

        sqlx::query(
            r"
            UPDATE conversations
            SET total_messages = total_messages + 1, last_message_at = $1, updated_at = $1
            WHERE id = $2
            ",
        )
        .bind(&now)
        .bind(&message.conversation_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to update conversation counters: {e}")).with_source(e))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit message: {e}")).with_source(e))?;

        Ok(MessageRecord {
            id,
            conversation_id: message.conversation_id,
            parent_message_id: None,
            sender_type: message.sender_type,
            content: message.content,
            content_type,
            metadata: message.metadata,
            token_count: None,
            processing_time_ms: None,
            finish_reason: None,
            status: MessageStatus::Completed,
            error_message: None,
            deleted_at: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Page through the non-deleted messages of a conversation in creation order
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn list_messages(
        &self,
        conversation_id: &str,
        page: PageRequest,
    ) -> AppResult<Page<MessageRecord>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = $1 AND deleted_at IS NULL",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to count messages: {e}")).with_source(e))?;

        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at ASC, rowid ASC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(conversation_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list messages: {e}")).with_source(e))?;

        let items = rows
            .iter()
            .map(row_to_message)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Page::new(items, page, total))
    }

    /// Full non-deleted history of a conversation in creation order
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn get_history(&self, conversation_id: &str) -> AppResult<Vec<MessageRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get messages: {e}")).with_source(e))?;

        rows.iter().map(row_to_message).collect()
    }

    /// Get one non-deleted message of a conversation
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn get_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> AppResult<Option<MessageRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE id = $1 AND conversation_id = $2 AND deleted_at IS NULL"
        ))
        .bind(message_id)
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get message: {e}")).with_source(e))?;

        row.as_ref().map(row_to_message).transpose()
    }

    /// Most recently created user message of a conversation
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn latest_user_message(&self, conversation_id: &str) -> AppResult<Option<MessageRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND sender_type = 'user' AND deleted_at IS NULL \
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get latest user message: {e}")).with_source(e))?;

        row.as_ref().map(row_to_message).transpose()
    }

    /// Soft delete a message; in-flight replies cannot be deleted
    ///
    /// Returns `false` when the message does not exist.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a streaming message, or a database error
    pub async fn delete_message(&self, conversation_id: &str, message_id: &str) -> AppResult<bool> {
        let Some(message) = self.get_message(conversation_id, message_id).await? else {
            return Ok(false);
        };
        if message.status == MessageStatus::Streaming {
            return Err(AppError::invalid_input(
                "Cannot delete a message that is still streaming",
            ));
        }

        let now = now_timestamp();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")).with_source(e))?;

        let result = sqlx::query(
            r"
            UPDATE messages SET deleted_at = $1, updated_at = $1
            WHERE id = $2 AND deleted_at IS NULL AND status != 'streaming'
            ",
        )
        .bind(&now)
        .bind(message_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to delete message: {e}")).with_source(e))?;

        // Only completed rows were ever counted.
        if result.rows_affected() > 0 && message.status == MessageStatus::Completed {
            sqlx::query(
                r"
                UPDATE conversations
                SET total_messages = MAX(total_messages - 1, 0), updated_at = $1
                WHERE id = $2
                ",
            )
            .bind(&now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::database(format!("Failed to update conversation counters: {e}")).with_source(e)
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit message delete: {e}")).with_source(e))?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Streaming Lifecycle
    // ========================================================================

    /// Demote every in-flight assistant reply of a conversation to `failed`
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn supersede_streaming(&self, conversation_id: &str) -> AppResult<u64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::database(format!("Failed to acquire connection: {e}")).with_source(e))?;
        supersede_in(&mut conn, conversation_id).await
    }

    /// Supersede in-flight replies and insert an empty `streaming` one atomically
    ///
    /// The supersede `UPDATE` runs first inside the transaction, so it takes
    /// the write lock before anything is read and concurrent callers queue
    /// behind it. The partial unique index on streaming replies backs this up.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn create_placeholder(
        &self,
        conversation_id: &str,
        parent_message_id: &str,
    ) -> AppResult<Placeholder> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")).with_source(e))?;

        let superseded = supersede_in(&mut tx, conversation_id).await?;

        sqlx::query(
            r"
            INSERT INTO messages (id, conversation_id, parent_message_id, sender_type, content, content_type, status, created_at, updated_at)
            VALUES ($1, $2, $3, 'ai', '', $4, 'streaming', $5, $5)
            ",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(parent_message_id)
        .bind(TEXT_CONTENT_TYPE)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to create placeholder message: {e}")).with_source(e))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit placeholder message: {e}")).with_source(e))?;

        Ok(Placeholder {
            message: MessageRecord {
                id,
                conversation_id: conversation_id.to_owned(),
                parent_message_id: Some(parent_message_id.to_owned()),
                sender_type: SenderType::Ai,
                content: String::new(),
                content_type: TEXT_CONTENT_TYPE.to_owned(),
                metadata: None,
                token_count: None,
                processing_time_ms: None,
                finish_reason: None,
                status: MessageStatus::Streaming,
                error_message: None,
                deleted_at: None,
                created_at: now.clone(),
                updated_at: now,
            },
            superseded,
        })
    }

    /// Move a placeholder to its terminal state
    ///
    /// Applies only while the row is still `streaming`; returns `false` when a
    /// newer stream already superseded it.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn finalize_message(
        &self,
        message_id: &str,
        outcome: &FinalizeMessage,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE messages
            SET content = $1, status = $2, token_count = $3, processing_time_ms = $4,
                finish_reason = $5, error_message = $6, updated_at = $7
            WHERE id = $8 AND status = 'streaming'
            ",
        )
        .bind(&outcome.content)
        .bind(outcome.status.as_str())
        .bind(outcome.token_count)
        .bind(outcome.processing_time_ms)
        .bind(outcome.finish_reason.as_deref())
        .bind(outcome.error_message.as_deref())
        .bind(now_timestamp())
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to finalize message: {e}")).with_source(e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Count a completed reply against its conversation
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn record_completion(&self, conversation_id: &str) -> AppResult<()> {
        let now = now_timestamp();
        sqlx::query(
            r"
            UPDATE conversations
            SET total_messages = total_messages + 1, last_message_at = $1, updated_at = $1
            WHERE id = $2
            ",
        )
        .bind(&now)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update conversation counters: {e}")).with_source(e))?;

        Ok(())
    }

    /// Set the title only while it is still empty or the sentinel
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn update_title_if_default(
        &self,
        conversation_id: &str,
        title: &str,
        sentinel: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE conversations
            SET title = $1, updated_at = $2
            WHERE id = $3 AND (TRIM(title) = '' OR title = $4)
            ",
        )
        .bind(title)
        .bind(now_timestamp())
        .bind(conversation_id)
        .bind(sentinel)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update conversation title: {e}")).with_source(e))?;

        Ok(result.rows_affected() > 0)
    }
}

async fn supersede_in(conn: &mut SqliteConnection, conversation_id: &str) -> AppResult<u64> {
    let result = sqlx::query(
        r"
        UPDATE messages
        SET status = 'failed', error_message = $1, updated_at = $2
        WHERE conversation_id = $3 AND sender_type = 'ai' AND status = 'streaming'
        ",
    )
    .bind(SUPERSEDED_REASON)
    .bind(now_timestamp())
    .bind(conversation_id)
    .execute(conn)
    .await
    .map_err(|e| AppError::database(format!("Failed to supersede streaming messages: {e}")).with_source(e))?;

    Ok(result.rows_affected())
}

// ============================================================================
// Row Mapping
// ============================================================================

fn parse_json(raw: &str, column: &str) -> AppResult<Value> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::database(format!("Corrupt JSON in {column}: {e}")).with_source(e))
}

fn row_to_conversation(row: &SqliteRow) -> AppResult<ConversationRecord> {
    let context: String = row.get("context");
    let status: String = row.get("status");
    Ok(ConversationRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        context: parse_json(&context, "conversations.context")?,
        status: status.parse().map_err(AppError::database)?,
        total_messages: row.get("total_messages"),
        last_message_at: row.get("last_message_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_message(row: &SqliteRow) -> AppResult<MessageRecord> {
    let sender: String = row.get("sender_type");
    let status: String = row.get("status");
    let metadata: Option<String> = row.get("metadata");
    Ok(MessageRecord {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        parent_message_id: row.get("parent_message_id"),
        sender_type: sender.parse().map_err(AppError::database)?,
        content: row.get("content"),
        content_type: row.get("content_type"),
        metadata: metadata
            .as_deref()
            .map(|raw| parse_json(raw, "messages.metadata"))
            .transpose()?,
        token_count: row.get("token_count"),
        processing_time_ms: row.get("processing_time_ms"),
        finish_reason: row.get("finish_reason"),
        status: status.parse().map_err(AppError::database)?,
        error_message: row.get("error_message"),
        deleted_at: row.get("deleted_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

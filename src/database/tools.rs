// ABOUTME: Database operations for the tool registry and tool execution records
// ABOUTME: Registry CRUD with disable-instead-of-delete and pending-to-terminal execution writes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Error as SqlxError, Row, SqlitePool};
use uuid::Uuid;

use super::now_timestamp;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{
    Page, PageRequest, ToolExecutionRecord, ToolExecutionStatus, ToolRecord, ToolType,
};

const TOOL_COLUMNS: &str = "id, name, display_name, description, tool_type, config, auth_config, \
     enabled, created_by, created_at, updated_at";

const EXECUTION_COLUMNS: &str = "id, tool_id, message_id, user_id, input_params, output_result, \
     execution_time_ms, status, error_message, created_at";

const EXECUTION_FILTER: &str = "($1 IS NULL OR user_id = $1) AND ($2 IS NULL OR tool_id = $2) \
     AND ($3 IS NULL OR status = $3)";

// ============================================================================
// Input Types
// ============================================================================

/// A tool about to be registered
#[derive(Debug, Clone)]
pub struct NewTool {
    /// Unique machine name
    pub name: String,
    /// UI name
    pub display_name: String,
    /// Description
    pub description: String,
    /// Invocation kind
    pub tool_type: ToolType,
    /// Validated endpoint configuration
    pub config: Value,
    /// Credentials
    pub auth_config: Option<Value>,
    /// Whether the tool can run right away
    pub enabled: bool,
    /// Registering administrator
    pub created_by: String,
}

/// Partial tool update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default)]
pub struct ToolUpdate {
    /// New UI name
    pub display_name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New endpoint configuration
    pub config: Option<Value>,
    /// New credentials
    pub auth_config: Option<Value>,
    /// Enable or disable
    pub enabled: Option<bool>,
}

/// Registry listing filters
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolFilter {
    /// Only tools of this kind
    pub tool_type: Option<ToolType>,
    /// Only enabled or only disabled tools
    pub enabled: Option<bool>,
}

/// Execution listing filters
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    /// Only runs made by this user; `None` lists every user's runs
    pub user_id: Option<String>,
    /// Only runs of this tool
    pub tool_id: Option<String>,
    /// Only runs with this outcome
    pub status: Option<ToolExecutionStatus>,
}

/// Terminal state written onto a pending execution
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// `success`, `failed` or `timeout`
    pub status: ToolExecutionStatus,
    /// Tool answer
    pub output_result: Option<Value>,
    /// Failure text
    pub error_message: Option<String>,
    /// Wall-clock run time
    pub execution_time_ms: i64,
}

/// What happened to a tool on delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolRemoval {
    /// No execution referenced the tool; the row is gone
    Deleted,
    /// Executions reference the tool; it was disabled instead
    Disabled,
}

// ============================================================================
// Tool Manager
// ============================================================================

/// Tool registry database operations manager
#[derive(Clone)]
pub struct ToolManager {
    pool: SqlitePool,
}

impl ToolManager {
    /// Create a new tool manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a tool
    ///
    /// # Errors
    ///
    /// Returns `ToolNameTaken` when the name is in use, or a database error
    pub async fn create_tool(&self, tool: NewTool) -> AppResult<ToolRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        sqlx::query(
            r"
            INSERT INTO tools (id, name, display_name, description, tool_type, config, auth_config, enabled, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            ",
        )
        .bind(&id)
        .bind(&tool.name)
        .bind(&tool.display_name)
        .bind(&tool.description)
        .bind(tool.tool_type.as_str())
        .bind(tool.config.to_string())
        .bind(tool.auth_config.as_ref().map(Value::to_string))
        .bind(tool.enabled)
        .bind(&tool.created_by)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            SqlxError::Database(db) if db.is_unique_violation() => AppError::new(
                ErrorCode::ToolNameTaken,
                format!("Tool name '{}' already exists", tool.name),
            ),
            other => AppError::database(format!("Failed to create tool: {other}")).with_source(other),
        })?;

        Ok(ToolRecord {
            id,
            name: tool.name,
            display_name: tool.display_name,
            description: tool.description,
            tool_type: tool.tool_type,
            config: tool.config,
            auth_config: tool.auth_config,
            enabled: tool.enabled,
            created_by: Some(tool.created_by),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a tool by id, enabled or not
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn get_tool(&self, tool_id: &str) -> AppResult<Option<ToolRecord>> {
        let row = sqlx::query(&format!("SELECT {TOOL_COLUMNS} FROM tools WHERE id = $1"))
            .bind(tool_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get tool: {e}")).with_source(e))?;

        row.as_ref().map(row_to_tool).transpose()
    }

    /// List registered tools, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn list_tools(&self, filter: ToolFilter, page: PageRequest) -> AppResult<Page<ToolRecord>> {
        let tool_type = filter.tool_type.map(ToolType::as_str);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tools WHERE ($1 IS NULL OR tool_type = $1) AND ($2 IS NULL OR enabled = $2)",
        )
        .bind(tool_type)
        .bind(filter.enabled)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to count tools: {e}")).with_source(e))?;

        let rows = sqlx::query(&format!(
            "SELECT {TOOL_COLUMNS} FROM tools \
             WHERE ($1 IS NULL OR tool_type = $1) AND ($2 IS NULL OR enabled = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        ))
        .bind(tool_type)
        .bind(filter.enabled)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list tools: {e}")).with_source(e))?;

        let items = rows.iter().map(row_to_tool).collect::<AppResult<Vec<_>>>()?;
        Ok(Page::new(items, page, total))
    }

    /// Apply a partial update and return the fresh row, `None` when not found
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn update_tool(&self, tool_id: &str, update: &ToolUpdate) -> AppResult<Option<ToolRecord>> {
        let result = sqlx::query(
            r"
            UPDATE tools
            SET display_name = COALESCE($1, display_name),
                description = COALESCE($2, description),
                config = COALESCE($3, config),
                auth_config = COALESCE($4, auth_config),
                enabled = COALESCE($5, enabled),
                updated_at = $6
            WHERE id = $7
            ",
        )
        .bind(update.display_name.as_deref())
        .bind(update.description.as_deref())
        .bind(update.config.as_ref().map(Value::to_string))
        .bind(update.auth_config.as_ref().map(Value::to_string))
        .bind(update.enabled)
        .bind(now_timestamp())
        .bind(tool_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update tool: {e}")).with_source(e))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_tool(tool_id).await
    }

    /// Delete a tool, or disable it when executions still reference it
    ///
    /// Returns `None` when the tool does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn delete_tool(&self, tool_id: &str) -> AppResult<Option<ToolRemoval>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")).with_source(e))?;

        let executions: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tool_executions WHERE tool_id = $1")
                .bind(tool_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to count tool executions: {e}")).with_source(e))?;

        let (removal, result) = if executions > 0 {
            let result = sqlx::query("UPDATE tools SET enabled = 0, updated_at = $1 WHERE id = $2")
                .bind(now_timestamp())
                .bind(tool_id)
                .execute(&mut *tx)
                .await;
            (ToolRemoval::Disabled, result)
        } else {
            let result = sqlx::query("DELETE FROM tools WHERE id = $1")
                .bind(tool_id)
                .execute(&mut *tx)
                .await;
            (ToolRemoval::Deleted, result)
        };
        let result = result
            .map_err(|e| AppError::database(format!("Failed to delete tool: {e}")).with_source(e))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit tool delete: {e}")).with_source(e))?;

        Ok((result.rows_affected() > 0).then_some(removal))
    }

    // ========================================================================
    // Execution Operations
    // ========================================================================

    /// Record a run in `pending` state before the tool is called
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn create_execution(
        &self,
        tool_id: &str,
        user_id: &str,
        message_id: Option<&str>,
        input_params: &Value,
    ) -> AppResult<ToolExecutionRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        sqlx::query(
            r"
            INSERT INTO tool_executions (id, tool_id, message_id, user_id, input_params, status, created_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            ",
        )
        .bind(&id)
        .bind(tool_id)
        .bind(message_id)
        .bind(user_id)
        .bind(input_params.to_string())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create tool execution: {e}")).with_source(e))?;

        Ok(ToolExecutionRecord {
            id,
            tool_id: tool_id.to_owned(),
            message_id: message_id.map(str::to_owned),
            user_id: user_id.to_owned(),
            input_params: input_params.clone(),
            output_result: None,
            execution_time_ms: None,
            status: ToolExecutionStatus::Pending,
            error_message: None,
            created_at: now,
        })
    }

    /// Move a pending run to its terminal state; `None` when it already left `pending`
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn complete_execution(
        &self,
        execution_id: &str,
        outcome: &ExecutionOutcome,
    ) -> AppResult<Option<ToolExecutionRecord>> {
        let result = sqlx::query(
            r"
            UPDATE tool_executions
            SET status = $1, output_result = $2, error_message = $3, execution_time_ms = $4
            WHERE id = $5 AND status = 'pending'
            ",
        )
        .bind(outcome.status.as_str())
        .bind(outcome.output_result.as_ref().map(Value::to_string))
        .bind(outcome.error_message.as_deref())
        .bind(outcome.execution_time_ms)
        .bind(execution_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to complete tool execution: {e}")).with_source(e))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_execution(execution_id).await
    }

    /// Get a run by id
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn get_execution(&self, execution_id: &str) -> AppResult<Option<ToolExecutionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM tool_executions WHERE id = $1"
        ))
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get tool execution: {e}")).with_source(e))?;

        row.as_ref().map(row_to_execution).transpose()
    }

    /// List runs, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn list_executions(
        &self,
        filter: &ExecutionFilter,
        page: PageRequest,
    ) -> AppResult<Page<ToolExecutionRecord>> {
        let status = filter.status.map(ToolExecutionStatus::as_str);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM tool_executions WHERE {EXECUTION_FILTER}"
        ))
            .bind(filter.user_id.as_deref())
            .bind(filter.tool_id.as_deref())
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to count tool executions: {e}")).with_source(e))?;

        let rows = sqlx::query(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM tool_executions WHERE {EXECUTION_FILTER} \
             ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5"
        ))
        .bind(filter.user_id.as_deref())
        .bind(filter.tool_id.as_deref())
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list tool executions: {e}")).with_source(e))?;

        let items = rows.iter().map(row_to_execution).collect::<AppResult<Vec<_>>>()?;
        Ok(Page::new(items, page, total))
    }

    /// Whether `message_id` lives in a live conversation owned by `user_id`
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn message_owned_by(&self, message_id: &str, user_id: &str) -> AppResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r"
            SELECT 1 FROM messages m
            JOIN conversations c ON c.id = m.conversation_id
            WHERE m.id = $1 AND c.user_id = $2 AND c.status != 'deleted' AND m.deleted_at IS NULL
            ",
        )
        .bind(message_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to look up message: {e}")).with_source(e))?;

        Ok(found.is_some())
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

fn parse_json(raw: &str, column: &str) -> AppResult<Value> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::database(format!("Corrupt JSON in {column}: {e}")).with_source(e))
}

fn row_to_tool(row: &SqliteRow) -> AppResult<ToolRecord> {
    let tool_type: String = row.get("tool_type");
    let config: String = row.get("config");
    let auth_config: Option<String> = row.get("auth_config");
    Ok(ToolRecord {
        id: row.get("id"),
        name: row.get("name"),
        display_name: row.get("display_name"),
        description: row.get("description"),
        tool_type: tool_type.parse().map_err(AppError::database)?,
        config: parse_json(&config, "tools.config")?,
        auth_config: auth_config
            .as_deref()
            .map(|raw| parse_json(raw, "tools.auth_config"))
            .transpose()?,
        enabled: row.get("enabled"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_execution(row: &SqliteRow) -> AppResult<ToolExecutionRecord> {
    let input: String = row.get("input_params");
    let output: Option<String> = row.get("output_result");
    let status: String = row.get("status");
    Ok(ToolExecutionRecord {
        id: row.get("id"),
        tool_id: row.get("tool_id"),
        message_id: row.get("message_id"),
        user_id: row.get("user_id"),
        input_params: parse_json(&input, "tool_executions.input_params")?,
        output_result: output
            .as_deref()
            .map(|raw| parse_json(raw, "tool_executions.output_result"))
            .transpose()?,
        execution_time_ms: row.get("execution_time_ms"),
        status: status.parse().map_err(AppError::database)?,
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
    })
}

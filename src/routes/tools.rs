// ABOUTME: Tool registry route handlers: CRUD, execution, execution history and MCP connection tests
// ABOUTME: Every route is authenticated; registry writes and connection tests require the admin role
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! Tool routes
//!
//! Administrators register `api`, `webhook` and `mcp` tools; any
//! authenticated user can list them and run enabled ones. Each run is
//! recorded as a tool execution that starts `pending` and ends `success`,
//! `failed` or `timeout`. Credentials in `authConfig` are never echoed back;
//! responses carry `hasAuth` instead.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::AuthResult;
use crate::constants::pagination::DEFAULT_TOOL_PAGE_SIZE;
use crate::database::{
    ExecutionFilter, ExecutionOutcome, NewTool, ToolFilter, ToolRemoval, ToolUpdate,
};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{
    PageRequest, ToolExecutionRecord, ToolExecutionStatus, ToolRecord, ToolType, UserRole,
};
use crate::routes::{parse_json_body, ApiResponse};
use crate::server::ServerResources;
use crate::tools::{AuthConfig, McpServerInfo, ToolError, ToolSpec};

/// Longest accepted tool name or display name
const MAX_NAME_CHARS: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to register a tool
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateToolRequest {
    /// Unique machine name
    pub name: String,
    /// UI name
    pub display_name: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// `api`, `webhook` or `mcp`
    pub tool_type: String,
    /// Type-specific configuration
    pub config: Value,
    /// Credentials for outgoing calls
    #[serde(default)]
    pub auth_config: Option<Value>,
    /// Defaults to enabled
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Partial tool update; the tool type cannot change
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateToolRequest {
    /// New UI name
    #[serde(default)]
    pub display_name: Option<String>,
    /// New description
    #[serde(default)]
    pub description: Option<String>,
    /// New configuration, validated against the stored type
    #[serde(default)]
    pub config: Option<Value>,
    /// New credentials
    #[serde(default)]
    pub auth_config: Option<Value>,
    /// Enable or disable
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Request to run a tool
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteToolRequest {
    /// Arguments; must be a JSON object
    pub input_params: Value,
    /// Chat message the run belongs to
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Query parameters of the tool listing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsQuery {
    /// 1-based page
    pub page: Option<u32>,
    /// Page size, capped
    pub page_size: Option<u32>,
    /// `api`, `webhook` or `mcp`
    pub tool_type: Option<String>,
    /// `true` or `false`
    pub enabled: Option<String>,
}

/// Query parameters of the execution history
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListExecutionsQuery {
    /// 1-based page
    pub page: Option<u32>,
    /// Page size, capped
    pub page_size: Option<u32>,
    /// Only runs of this tool
    pub tool_id: Option<String>,
    /// `pending`, `success`, `failed` or `timeout`
    pub status: Option<String>,
}

/// Tool as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    /// Tool id
    pub id: String,
    /// Machine name
    pub name: String,
    /// UI name
    pub display_name: String,
    /// Description
    pub description: String,
    /// Invocation kind
    pub tool_type: ToolType,
    /// Endpoint configuration
    pub config: Value,
    /// Whether credentials are stored
    pub has_auth: bool,
    /// Whether the tool can run
    pub enabled: bool,
    /// Registering administrator
    pub created_by: Option<String>,
    /// Creation time
    pub created_at: String,
    /// Last update time
    pub updated_at: String,
}

impl From<ToolRecord> for ToolResponse {
    fn from(record: ToolRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            display_name: record.display_name,
            description: record.description,
            tool_type: record.tool_type,
            config: record.config,
            has_auth: record.auth_config.is_some(),
            enabled: record.enabled,
            created_by: record.created_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Tool identity attached to an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSummary {
    /// Tool id
    pub id: String,
    /// Machine name
    pub name: String,
    /// UI name
    pub display_name: String,
    /// Invocation kind
    pub tool_type: ToolType,
}

/// Tool execution as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionResponse {
    /// Execution id
    pub id: String,
    /// Tool that ran
    pub tool_id: String,
    /// Linked chat message
    pub message_id: Option<String>,
    /// Caller
    pub user_id: String,
    /// Arguments
    pub input_params: Value,
    /// Tool answer
    pub output_result: Option<Value>,
    /// Run time
    pub execution_time_ms: Option<i64>,
    /// Outcome
    pub status: ToolExecutionStatus,
    /// Failure text
    pub error_message: Option<String>,
    /// Start time
    pub created_at: String,
    /// Tool identity, present on execute responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolSummary>,
}

impl From<ToolExecutionRecord> for ToolExecutionResponse {
    fn from(record: ToolExecutionRecord) -> Self {
        Self {
            id: record.id,
            tool_id: record.tool_id,
            message_id: record.message_id,
            user_id: record.user_id,
            input_params: record.input_params,
            output_result: record.output_result,
            execution_time_ms: record.execution_time_ms,
            status: record.status,
            error_message: record.error_message,
            created_at: record.created_at,
            tool: None,
        }
    }
}

/// Result of deleting a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDeleteResponse {
    /// Tool id
    pub id: String,
    /// `true` when the row is gone
    pub deleted: bool,
    /// `true` when executions kept the tool and it was disabled instead
    pub disabled: bool,
}

/// Result of an MCP connection test
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResponse {
    /// Number of tools the server offers
    pub tool_count: usize,
    /// Server handshake and tool list
    #[serde(flatten)]
    pub info: McpServerInfo,
}

// ============================================================================
// Tool Routes
// ============================================================================

/// Tool routes handler
pub struct ToolRoutes;

impl ToolRoutes {
    /// Registry, execution and history routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/v1/tools", get(Self::list_tools).post(Self::create_tool))
            .route("/api/v1/tools/executions", get(Self::list_executions))
            .route(
                "/api/v1/tools/:tool_id",
                get(Self::get_tool)
                    .put(Self::update_tool)
                    .delete(Self::delete_tool),
            )
            .route("/api/v1/tools/:tool_id/execute", post(Self::execute_tool))
            .route("/api/v1/tools/:tool_id/test", post(Self::test_connection))
            .with_state(resources)
    }

    fn authenticate(resources: &ServerResources, headers: &HeaderMap) -> AppResult<AuthResult> {
        resources.auth_middleware.authenticate_request(headers, None)
    }

    fn require_admin(resources: &ServerResources, headers: &HeaderMap) -> AppResult<AuthResult> {
        let auth = Self::authenticate(resources, headers)?;
        if auth.role != UserRole::Admin {
            return Err(AppError::admin_required());
        }
        Ok(auth)
    }

    // ========================================================================
    // Registry Handlers
    // ========================================================================

    async fn list_tools(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        query: Result<Query<ListToolsQuery>, QueryRejection>,
    ) -> AppResult<Response> {
        Self::authenticate(&resources, &headers)?;
        let Query(query) = query.map_err(|e| AppError::invalid_input(e.body_text()))?;

        let tool_type = match query.tool_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<ToolType>().map_err(AppError::invalid_input)?),
        };
        let enabled = match query.enabled.as_deref().map(str::trim) {
            None | Some("") => None,
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(raw) => return Err(AppError::invalid_input(format!("Unsupported enabled filter '{raw}'"))),
        };
        let page = PageRequest::new(query.page, query.page_size, DEFAULT_TOOL_PAGE_SIZE);

        let tools = resources
            .database
            .tools()
            .list_tools(ToolFilter { tool_type, enabled }, page)
            .await?;

        Ok(ApiResponse::ok(tools.map(ToolResponse::from)))
    }

    async fn get_tool(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(tool_id): Path<String>,
    ) -> AppResult<Response> {
        Self::authenticate(&resources, &headers)?;
        let tool = resources
            .database
            .tools()
            .get_tool(&tool_id)
            .await?
            .ok_or_else(AppError::tool_not_found)?;
        Ok(ApiResponse::ok(ToolResponse::from(tool)))
    }

    async fn create_tool(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> AppResult<Response> {
        let auth = Self::require_admin(&resources, &headers)?;
        let request: CreateToolRequest = parse_json_body(&body, ErrorCode::InvalidToolRequest)?;
        let tool = validate_create(request, &auth.user_id)?;

        let tool = resources.database.tools().create_tool(tool).await?;
        info!(tool_id = %tool.id, name = %tool.name, tool_type = %tool.tool_type, user_id = %auth.user_id, "Tool registered");

        Ok(ApiResponse::created(ToolResponse::from(tool)))
    }

    async fn update_tool(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(tool_id): Path<String>,
        body: Bytes,
    ) -> AppResult<Response> {
        let auth = Self::require_admin(&resources, &headers)?;
        let store = resources.database.tools();
        let existing = store.get_tool(&tool_id).await?.ok_or_else(AppError::tool_not_found)?;

        let request: UpdateToolRequest = parse_json_body(&body, ErrorCode::InvalidToolRequest)?;
        let update = validate_update(request, existing.tool_type)?;

        let tool = store
            .update_tool(&tool_id, &update)
            .await?
            .ok_or_else(AppError::tool_not_found)?;
        info!(%tool_id, user_id = %auth.user_id, "Tool updated");

        Ok(ApiResponse::ok(ToolResponse::from(tool)))
    }

    async fn delete_tool(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(tool_id): Path<String>,
    ) -> AppResult<Response> {
        let auth = Self::require_admin(&resources, &headers)?;
        let removal = resources
            .database
            .tools()
            .delete_tool(&tool_id)
            .await?
            .ok_or_else(AppError::tool_not_found)?;
        info!(%tool_id, user_id = %auth.user_id, ?removal, "Tool removed");

        Ok(ApiResponse::ok(ToolDeleteResponse {
            id: tool_id,
            deleted: removal == ToolRemoval::Deleted,
            disabled: removal == ToolRemoval::Disabled,
        }))
    }

    // ========================================================================
    // Execution Handlers
    // ========================================================================

    async fn execute_tool(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(tool_id): Path<String>,
        body: Bytes,
    ) -> AppResult<Response> {
        let auth = Self::authenticate(&resources, &headers)?;
        let request: ExecuteToolRequest = parse_json_body(&body, ErrorCode::InvalidToolExecution)?;
        if !request.input_params.is_object() {
            return Err(AppError::new(
                ErrorCode::InvalidToolExecution,
                "inputParams must be a JSON object",
            ));
        }

        let store = resources.database.tools();
        let tool = store
            .get_tool(&tool_id)
            .await?
            .filter(|tool| tool.enabled)
            .ok_or_else(|| AppError::new(ErrorCode::ToolDisabled, "Tool not found or disabled"))?;

        let message_id = request.message_id.as_deref().map(str::trim).filter(|m| !m.is_empty());
        if let Some(message_id) = message_id {
            if !store.message_owned_by(message_id, &auth.user_id).await? {
                return Err(AppError::new(ErrorCode::MessageNotFound, "Message not found"));
            }
        }

        let execution = store
            .create_execution(&tool.id, &auth.user_id, message_id, &request.input_params)
            .await?;

        let started = Instant::now();
        let result = resources.tool_runner.run(&tool, &request.input_params).await;
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let outcome = outcome_of(result, elapsed_ms);
        match &outcome.error_message {
            None => info!(%tool_id, execution_id = %execution.id, elapsed_ms = outcome.execution_time_ms, "Tool run succeeded"),
            Some(error) => warn!(%tool_id, execution_id = %execution.id, status = %outcome.status, "Tool run failed: {error}"),
        }

        let finished = store
            .complete_execution(&execution.id, &outcome)
            .await?
            .ok_or_else(|| AppError::internal("Tool execution left pending state concurrently"))?;

        let mut response = ToolExecutionResponse::from(finished);
        response.tool = Some(ToolSummary {
            id: tool.id,
            name: tool.name,
            display_name: tool.display_name,
            tool_type: tool.tool_type,
        });
        Ok(ApiResponse::ok(response))
    }

    async fn list_executions(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        query: Result<Query<ListExecutionsQuery>, QueryRejection>,
    ) -> AppResult<Response> {
        let auth = Self::authenticate(&resources, &headers)?;
        let Query(query) = query.map_err(|e| AppError::invalid_input(e.body_text()))?;

        let status = match query.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<ToolExecutionStatus>().map_err(AppError::invalid_input)?),
        };
        let filter = ExecutionFilter {
            user_id: (auth.role != UserRole::Admin).then(|| auth.user_id.clone()),
            tool_id: query.tool_id.filter(|t| !t.trim().is_empty()),
            status,
        };
        let page = PageRequest::new(query.page, query.page_size, DEFAULT_TOOL_PAGE_SIZE);

        let executions = resources.database.tools().list_executions(&filter, page).await?;
        Ok(ApiResponse::ok(executions.map(ToolExecutionResponse::from)))
    }

    async fn test_connection(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(tool_id): Path<String>,
    ) -> AppResult<Response> {
        Self::require_admin(&resources, &headers)?;
        let tool = resources
            .database
            .tools()
            .get_tool(&tool_id)
            .await?
            .ok_or_else(AppError::tool_not_found)?;

        let info = resources
            .tool_runner
            .test_connection(&tool)
            .await
            .map_err(|e| {
                if matches!(e, ToolError::InvalidConfig(_) | ToolError::InvalidAuth(_)) {
                    invalid_config(&e)
                } else {
                    AppError::external_service("mcp", e.to_string()).with_source(e)
                }
            })?;
        info!(%tool_id, tools = info.tools.len(), "MCP connection test passed");

        Ok(ApiResponse::ok(ConnectionTestResponse {
            tool_count: info.tools.len(),
            info,
        }))
    }
}

// ============================================================================
// Validation
// ============================================================================

fn invalid_config(error: &ToolError) -> AppError {
    AppError::new(ErrorCode::InvalidToolConfig, error.to_string())
}

fn checked_name(raw: &str, field: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::new(
            ErrorCode::InvalidToolRequest,
            format!("{field} must be 1 to {MAX_NAME_CHARS} characters"),
        ));
    }
    Ok(name.to_owned())
}

fn validate_create(request: CreateToolRequest, created_by: &str) -> AppResult<NewTool> {
    let name = checked_name(&request.name, "name")?;
    let display_name = checked_name(&request.display_name, "displayName")?;
    let tool_type = request
        .tool_type
        .trim()
        .parse::<ToolType>()
        .map_err(|e| AppError::new(ErrorCode::InvalidToolRequest, e))?;
    ToolSpec::parse(tool_type, &request.config).map_err(|e| invalid_config(&e))?;
    let auth_config = request.auth_config.filter(|v| !v.is_null());
    AuthConfig::parse(auth_config.as_ref()).map_err(|e| invalid_config(&e))?;

    Ok(NewTool {
        name,
        display_name,
        description: request.description.unwrap_or_default(),
        tool_type,
        config: request.config,
        auth_config,
        enabled: request.enabled.unwrap_or(true),
        created_by: created_by.to_owned(),
    })
}

fn validate_update(request: UpdateToolRequest, tool_type: ToolType) -> AppResult<ToolUpdate> {
    if request.display_name.is_none()
        && request.description.is_none()
        && request.config.is_none()
        && request.auth_config.is_none()
        && request.enabled.is_none()
    {
        return Err(AppError::new(ErrorCode::InvalidToolRequest, "Nothing to update"));
    }
    let display_name = request
        .display_name
        .as_deref()
        .map(|raw| checked_name(raw, "displayName"))
        .transpose()?;
    if let Some(config) = &request.config {
        ToolSpec::parse(tool_type, config).map_err(|e| invalid_config(&e))?;
    }
    AuthConfig::parse(request.auth_config.as_ref()).map_err(|e| invalid_config(&e))?;

    Ok(ToolUpdate {
        display_name,
        description: request.description,
        config: request.config,
        auth_config: request.auth_config.filter(|v| !v.is_null()),
        enabled: request.enabled,
    })
}

fn outcome_of(result: Result<Value, ToolError>, execution_time_ms: i64) -> ExecutionOutcome {
    match result {
        Ok(output) => ExecutionOutcome {
            status: ToolExecutionStatus::Success,
            output_result: Some(output),
            error_message: None,
            execution_time_ms,
        },
        Err(error) => ExecutionOutcome {
            status: if error.is_timeout() {
                ToolExecutionStatus::Timeout
            } else {
                ToolExecutionStatus::Failed
            },
            output_result: None,
            error_message: Some(error.to_string()),
            execution_time_ms,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn create_request(tool_type: &str, config: Value) -> CreateToolRequest {
        CreateToolRequest {
            name: " deploy-status ".to_owned(),
            display_name: "Deploy status".to_owned(),
            description: None,
            tool_type: tool_type.to_owned(),
            config,
            auth_config: None,
            enabled: None,
        }
    }

    #[test]
    fn test_create_validation_codes() {
        let tool = validate_create(
            create_request("webhook", json!({"url": "https://hooks.test/deploy"})),
            "admin-1",
        )
        .unwrap();
        assert_eq!(tool.name, "deploy-status");
        assert!(tool.enabled);

        let err = validate_create(create_request("script", json!({})), "admin-1").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidToolRequest);

        let err = validate_create(create_request("api", json!({"url": "https://x.test"})), "admin-1")
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidToolConfig);

        let mut request = create_request("webhook", json!({"url": "https://hooks.test"}));
        request.auth_config = Some(json!({"type": "oauth"}));
        assert_eq!(
            validate_create(request, "admin-1").unwrap_err().code,
            ErrorCode::InvalidToolConfig
        );
    }

    #[test]
    fn test_update_validates_against_stored_type() {
        let empty = UpdateToolRequest::default();
        assert_eq!(
            validate_update(empty, ToolType::Api).unwrap_err().code,
            ErrorCode::InvalidToolRequest
        );

        let switch_to_stdio = UpdateToolRequest {
            config: Some(json!({"endpoint": "http://mcp.test/mcp", "protocol": "stdio"})),
            ..Default::default()
        };
        assert_eq!(
            validate_update(switch_to_stdio, ToolType::Mcp).unwrap_err().code,
            ErrorCode::InvalidToolConfig
        );

        let disable = UpdateToolRequest {
            enabled: Some(false),
            ..Default::default()
        };
        assert_eq!(validate_update(disable, ToolType::Mcp).unwrap().enabled, Some(false));
    }

    #[test]
    fn test_timeout_outcome() {
        let outcome = outcome_of(Err(ToolError::Timeout(Duration::from_secs(2))), 2001);
        assert_eq!(outcome.status, ToolExecutionStatus::Timeout);
        assert_eq!(outcome.error_message.as_deref(), Some("tool timed out after 2s"));

        let outcome = outcome_of(Ok(json!({"status": 200})), 12);
        assert_eq!(outcome.status, ToolExecutionStatus::Success);
        assert!(outcome.error_message.is_none());
    }

    #[test]
    fn test_tool_response_hides_credentials() {
        let record = ToolRecord {
            id: "t".to_owned(),
            name: "n".to_owned(),
            display_name: "N".to_owned(),
            description: String::new(),
            tool_type: ToolType::Webhook,
            config: json!({"url": "https://hooks.test"}),
            auth_config: Some(json!({"type": "bearer", "token": "secret"})),
            enabled: true,
            created_by: None,
            created_at: "2025-01-01T00:00:00Z".to_owned(),
            updated_at: "2025-01-01T00:00:00Z".to_owned(),
        };
        let json = serde_json::to_value(ToolResponse::from(record)).unwrap();
        assert_eq!(json["hasAuth"], true);
        assert!(json.get("authConfig").is_none());
        assert!(!json.to_string().contains("secret"));
    }
}

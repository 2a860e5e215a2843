// ABOUTME: Chat route handlers for conversations, messages and streamed assistant replies
// ABOUTME: REST endpoints under /api/v1/chat plus the SSE stream and regenerate endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! Chat routes
//!
//! Every handler authenticates the caller and scopes reads to conversations
//! the caller owns; deleted conversations are reported as missing. The two
//! streaming handlers run the prepare phase inline so that pre-stream
//! failures become JSON error envelopes, then hand the SSE body back while
//! the orchestrator keeps writing from a spawned task.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, info_span, Instrument};

use crate::auth::AuthResult;
use crate::chat::{ChannelSink, ReplyTarget, SseWriter, StreamRequest};
use crate::constants::pagination::{DEFAULT_CONVERSATION_PAGE_SIZE, DEFAULT_MESSAGE_PAGE_SIZE};
use crate::database::{ConversationUpdate, NewMessage};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{
    ConversationRecord, ConversationStatus, MessageRecord, MessageStatus, Page, PageRequest,
    SenderType,
};
use crate::routes::{parse_json_body, parse_optional_body, ApiResponse};
use crate::server::ServerResources;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create a new conversation
#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    /// Conversation title, sentinel when absent or blank
    #[serde(default)]
    pub title: Option<String>,
    /// Free-form client context
    #[serde(default)]
    pub context: Option<Value>,
}

/// Partial conversation update
#[derive(Debug, Default, Deserialize)]
pub struct UpdateConversationRequest {
    /// New title
    #[serde(default)]
    pub title: Option<String>,
    /// New client context
    #[serde(default)]
    pub context: Option<Value>,
    /// `active` or `archived`
    #[serde(default)]
    pub status: Option<String>,
}

/// Request to post a user message
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Message body
    pub content: String,
    /// Content type, `text` when absent
    #[serde(default)]
    pub content_type: Option<String>,
    /// Client metadata
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Query parameters of the conversation listing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConversationsQuery {
    /// 1-based page
    pub page: Option<u32>,
    /// Page size, capped
    pub page_size: Option<u32>,
    /// `active` (default) or `archived`
    pub status: Option<String>,
}

/// Query parameters of the message listing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesQuery {
    /// 1-based page
    pub page: Option<u32>,
    /// Page size, capped
    pub page_size: Option<u32>,
}

/// Query parameters of the streaming endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    /// User turn to answer, latest when absent
    pub user_message_id: Option<String>,
    /// Access token for clients that cannot set headers
    pub token: Option<String>,
}

/// Conversation as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    /// Conversation id
    pub id: String,
    /// Owner
    pub user_id: String,
    /// Title
    pub title: String,
    /// Client context
    pub context: Value,
    /// Lifecycle status
    pub status: ConversationStatus,
    /// Committed message count
    pub total_messages: i64,
    /// Last committed message time
    pub last_message_at: Option<String>,
    /// Creation time
    pub created_at: String,
    /// Last update time
    pub updated_at: String,
}

impl From<ConversationRecord> for ConversationResponse {
    fn from(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            title: record.title,
            context: record.context,
            status: record.status,
            total_messages: record.total_messages,
            last_message_at: record.last_message_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Message as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    /// Message id
    pub id: String,
    /// Owning conversation
    pub conversation_id: String,
    /// User turn an assistant reply answers
    pub parent_message_id: Option<String>,
    /// `user`, `ai` or `system`
    pub sender_type: SenderType,
    /// Body
    pub content: String,
    /// Content type
    pub content_type: String,
    /// Client metadata
    pub metadata: Option<Value>,
    /// Completion tokens of an assistant reply
    pub token_count: Option<i64>,
    /// Generation time of an assistant reply
    pub processing_time_ms: Option<i64>,
    /// Finish reason of an assistant reply
    pub finish_reason: Option<String>,
    /// Lifecycle status
    pub status: MessageStatus,
    /// Failure or cancel reason
    pub error_message: Option<String>,
    /// Creation time
    pub created_at: String,
    /// Last update time
    pub updated_at: String,
}

impl From<MessageRecord> for MessageResponse {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            conversation_id: record.conversation_id,
            parent_message_id: record.parent_message_id,
            sender_type: record.sender_type,
            content: record.content,
            content_type: record.content_type,
            metadata: record.metadata,
            token_count: record.token_count,
            processing_time_ms: record.processing_time_ms,
            finish_reason: record.finish_reason,
            status: record.status,
            error_message: record.error_message,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

// ============================================================================
// Chat Routes
// ============================================================================

/// Chat routes handler
pub struct ChatRoutes;

impl ChatRoutes {
    /// Conversation and message management routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/api/v1/chat/conversations",
                post(Self::create_conversation).get(Self::list_conversations),
            )
            .route(
                "/api/v1/chat/conversations/:conversation_id",
                get(Self::get_conversation)
                    .put(Self::update_conversation)
                    .delete(Self::delete_conversation),
            )
            .route(
                "/api/v1/chat/conversations/:conversation_id/messages",
                get(Self::list_messages).post(Self::send_message),
            )
            .route(
                "/api/v1/chat/conversations/:conversation_id/messages/:message_id",
                get(Self::get_message).delete(Self::delete_message),
            )
            .with_state(resources)
    }

    /// Long-lived SSE routes; these must never sit behind a request timeout
    pub fn stream_routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/api/v1/chat/conversations/:conversation_id/stream",
                get(Self::stream_reply),
            )
            .route(
                "/api/v1/chat/conversations/:conversation_id/messages/:message_id/regenerate",
                post(Self::regenerate_reply),
            )
            .with_state(resources)
    }

    fn authenticate(
        resources: &ServerResources,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> AppResult<AuthResult> {
        resources
            .auth_middleware
            .authenticate_request(headers, query_token)
    }

    async fn owned_conversation(
        resources: &ServerResources,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<ConversationRecord> {
        resources
            .database
            .chat()
            .get_conversation(conversation_id, user_id)
            .await?
            .ok_or_else(AppError::conversation_not_found)
    }

    // ========================================================================
    // Conversation Handlers
    // ========================================================================

    async fn create_conversation(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> AppResult<Response> {
        let auth = Self::authenticate(&resources, &headers, None)?;
        let request: CreateConversationRequest =
            parse_optional_body(&body, ErrorCode::InvalidConversationRequest)?;

        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&resources.config.chat.default_conversation_title)
            .to_owned();
        let context = match request.context {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(context @ Value::Object(_)) => context,
            Some(_) => {
                return Err(AppError::new(
                    ErrorCode::InvalidConversationRequest,
                    "context must be a JSON object",
                ))
            }
        };

        let conversation = resources
            .database
            .chat()
            .create_conversation(&auth.user_id, &title, context)
            .await?;
        info!(conversation_id = %conversation.id, user_id = %auth.user_id, "Conversation created");

        Ok(ApiResponse::created(ConversationResponse::from(conversation)))
    }

    async fn list_conversations(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        query: Result<Query<ListConversationsQuery>, QueryRejection>,
    ) -> AppResult<Response> {
        let auth = Self::authenticate(&resources, &headers, None)?;
        let Query(query) = query.map_err(|e| AppError::invalid_input(e.body_text()))?;

        let status = match query.status.as_deref().map(str::trim) {
            None | Some("") => ConversationStatus::Active,
            Some(raw) => match raw.parse::<ConversationStatus>() {
                Ok(status @ (ConversationStatus::Active | ConversationStatus::Archived)) => status,
                _ => return Err(AppError::invalid_input(format!("Unsupported status filter '{raw}'"))),
            },
        };
        let page = PageRequest::new(query.page, query.page_size, DEFAULT_CONVERSATION_PAGE_SIZE);

        let conversations = resources
            .database
            .chat()
            .list_conversations(&auth.user_id, status, page)
            .await?;

        Ok(ApiResponse::ok(conversations.map(ConversationResponse::from)))
    }

    async fn get_conversation(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(conversation_id): Path<String>,
    ) -> AppResult<Response> {
        let auth = Self::authenticate(&resources, &headers, None)?;
        let conversation = Self::owned_conversation(&resources, &conversation_id, &auth.user_id).await?;
        Ok(ApiResponse::ok(ConversationResponse::from(conversation)))
    }

    async fn update_conversation(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(conversation_id): Path<String>,
        body: Bytes,
    ) -> AppResult<Response> {
        let auth = Self::authenticate(&resources, &headers, None)?;
        let request: UpdateConversationRequest =
            parse_json_body(&body, ErrorCode::InvalidConversationUpdate)?;
        let update = validate_update(request)?;

        let conversation = resources
            .database
            .chat()
            .update_conversation(&conversation_id, &auth.user_id, &update)
            .await?
            .ok_or_else(AppError::conversation_not_found)?;

        Ok(ApiResponse::ok(ConversationResponse::from(conversation)))
    }

    async fn delete_conversation(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(conversation_id): Path<String>,
    ) -> AppResult<Response> {
        let auth = Self::authenticate(&resources, &headers, None)?;
        let deleted = resources
            .database
            .chat()
            .delete_conversation(&conversation_id, &auth.user_id)
            .await?;
        if !deleted {
            return Err(AppError::conversation_not_found());
        }
        info!(%conversation_id, user_id = %auth.user_id, "Conversation deleted");
        Ok(StatusCode::NO_CONTENT.into_response())
    }

    // ========================================================================
    // Message Handlers
    // ========================================================================

    async fn list_messages(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(conversation_id): Path<String>,
        query: Result<Query<ListMessagesQuery>, QueryRejection>,
    ) -> AppResult<Response> {
        let auth = Self::authenticate(&resources, &headers, None)?;
        let Query(query) = query.map_err(|e| AppError::invalid_input(e.body_text()))?;
        Self::owned_conversation(&resources, &conversation_id, &auth.user_id).await?;

        let page = PageRequest::new(query.page, query.page_size, DEFAULT_MESSAGE_PAGE_SIZE);
        let messages: Page<MessageRecord> = resources
            .database
            .chat()
            .list_messages(&conversation_id, page)
            .await?;

        Ok(ApiResponse::ok(messages.map(MessageResponse::from)))
    }

    async fn send_message(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(conversation_id): Path<String>,
        body: Bytes,
    ) -> AppResult<Response> {
        let auth = Self::authenticate(&resources, &headers, None)?;
        let request: SendMessageRequest = parse_json_body(&body, ErrorCode::InvalidMessageRequest)?;
        if request.content.trim().is_empty() {
            return Err(AppError::new(
                ErrorCode::InvalidMessageRequest,
                "Message content must not be empty",
            ));
        }
        Self::owned_conversation(&resources, &conversation_id, &auth.user_id).await?;

        let message = resources
            .database
            .chat()
            .create_message(NewMessage {
                conversation_id,
                sender_type: SenderType::User,
                content: request.content,
                content_type: request.content_type.filter(|t| !t.trim().is_empty()),
                metadata: request.metadata,
            })
            .await?;

        Ok(ApiResponse::created(MessageResponse::from(message)))
    }

    async fn get_message(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path((conversation_id, message_id)): Path<(String, String)>,
    ) -> AppResult<Response> {
        let auth = Self::authenticate(&resources, &headers, None)?;
        Self::owned_conversation(&resources, &conversation_id, &auth.user_id).await?;

        let message = resources
            .database
            .chat()
            .get_message(&conversation_id, &message_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::MessageNotFound, "Message not found"))?;

        Ok(ApiResponse::ok(MessageResponse::from(message)))
    }

    async fn delete_message(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path((conversation_id, message_id)): Path<(String, String)>,
    ) -> AppResult<Response> {
        let auth = Self::authenticate(&resources, &headers, None)?;
        Self::owned_conversation(&resources, &conversation_id, &auth.user_id).await?;

        let deleted = resources
            .database
            .chat()
            .delete_message(&conversation_id, &message_id)
            .await?;
        if !deleted {
            return Err(AppError::new(ErrorCode::MessageNotFound, "Message not found"));
        }
        Ok(StatusCode::NO_CONTENT.into_response())
    }

    // ========================================================================
    // Streaming Handlers
    // ========================================================================

    async fn stream_reply(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(conversation_id): Path<String>,
        query: Result<Query<StreamQuery>, QueryRejection>,
    ) -> AppResult<Response> {
        let Query(query) = query.map_err(|e| AppError::invalid_input(e.body_text()))?;
        let auth = Self::authenticate(&resources, &headers, query.token.as_deref())?;

        let target = match query.user_message_id.as_deref().map(str::trim) {
            None | Some("") => ReplyTarget::LatestUserMessage,
            Some(id) => ReplyTarget::UserMessage(id.to_owned()),
        };
        Self::start_stream(
            resources,
            StreamRequest {
                user_id: auth.user_id,
                conversation_id,
                target,
            },
        )
        .await
    }

    async fn regenerate_reply(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path((conversation_id, message_id)): Path<(String, String)>,
        query: Result<Query<StreamQuery>, QueryRejection>,
    ) -> AppResult<Response> {
        let Query(query) = query.map_err(|e| AppError::invalid_input(e.body_text()))?;
        let auth = Self::authenticate(&resources, &headers, query.token.as_deref())?;

        Self::start_stream(
            resources,
            StreamRequest {
                user_id: auth.user_id,
                conversation_id,
                target: ReplyTarget::Regenerate(message_id),
            },
        )
        .await
    }

    async fn start_stream(
        resources: Arc<ServerResources>,
        request: StreamRequest,
    ) -> AppResult<Response> {
        let conversation_id = request.conversation_id.clone();
        let (sink, response) = ChannelSink::response();
        let prepared = resources
            .orchestrator
            .prepare(request, SseWriter::new(sink))
            .await?;

        let span = info_span!(
            "chat_stream",
            conversation_id = %conversation_id,
            message_id = %prepared.message_id()
        );
        let orchestrator = resources.orchestrator.clone();
        tokio::spawn(
            async move {
                orchestrator.run(prepared).await;
            }
            .instrument(span),
        );

        Ok(response)
    }
}

fn validate_update(request: UpdateConversationRequest) -> AppResult<ConversationUpdate> {
    let invalid = |message: &str| AppError::new(ErrorCode::InvalidConversationUpdate, message);

    if request.title.is_none() && request.context.is_none() && request.status.is_none() {
        return Err(invalid("Nothing to update"));
    }
    let title = match request.title.as_deref().map(str::trim) {
        Some("") => return Err(invalid("title must not be empty")),
        other => other.map(str::to_owned),
    };
    if request.context.as_ref().is_some_and(|c| !c.is_object()) {
        return Err(invalid("context must be a JSON object"));
    }
    let status = match request.status.as_deref().map(str::trim) {
        None => None,
        Some(raw) => match raw.parse::<ConversationStatus>() {
            Ok(status @ (ConversationStatus::Active | ConversationStatus::Archived)) => Some(status),
            _ => return Err(invalid("status must be 'active' or 'archived'")),
        },
    };

    Ok(ConversationUpdate {
        title,
        context: request.context,
        status,
    })
}

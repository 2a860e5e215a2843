// ABOUTME: User authentication route handlers for registration, login, refresh, logout and profile
// ABOUTME: Issues HS256 access/refresh token pairs over bcrypt-checked credentials
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! Authentication routes
//!
//! Minimal account issuance so the chat API can be exercised end to end.
//! Password hashing runs on the blocking pool. Tokens are stateless, so
//! logout only acknowledges the caller; clients discard their tokens.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::task;

use crate::auth::{hash_password, verify_password, TokenPair, TokenType};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::logging::AppLogger;
use crate::models::{UserRecord, UserRole};
use crate::routes::ApiResponse;
use crate::server::ServerResources;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 64;

/// User registration request
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    /// Login name
    pub username: String,
    /// Contact email
    pub email: String,
    /// Plain-text password
    pub password: String,
}

/// User login request
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Login name
    pub username: String,
    /// Plain-text password
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// Refresh token from a previous login
    pub refresh_token: String,
}

/// Public view of a user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    /// User id
    pub id: String,
    /// Login name
    pub username: String,
    /// Contact email
    pub email: String,
    /// Role
    pub role: UserRole,
    /// Creation time
    pub created_at: String,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// Login and refresh response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Authenticated user
    pub user: UserResponse,
    /// Issued tokens
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Logout acknowledgement
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    /// User that logged out
    pub user_id: String,
    /// Always `true`
    pub logged_out: bool,
}

/// Authentication routes handler
pub struct AuthRoutes;

impl AuthRoutes {
    /// Create all authentication routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/v1/auth/register", post(Self::register))
            .route("/api/v1/auth/login", post(Self::login))
            .route("/api/v1/auth/refresh", post(Self::refresh))
            .route("/api/v1/auth/logout", post(Self::logout))
            .route("/api/v1/auth/profile", get(Self::profile))
            .with_state(resources)
    }

    fn validate_registration(request: &RegisterRequest) -> AppResult<()> {
        let username = request.username.trim();
        if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
            return Err(AppError::invalid_input(format!(
                "Username must be between 1 and {MAX_USERNAME_LEN} characters"
            )));
        }
        if username.chars().any(char::is_whitespace) {
            return Err(AppError::invalid_input("Username must not contain whitespace"));
        }
        let email = request.email.trim();
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed {
            return Err(AppError::invalid_input("Invalid email address"));
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::invalid_input(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }

    async fn register(
        State(resources): State<Arc<ServerResources>>,
        body: Result<Json<RegisterRequest>, JsonRejection>,
    ) -> AppResult<Response> {
        let Json(request) = body.map_err(|e| AppError::invalid_input(e.body_text()))?;
        Self::validate_registration(&request)?;

        let password = request.password;
        let password_hash = task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::internal(format!("Password hashing task failed: {e}")))??;

        let user = resources
            .database
            .users()
            .create_user(
                request.username.trim(),
                request.email.trim(),
                &password_hash,
                UserRole::User,
            )
            .await?;
        AppLogger::log_auth_event(&user.id, "register", true, None);

        Ok(ApiResponse::created(UserResponse::from(user)))
    }

    async fn login(
        State(resources): State<Arc<ServerResources>>,
        body: Result<Json<LoginRequest>, JsonRejection>,
    ) -> AppResult<Response> {
        let Json(request) = body.map_err(|e| AppError::invalid_input(e.body_text()))?;
        let invalid = || AppError::new(ErrorCode::InvalidCredentials, "Invalid username or password");

        let Some(user) = resources
            .database
            .users()
            .get_user_by_username(request.username.trim())
            .await?
        else {
            AppLogger::log_auth_event(request.username.trim(), "login", false, Some("unknown user"));
            return Err(invalid());
        };

        let password = request.password;
        let hash = user.password_hash.clone();
        let verified = task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::internal(format!("Password check task failed: {e}")))?;
        if !verified {
            AppLogger::log_auth_event(&user.id, "login", false, Some("bad password"));
            return Err(invalid());
        }

        let tokens = resources.auth_manager.generate_token_pair(&user)?;
        AppLogger::log_auth_event(&user.id, "login", true, None);
        Ok(ApiResponse::ok(AuthResponse {
            user: user.into(),
            tokens,
        }))
    }

    async fn refresh(
        State(resources): State<Arc<ServerResources>>,
        body: Result<Json<RefreshRequest>, JsonRejection>,
    ) -> AppResult<Response> {
        let Json(request) = body.map_err(|e| AppError::invalid_input(e.body_text()))?;
        let claims = resources
            .auth_manager
            .validate_token(request.refresh_token.trim(), TokenType::Refresh)?;

        let user = resources
            .database
            .users()
            .get_user(&claims.sub)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "User not found"))?;

        let tokens = resources.auth_manager.generate_token_pair(&user)?;
        AppLogger::log_auth_event(&user.id, "refresh", true, None);
        Ok(ApiResponse::ok(AuthResponse {
            user: user.into(),
            tokens,
        }))
    }

    async fn logout(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        let auth = resources.auth_middleware.authenticate_request(&headers, None)?;
        AppLogger::log_auth_event(&auth.user_id, "logout", true, None);
        Ok(ApiResponse::ok(LogoutResponse {
            user_id: auth.user_id,
            logged_out: true,
        }))
    }

    async fn profile(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        let auth = resources.auth_middleware.authenticate_request(&headers, None)?;
        let user = resources
            .database
            .users()
            .get_user(&auth.user_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "User not found"))?;
        Ok(ApiResponse::ok(UserResponse::from(user)))
    }
}

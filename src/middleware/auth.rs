// ABOUTME: Request authentication for the HTTP API
// ABOUTME: Resolves the caller from a bearer header or, for SSE clients, a token query parameter
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::HeaderMap;
use tracing::{debug, Span};

use crate::auth::{AuthManager, AuthResult};
use crate::errors::{AppError, AppResult};

const BEARER_PREFIX: &str = "bearer ";

/// Middleware resolving access tokens into authenticated callers
#[derive(Clone)]
pub struct AuthMiddleware {
    auth_manager: Arc<AuthManager>,
}

impl AuthMiddleware {
    /// Create auth middleware over a shared token manager
    #[must_use]
    pub const fn new(auth_manager: Arc<AuthManager>) -> Self {
        Self { auth_manager }
    }

    /// Authenticate a request from its headers, falling back to a query token
    ///
    /// `EventSource` clients cannot set headers, so the stream routes pass the
    /// `token` query parameter as `query_token`.
    ///
    /// # Errors
    ///
    /// - `AuthRequired` when neither source carries a token
    /// - `AuthInvalid`, `AuthExpired` or `PermissionDenied` when validation fails
    #[tracing::instrument(skip_all, fields(auth_source = tracing::field::Empty, user_id = tracing::field::Empty))]
    pub fn authenticate_request(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> AppResult<AuthResult> {
        let (token, source) = if let Some(token) = bearer_token(headers) {
            (token, "header")
        } else if let Some(token) = query_token.map(str::trim).filter(|t| !t.is_empty()) {
            (token, "query")
        } else {
            return Err(AppError::auth_required());
        };
        Span::current().record("auth_source", source);

        let auth = self.auth_manager.authenticate(token)?;
        Span::current().record("user_id", auth.user_id.as_str());
        debug!("Request authenticated");
        Ok(auth)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let prefix = value.get(..BEARER_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    let token = value[BEARER_PREFIX.len()..].trim();
    (!token.is_empty()).then_some(token)
}

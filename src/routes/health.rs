// ABOUTME: Health check route handlers for service monitoring
// ABOUTME: Liveness reports the service identity, readiness pings the store, llm checks the model driver
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! Health check routes for load balancers and orchestration probes

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::constants::{SERVICE_NAME, SERVICE_VERSION};
use crate::llm::LlmCapabilities;
use crate::server::ServerResources;

/// Model driver status reported by `/health/llm`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmHealth {
    /// `healthy` or `unavailable`
    pub status: &'static str,
    /// Provider identifier
    pub provider: &'static str,
    /// Model used when a request names none
    pub default_model: String,
    /// Advertised capability set
    pub capabilities: LlmCapabilities,
    /// Whether chat streams can be served
    pub streaming: bool,
    /// Outcome of the upstream health check
    pub reachable: bool,
    /// Health check error text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create all health check routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/health", get(Self::health))
            .route("/ready", get(Self::ready))
            .route("/health/llm", get(Self::llm))
            .with_state(resources)
    }

    async fn health() -> Json<serde_json::Value> {
        Json(json!({
            "status": "healthy",
            "service": SERVICE_NAME,
            "version": SERVICE_VERSION,
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }

    async fn ready(State(resources): State<Arc<ServerResources>>) -> Response {
        match resources.database.ping().await {
            Ok(()) => Json(json!({
                "status": "ready",
                "service": SERVICE_NAME,
                "version": SERVICE_VERSION,
                "timestamp": Utc::now().to_rfc3339(),
            }))
            .into_response(),
            Err(e) => {
                warn!(error = %e, "Readiness check failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "status": "unavailable",
                        "service": SERVICE_NAME,
                        "timestamp": Utc::now().to_rfc3339(),
                    })),
                )
                    .into_response()
            }
        }
    }

    async fn llm(State(resources): State<Arc<ServerResources>>) -> Response {
        let provider = &resources.provider;
        let capabilities = provider.capabilities();
        let (reachable, error) = match provider.health_check().await {
            Ok(reachable) => (reachable, None),
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "Model driver health check failed");
                (false, Some(e.message))
            }
        };
        let healthy = reachable && capabilities.supports_streaming();
        let report = LlmHealth {
            status: if healthy { "healthy" } else { "unavailable" },
            provider: provider.name(),
            default_model: provider.default_model().to_owned(),
            capabilities,
            streaming: capabilities.supports_streaming(),
            reachable,
            error,
        };
        let status = if healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, Json(report)).into_response()
    }
}

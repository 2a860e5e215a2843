// ABOUTME: HTTP server assembly with shared resources, middleware layers and graceful shutdown
// ABOUTME: Streaming routes are mounted outside the request timeout so long replies survive
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # Server
//!
//! [`ServerResources`] is built once at start-up and shared by every handler
//! through `Arc`. The router applies request ids, HTTP tracing and CORS to
//! every route; the optional write timeout only wraps the non-streaming
//! routes. On SIGINT/SIGTERM the shared [`ShutdownSignal`] fires so live
//! streams settle as `partial` and release their connections.

use std::future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{self, SignalKind};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::AuthManager;
use crate::chat::{OrchestratorSettings, StreamOrchestrator};
use crate::config::ServerConfig;
use crate::database::Database;
use crate::lifecycle::ShutdownSignal;
use crate::llm::LlmProvider;
use crate::middleware::{setup_cors, AuthMiddleware};
use crate::routes::{AuthRoutes, ChatRoutes, HealthRoutes, ToolRoutes};
use crate::tools::ToolRunner;

/// Shared state handed to every route group
pub struct ServerResources {
    /// Persistent store
    pub database: Database,
    /// Token issuance and validation
    pub auth_manager: Arc<AuthManager>,
    /// Request authentication
    pub auth_middleware: AuthMiddleware,
    /// Model driver shared with the orchestrator
    pub provider: Arc<dyn LlmProvider>,
    /// Streaming reply driver
    pub orchestrator: StreamOrchestrator,
    /// Executor for registered tools
    pub tool_runner: ToolRunner,
    /// Loaded configuration
    pub config: Arc<ServerConfig>,
    /// Triggered on SIGINT/SIGTERM; cancels live streams
    pub shutdown: ShutdownSignal,
}

impl ServerResources {
    /// Wire resources from configuration
    #[must_use]
    pub fn new(database: Database, provider: Arc<dyn LlmProvider>, config: ServerConfig) -> Self {
        let settings = OrchestratorSettings::from(&config.chat);
        Self::with_settings(database, provider, config, settings)
    }

    /// Wire resources with explicit streaming settings
    #[must_use]
    pub fn with_settings(
        database: Database,
        provider: Arc<dyn LlmProvider>,
        config: ServerConfig,
        settings: OrchestratorSettings,
    ) -> Self {
        let auth_manager = Arc::new(AuthManager::from_config(&config.auth));
        let shutdown = ShutdownSignal::new();
        let orchestrator = StreamOrchestrator::new(
            database.chat(),
            Arc::clone(&provider),
            settings,
            shutdown.clone(),
        );
        Self {
            database,
            auth_middleware: AuthMiddleware::new(Arc::clone(&auth_manager)),
            auth_manager,
            provider,
            orchestrator,
            tool_runner: ToolRunner::new(),
            config: Arc::new(config),
            shutdown,
        }
    }
}

/// Build the complete application router
pub fn build_router(resources: &Arc<ServerResources>) -> Router {
    let mut api = Router::new()
        .merge(AuthRoutes::routes(Arc::clone(resources)))
        .merge(ChatRoutes::routes(Arc::clone(resources)))
        .merge(ToolRoutes::routes(Arc::clone(resources)));
    if let Some(timeout) = resources.config.chat.write_timeout() {
        api = api.layer(TimeoutLayer::new(timeout));
    }

    Router::new()
        .merge(HealthRoutes::routes(Arc::clone(resources)))
        .merge(api)
        .merge(ChatRoutes::stream_routes(Arc::clone(resources)))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .layer(setup_cors(&resources.config.cors))
}

/// The Orion HTTP server
pub struct OrionServer {
    resources: Arc<ServerResources>,
}

impl OrionServer {
    /// Create a server over prepared resources
    #[must_use]
    pub const fn new(resources: Arc<ServerResources>) -> Self {
        Self { resources }
    }

    /// Bind and serve until SIGINT or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the server fails
    pub async fn run(self) -> Result<()> {
        let config = &self.resources.config;
        let addr = format!("{}:{}", config.http_host, config.http_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;

        info!("HTTP server listening on http://{addr}");
        axum::serve(listener, build_router(&self.resources))
            .with_graceful_shutdown(shutdown_signal(self.resources.shutdown.clone()))
            .await
            .context("HTTP server failed")?;

        info!("HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_signal(shutdown: ShutdownSignal) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match unix::signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received, draining connections");
    shutdown.trigger();
}

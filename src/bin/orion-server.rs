// ABOUTME: Server binary for the Orion streaming chat backend
// ABOUTME: Loads environment configuration, opens the store, wires the model driver and serves HTTP
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # Orion Server Binary
//!
//! Starts the chat API with JWT authentication, the `SQLite` store and an
//! OpenAI-compatible model driver.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use orion_server::config::{DatabaseUrl, ServerConfig};
use orion_server::database::Database;
use orion_server::llm::{LlmProvider, OpenAiCompatibleConfig, OpenAiCompatibleProvider};
use orion_server::logging;
use orion_server::server::{OrionServer, ServerResources};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "orion-server")]
#[command(about = "Orion - streaming chat backend for an engineering-productivity AI assistant")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override database URL
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    if let Some(database_url) = args.database_url {
        config.database.url = DatabaseUrl::parse_url(&database_url);
    }
    info!("{}", config.summary());

    let database = Database::new(&config.database.url, config.database.max_connections).await?;

    let provider = OpenAiCompatibleProvider::new(OpenAiCompatibleConfig::from(&config.llm))
        .context("Failed to create model driver")?;
    info!(provider = provider.name(), model = provider.default_model(), "Model driver ready");
    let provider: Arc<dyn LlmProvider> = Arc::new(provider);

    let resources = Arc::new(ServerResources::new(database, provider, config));
    let server = OrionServer::new(resources);

    if let Err(e) = server.run().await {
        error!("Server error: {e:#}");
        return Err(e);
    }
    Ok(())
}

// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Parses environment variables into a validated ServerConfig
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! Environment-based configuration management

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::DEFAULT_CONVERSATION_TITLE;
use crate::llm::prompts::ORION_SYSTEM_PROMPT;

/// Minimum accepted length of a supplied JWT secret
const MIN_JWT_SECRET_LEN: usize = 32;

/// Upper bound for the title side task
const MAX_TITLE_DEADLINE_SECS: u64 = 8;

/// Strongly typed log level configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational (default)
    #[default]
    Info,
    /// Debug output
    Debug,
    /// Everything
    Trace,
}

impl LogLevel {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development (default)
    #[default]
    Development,
    /// Production deployment
    Production,
    /// Automated tests
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Type-safe database location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DatabaseUrl {
    /// `SQLite` database file
    SQLite {
        /// Path to the database file
        path: PathBuf,
    },
    /// In-memory `SQLite` (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path_str = s
            .strip_prefix("sqlite://")
            .or_else(|| s.strip_prefix("sqlite:"))
            .unwrap_or(s);
        if path_str == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path_str),
            }
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_owned(),
        }
    }

    /// Check if this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::SQLite {
            path: PathBuf::from("./data/orion.db"),
        }
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_connection_string())
    }
}

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub http_host: String,
    /// HTTP API port
    pub http_port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Log level
    pub log_level: LogLevel,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Model driver configuration
    pub llm: LlmConfig,
    /// Streaming chat behaviour
    pub chat: ChatConfig,
    /// CORS configuration
    pub cors: CorsConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database location
    pub url: DatabaseUrl,
    /// Pool size
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    /// Access token lifetime
    pub jwt_expiry_hours: i64,
    /// Refresh token lifetime
    pub refresh_expiry_hours: i64,
    /// `iss` claim
    pub issuer: String,
}

/// OpenAI-compatible model driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL up to and including the API version segment
    pub base_url: String,
    /// Bearer key, absent for local servers
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token budget for chat replies
    pub max_tokens: u32,
    /// Per-request timeout for non-streaming calls and stream connection
    pub timeout_secs: u64,
    /// Retries for retryable statuses on non-streaming calls
    pub max_retries: u32,
}

/// Streaming chat behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatConfig {
    /// Interval between `: ping` comment frames
    pub sse_heartbeat_secs: u64,
    /// Timeout for non-streaming routes, 0 disables it; streaming routes never time out
    pub write_timeout_secs: u64,
    /// Number of prior messages sent to the model
    pub max_history_turns: usize,
    /// Preamble placed before history
    pub system_prompt: String,
    /// Deadline for the title side task
    pub title_deadline_secs: u64,
    /// Sentinel title compared against before auto-titling
    pub default_conversation_title: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            sse_heartbeat_secs: 15,
            write_timeout_secs: 0,
            max_history_turns: 20,
            system_prompt: ORION_SYSTEM_PROMPT.trim().to_owned(),
            title_deadline_secs: MAX_TITLE_DEADLINE_SECS,
            default_conversation_title: DEFAULT_CONVERSATION_TITLE.to_owned(),
        }
    }
}

impl ChatConfig {
    /// Heartbeat period
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.sse_heartbeat_secs)
    }

    /// Title side task deadline
    #[must_use]
    pub const fn title_deadline(&self) -> Duration {
        Duration::from_secs(self.title_deadline_secs)
    }

    /// Timeout for non-streaming routes, `None` when unbounded
    #[must_use]
    pub const fn write_timeout(&self) -> Option<Duration> {
        if self.write_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.write_timeout_secs))
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins, `*` for any
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or validation fails
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        if let Err(e) = dotenvy::dotenv() {
            warn!("No .env file found or failed to load: {e}");
        }

        let chat_defaults = ChatConfig::default();

        let config = Self {
            http_host: env_var_or("HTTP_HOST", "0.0.0.0"),
            http_port: env_var_or("HTTP_PORT", "8080")
                .parse()
                .context("Invalid HTTP_PORT value")?,
            environment: Environment::from_str_or_default(&env_var_or("ENVIRONMENT", "development")),
            log_level: LogLevel::from_str_or_default(&env_var_or("RUST_LOG", "info")),

            database: DatabaseConfig {
                url: DatabaseUrl::parse_url(&env_var_or("DATABASE_URL", "sqlite:./data/orion.db")),
                max_connections: env_var_or("DATABASE_MAX_CONNECTIONS", "10")
                    .parse()
                    .context("Invalid DATABASE_MAX_CONNECTIONS value")?,
            },

            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, generating an ephemeral secret; tokens will not survive restarts");
                    generate_jwt_secret()
                }),
                jwt_expiry_hours: env_var_or("JWT_EXPIRY_HOURS", "24")
                    .parse()
                    .context("Invalid JWT_EXPIRY_HOURS value")?,
                refresh_expiry_hours: env_var_or("JWT_REFRESH_EXPIRY_HOURS", "168")
                    .parse()
                    .context("Invalid JWT_REFRESH_EXPIRY_HOURS value")?,
                issuer: env_var_or("JWT_ISSUER", "orion"),
            },

            llm: LlmConfig {
                base_url: env_var_or("LLM_BASE_URL", "https://api.openai.com/v1"),
                api_key: env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
                model: env_var_or("LLM_MODEL", "gpt-4o-mini"),
                temperature: env_var_or("LLM_TEMPERATURE", "0.7")
                    .parse()
                    .context("Invalid LLM_TEMPERATURE value")?,
                max_tokens: env_var_or("LLM_MAX_TOKENS", "2000")
                    .parse()
                    .context("Invalid LLM_MAX_TOKENS value")?,
                timeout_secs: env_var_or("LLM_TIMEOUT_SECS", "60")
                    .parse()
                    .context("Invalid LLM_TIMEOUT_SECS value")?,
                max_retries: env_var_or("LLM_MAX_RETRIES", "3")
                    .parse()
                    .context("Invalid LLM_MAX_RETRIES value")?,
            },

            chat: ChatConfig {
                sse_heartbeat_secs: env_var_or("SSE_HEARTBEAT_SEC", "15")
                    .parse()
                    .context("Invalid SSE_HEARTBEAT_SEC value")?,
                write_timeout_secs: env_var_or("WRITE_TIMEOUT_SEC", "0")
                    .parse()
                    .context("Invalid WRITE_TIMEOUT_SEC value")?,
                max_history_turns: env_var_or("MAX_HISTORY_TURNS", "20")
                    .parse()
                    .context("Invalid MAX_HISTORY_TURNS value")?,
                system_prompt: env::var("SYSTEM_PROMPT").unwrap_or(chat_defaults.system_prompt),
                title_deadline_secs: env_var_or("TITLE_DEADLINE_SEC", "8")
                    .parse()
                    .context("Invalid TITLE_DEADLINE_SEC value")?,
                default_conversation_title: env::var("DEFAULT_CONVERSATION_TITLE")
                    .unwrap_or(chat_defaults.default_conversation_title),
            },

            cors: CorsConfig {
                allowed_origins: parse_origins(&env_var_or("CORS_ALLOWED_ORIGINS", "*")),
            },
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.chat.sse_heartbeat_secs == 0 {
            return Err(anyhow!("SSE_HEARTBEAT_SEC must be a positive integer"));
        }
        if self.chat.max_history_turns == 0 {
            return Err(anyhow!("MAX_HISTORY_TURNS must be a positive integer"));
        }
        if !(1..=MAX_TITLE_DEADLINE_SECS).contains(&self.chat.title_deadline_secs) {
            return Err(anyhow!(
                "TITLE_DEADLINE_SEC must be between 1 and {MAX_TITLE_DEADLINE_SECS}"
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow!("LLM_TEMPERATURE must be between 0.0 and 2.0"));
        }
        if self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(anyhow!(
                "JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes"
            ));
        }
        if self.auth.jwt_expiry_hours <= 0 || self.auth.refresh_expiry_hours <= 0 {
            return Err(anyhow!("JWT expiry hours must be positive"));
        }
        if self.llm.api_key.is_none() {
            warn!("LLM_API_KEY not set; the model driver will send unauthenticated requests");
        }
        if self.environment.is_production() && self.cors.allowed_origins.iter().any(|o| o == "*") {
            warn!("CORS allows any origin in production");
        }

        Ok(())
    }

    /// Get a summary of the configuration for logging (without secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Orion Server Configuration:\n\
             - HTTP: {}:{}\n\
             - Environment: {}\n\
             - Log Level: {}\n\
             - Database: {}\n\
             - Model: {} via {}\n\
             - SSE Heartbeat: {}s\n\
             - Write Timeout: {}\n\
             - History Turns: {}\n\
             - Title Deadline: {}s\n\
             - CORS Origins: {}",
            self.http_host,
            self.http_port,
            self.environment,
            self.log_level,
            self.database.url,
            self.llm.model,
            self.llm.base_url,
            self.chat.sse_heartbeat_secs,
            self.chat
                .write_timeout()
                .map_or_else(|| "unbounded".to_owned(), |d| format!("{}s", d.as_secs())),
            self.chat.max_history_turns,
            self.chat.title_deadline_secs,
            self.cors.allowed_origins.join(", "),
        )
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse comma-separated CORS origins
fn parse_origins(origins_str: &str) -> Vec<String> {
    if origins_str.trim() == "*" {
        vec!["*".to_owned()]
    } else {
        origins_str
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Random alphanumeric secret for development runs
fn generate_jwt_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

// ABOUTME: Typed tool configurations decoded from the registry's JSON config and authConfig
// ABOUTME: Validates URLs, methods, timeouts and MCP transport before a tool is stored or run
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::ToolError;
use crate::constants::tools::{DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS};
use crate::models::ToolType;

/// The only MCP transport a server-side client can hold open per request
pub const MCP_HTTP_STREAMABLE: &str = "http_streamable";

/// Extra request headers, either as a JSON object or as `Name: value` lines
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HeaderSpec {
    /// `{"X-Team": "infra"}`
    Map(BTreeMap<String, String>),
    /// `"X-Team: infra\nX-Env: prod"`
    Text(String),
}

impl Default for HeaderSpec {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

impl HeaderSpec {
    /// Header pairs; text lines without a name or colon are skipped
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        match self {
            Self::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Self::Text(text) => text
                .lines()
                .filter_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    let name = name.trim();
                    (!name.is_empty()).then(|| (name.to_owned(), value.trim().to_owned()))
                })
                .collect(),
        }
    }
}

/// `api` tool: one HTTP request per run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Target URL
    pub url: String,
    /// HTTP method; `GET` and `DELETE` carry the input as query parameters
    pub method: String,
    /// Extra headers
    #[serde(default)]
    pub headers: HeaderSpec,
    /// Per-run time budget
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// `webhook` tool: the input is `POST`ed as JSON
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Target URL
    pub url: String,
    /// Extra headers
    #[serde(default)]
    pub headers: HeaderSpec,
    /// Per-run time budget
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// `mcp` tool: one tool on a remote MCP server
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
    /// MCP endpoint URL
    pub endpoint: String,
    /// Transport; only `http_streamable` is accepted
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// `Authorization` value; a bare token gets a `Bearer ` prefix
    #[serde(default)]
    pub authorization: Option<String>,
    /// Extra headers
    #[serde(default)]
    pub headers: HeaderSpec,
    /// Remote tool name, the registry name when absent
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Per-run time budget
    #[serde(default, alias = "timeout")]
    pub timeout_secs: Option<u64>,
}

fn default_protocol() -> String {
    MCP_HTTP_STREAMABLE.to_owned()
}

/// Credentials attached to outgoing tool calls
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    /// `Authorization: Bearer <token>`
    Bearer {
        /// Bearer token
        token: String,
    },
    /// Arbitrary header
    Header {
        /// Header name
        name: String,
        /// Header value
        value: String,
    },
}

impl AuthConfig {
    /// Decode an optional `authConfig` value
    ///
    /// # Errors
    ///
    /// Returns `ToolError::InvalidAuth` when the value has an unknown shape
    pub fn parse(raw: Option<&Value>) -> Result<Option<Self>, ToolError> {
        match raw {
            None | Some(Value::Null) => Ok(None),
            Some(value) => {
                let auth: Self = serde_json::from_value(value.clone())
                    .map_err(|e| ToolError::InvalidAuth(e.to_string()))?;
                let (name, secret) = match &auth {
                    Self::Bearer { token } => ("Authorization", token.as_str()),
                    Self::Header { name, value } => (name.as_str(), value.as_str()),
                };
                if name.trim().is_empty() || secret.trim().is_empty() {
                    return Err(ToolError::InvalidAuth("credentials must not be empty".to_owned()));
                }
                Ok(Some(auth))
            }
        }
    }

    /// Header name and value to send
    #[must_use]
    pub fn header(&self) -> (String, String) {
        match self {
            Self::Bearer { token } => ("Authorization".to_owned(), with_bearer(token)),
            Self::Header { name, value } => (name.clone(), value.clone()),
        }
    }
}

/// Prefix `Bearer ` unless the value already carries a scheme
#[must_use]
pub fn with_bearer(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.to_ascii_lowercase().starts_with("bearer ") {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

/// A decoded, validated tool configuration
#[derive(Debug, Clone)]
pub enum ToolSpec {
    /// HTTP API call
    Api(ApiConfig),
    /// Webhook `POST`
    Webhook(WebhookConfig),
    /// Remote MCP tool
    Mcp(McpConfig),
}

impl ToolSpec {
    /// Decode and validate `config` for a tool of `tool_type`
    ///
    /// # Errors
    ///
    /// Returns `ToolError::InvalidConfig` describing the first problem found
    pub fn parse(tool_type: ToolType, config: &Value) -> Result<Self, ToolError> {
        if !config.is_object() {
            return Err(ToolError::InvalidConfig("config must be a JSON object".to_owned()));
        }
        let spec = match tool_type {
            ToolType::Api => {
                let api: ApiConfig = decode(config, "api")?;
                validate_url(&api.url)?;
                validate_method(&api.method)?;
                Self::Api(api)
            }
            ToolType::Webhook => {
                let webhook: WebhookConfig = decode(config, "webhook")?;
                validate_url(&webhook.url)?;
                Self::Webhook(webhook)
            }
            ToolType::Mcp => {
                let mcp: McpConfig = decode(config, "mcp")?;
                if mcp.protocol != MCP_HTTP_STREAMABLE {
                    return Err(ToolError::InvalidConfig(format!(
                        "unsupported mcp protocol '{}', expected '{MCP_HTTP_STREAMABLE}'",
                        mcp.protocol
                    )));
                }
                validate_url(&mcp.endpoint)?;
                Self::Mcp(mcp)
            }
        };
        spec.validate_timeout()?;
        Ok(spec)
    }

    fn timeout_secs(&self) -> Option<u64> {
        match self {
            Self::Api(api) => api.timeout_secs,
            Self::Webhook(webhook) => webhook.timeout_secs,
            Self::Mcp(mcp) => mcp.timeout_secs,
        }
    }

    fn validate_timeout(&self) -> Result<(), ToolError> {
        match self.timeout_secs() {
            Some(secs) if secs == 0 || secs > MAX_TIMEOUT_SECS => Err(ToolError::InvalidConfig(
                format!("timeoutSecs must be between 1 and {MAX_TIMEOUT_SECS}"),
            )),
            _ => Ok(()),
        }
    }

    /// Time budget of one run
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs().unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

fn decode<T: DeserializeOwned>(config: &Value, kind: &str) -> Result<T, ToolError> {
    serde_json::from_value(config.clone())
        .map_err(|e| ToolError::InvalidConfig(format!("{kind} tool config: {e}")))
}

fn validate_url(raw: &str) -> Result<(), ToolError> {
    let url = Url::parse(raw).map_err(|e| ToolError::InvalidConfig(format!("invalid url '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ToolError::InvalidConfig(format!("unsupported url scheme '{other}'"))),
    }
}

fn validate_method(raw: &str) -> Result<(), ToolError> {
    match raw.to_ascii_uppercase().parse::<Method>() {
        Ok(method)
            if [Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE]
                .contains(&method) =>
        {
            Ok(())
        }
        _ => Err(ToolError::InvalidConfig(format!("unsupported http method '{raw}'"))),
    }
}

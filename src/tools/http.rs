// ABOUTME: HTTP executors for api and webhook tools
// ABOUTME: Sends the input as query parameters or a JSON body and wraps the answer as {status, body}
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{json, Value};

use super::config::{ApiConfig, AuthConfig, HeaderSpec, WebhookConfig};
use super::ToolError;

/// Characters of an error body kept in the failure message
const MAX_ERROR_BODY_CHARS: usize = 512;

pub(super) async fn call_api(
    client: &Client,
    config: &ApiConfig,
    auth: Option<&AuthConfig>,
    input: &Value,
) -> Result<Value, ToolError> {
    let method = config
        .method
        .to_ascii_uppercase()
        .parse::<Method>()
        .map_err(|e| ToolError::InvalidConfig(format!("invalid method '{}': {e}", config.method)))?;

    let request = client.request(method.clone(), &config.url);
    let request = if method == Method::GET || method == Method::DELETE {
        request.query(&query_pairs(input))
    } else {
        request.json(input)
    };
    send(with_headers(request, &config.headers, auth)).await
}

pub(super) async fn call_webhook(
    client: &Client,
    config: &WebhookConfig,
    auth: Option<&AuthConfig>,
    input: &Value,
) -> Result<Value, ToolError> {
    let request = client.post(&config.url).json(input);
    send(with_headers(request, &config.headers, auth)).await
}

pub(super) fn with_headers(
    mut request: RequestBuilder,
    headers: &HeaderSpec,
    auth: Option<&AuthConfig>,
) -> RequestBuilder {
    for (name, value) in headers.pairs() {
        request = request.header(name, value);
    }
    if let Some(auth) = auth {
        let (name, value) = auth.header();
        request = request.header(name, value);
    }
    request
}

async fn send(request: RequestBuilder) -> Result<Value, ToolError> {
    let response = request.send().await?;
    let status = response.status();
    let body = read_body(response).await?;

    if !status.is_success() {
        let text = match &body {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return Err(ToolError::Status {
            status: status.as_u16(),
            body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        });
    }
    Ok(json!({ "status": status.as_u16(), "body": body }))
}

/// JSON bodies stay structured; anything else is kept as text
async fn read_body(response: Response) -> Result<Value, ToolError> {
    let text = response.text().await?;
    if text.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn query_pairs(input: &Value) -> Vec<(String, String)> {
    let Some(object) = input.as_object() else {
        return Vec::new();
    };
    object
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

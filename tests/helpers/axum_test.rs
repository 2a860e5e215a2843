// ABOUTME: Axum HTTP testing utilities for integration tests
// ABOUTME: Drives routers in-process and reads JSON or complete SSE bodies
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use std::str;
use std::time::Duration;

use axum::body::{to_bytes, Body, BodyDataStream};
use axum::http::{header, HeaderMap, Method, Request, Response, StatusCode};
use axum::Router;
use futures_util::StreamExt;
use orion_server::chat::parse_frames;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::timeout;
use tower::ServiceExt;

/// Upper bound on reading any test response body
const BODY_TIMEOUT: Duration = Duration::from_secs(10);

/// Helper to build and execute HTTP requests against Axum routers
pub struct AxumTestRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl AxumTestRequest {
    fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_owned(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Create a new GET request
    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Create a new POST request
    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Create a new PUT request
    #[allow(dead_code)]
    pub fn put(uri: &str) -> Self {
        Self::new(Method::PUT, uri)
    }

    /// Create a new DELETE request
    #[allow(dead_code)]
    pub fn delete(uri: &str) -> Self {
        Self::new(Method::DELETE, uri)
    }

    /// Add a header to the request
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Add a bearer token
    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {token}"))
    }

    /// Add JSON body to the request
    pub fn json<T: Serialize>(mut self, data: &T) -> Self {
        self.body = Some(serde_json::to_string(data).expect("Failed to serialize JSON"));
        self.headers.push((
            header::CONTENT_TYPE.as_str().to_owned(),
            "application/json".to_owned(),
        ));
        self
    }

    /// Add a raw body
    #[allow(dead_code)]
    pub fn raw_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_owned());
        self
    }

    fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        for (key, value) in self.headers {
            builder = builder.header(key, value);
        }
        builder
            .body(Body::from(self.body.unwrap_or_default()))
            .expect("Failed to build request")
    }

    /// Execute the request and read the whole body
    ///
    /// Chat streams end after `done`, so SSE responses can be read to the end too.
    pub async fn send(self, app: Router) -> AxumTestResponse {
        let response = app
            .oneshot(self.build())
            .await
            .expect("Failed to execute request");
        AxumTestResponse::from_response(response).await
    }

    /// Execute the request and return a reader over the live SSE body
    ///
    /// Resolves once the handler has returned its response head, i.e. after
    /// the stream was prepared and before it finishes.
    #[allow(dead_code)]
    pub async fn send_streaming(self, app: Router) -> SseReader {
        let response = app
            .oneshot(self.build())
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status(), StatusCode::OK, "stream did not start");
        SseReader::from_response(response)
    }
}

/// Wrapper around Axum HTTP response for testing
pub struct AxumTestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl AxumTestResponse {
    async fn from_response(response: Response<Body>) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body = timeout(BODY_TIMEOUT, to_bytes(response.into_body(), usize::MAX))
            .await
            .expect("Timed out reading response body")
            .expect("Failed to read response body")
            .to_vec();
        Self {
            status,
            headers,
            body,
        }
    }

    /// Get the response status code as u16 for easy assertion
    #[allow(dead_code)]
    pub const fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// Get the response status code as `StatusCode`
    pub const fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Response headers
    #[allow(dead_code)]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the response body as a JSON value
    pub fn json<T: DeserializeOwned>(self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to deserialize JSON response")
    }

    /// The `data` field of a success envelope
    #[allow(dead_code)]
    pub fn data(self) -> Value {
        let mut envelope: Value = self.json();
        assert_eq!(envelope["success"], true, "expected success envelope: {envelope}");
        envelope["data"].take()
    }

    /// The `errorCode` of an error envelope
    #[allow(dead_code)]
    pub fn error_code(self) -> u64 {
        let envelope: Value = self.json();
        assert_eq!(envelope["success"], false, "expected error envelope: {envelope}");
        envelope["errorCode"].as_u64().expect("errorCode missing")
    }

    /// Get the response body as a string
    pub fn text(self) -> String {
        String::from_utf8(self.body).expect("Failed to decode response as UTF-8")
    }

    /// Parse the body as SSE frames: `(events, heartbeat count)`
    #[allow(dead_code)]
    pub fn sse(self) -> (Vec<(String, Value)>, usize) {
        parse_frames(&self.text())
    }
}

/// Incremental reader over a live SSE response body
pub struct SseReader {
    body: BodyDataStream,
    buffer: String,
}

#[allow(dead_code)]
impl SseReader {
    /// Read a stream response produced outside a router
    pub fn from_response(response: Response<Body>) -> Self {
        Self {
            body: response.into_body().into_data_stream(),
            buffer: String::new(),
        }
    }

    /// Read until the accumulated body contains `needle`
    pub async fn until(&mut self, needle: &str) -> &str {
        timeout(BODY_TIMEOUT, async {
            while !self.buffer.contains(needle) {
                let chunk = self
                    .body
                    .next()
                    .await
                    .expect("stream ended early")
                    .expect("body error");
                self.buffer.push_str(str::from_utf8(&chunk).expect("utf-8 frame"));
            }
        })
        .await
        .expect("Timed out waiting for SSE frame");
        &self.buffer
    }

    /// Read the rest of the stream and return the whole body
    pub async fn finish(mut self) -> String {
        timeout(BODY_TIMEOUT, async {
            while let Some(chunk) = self.body.next().await {
                let chunk = chunk.expect("body error");
                self.buffer.push_str(str::from_utf8(&chunk).expect("utf-8 frame"));
            }
        })
        .await
        .expect("Timed out waiting for stream end");
        self.buffer
    }
}

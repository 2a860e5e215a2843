// ABOUTME: Axum IntoResponse for AppError producing the JSON error envelope
// ABOUTME: Status comes from the numeric code, body is {success, errorCode, message, data}
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use tracing::{error, warn};

use super::{AppError, ErrorEnvelope};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(code = %self.code, source = ?self.source, "{}", self.message);
        } else {
            warn!(code = %self.code, "{}", self.message);
        }

        (status, Json(ErrorEnvelope::from(&self))).into_response()
    }
}

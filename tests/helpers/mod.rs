// ABOUTME: Shared test helpers for integration tests
// ABOUTME: Exports the in-process HTTP request helper, the scripted model driver and fake tool endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod axum_test;
pub mod scripted_provider;
pub mod tool_upstream;

// ABOUTME: Error types for the server crate
// ABOUTME: Re-exports the shared AppError taxonomy from orion-core
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # Unified Error Handling
//!
//! Errors are defined in `orion-core` so that the envelope and the numeric
//! codes are shared by every crate in the workspace.

pub use orion_core::errors::{AppError, AppResult, ErrorCode, ErrorEnvelope};

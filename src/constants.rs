// ABOUTME: System-wide constants for the Orion server
// ABOUTME: Re-exports chat lifecycle constants and adds server identity values
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # Constants Module

pub use orion_core::constants::*;

/// Service name reported by health checks and logs
pub const SERVICE_NAME: &str = "orion-server";

/// Crate version reported by health checks and logs
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

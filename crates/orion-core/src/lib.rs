// ABOUTME: Core types and constants for the Orion chat server
// ABOUTME: Foundation crate with error taxonomy, chat records, pagination, and constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

#![deny(unsafe_code)]

//! # Orion Core
//!
//! Foundation crate providing shared types for the Orion chat server. It is
//! designed to change infrequently so the server crate gets incremental
//! compilation benefits in the workspace.
//!
//! ## Modules
//!
//! - **errors**: `AppError` with the numeric application error taxonomy
//! - **constants**: chat lifecycle strings and limits
//! - **models**: conversation, message and tool records with their status enums
//! - **pagination**: page/page-size pagination for list endpoints

/// Unified error handling with numeric application codes and HTTP envelopes
pub mod errors;

/// Application constants shared by the server and its tests
pub mod constants;

/// Conversation, message and user records
pub mod models;

/// Page-based pagination helpers
pub mod pagination;

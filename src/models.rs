// ABOUTME: Data models used by the server
// ABOUTME: Re-exports conversation, message, user and tool records from orion-core
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

//! # Data Models
//!
//! Records mirror the database rows one to one; HTTP DTOs live next to the
//! routes that serve them.

pub use orion_core::models::*;
pub use orion_core::pagination::{Page, PageInfo, PageRequest};

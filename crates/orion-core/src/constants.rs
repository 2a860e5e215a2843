// ABOUTME: Chat lifecycle constants shared by the server, the store and tests
// ABOUTME: Reason strings, sentinel title, list/stream limits and tool call limits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

/// Error text written onto assistant rows demoted by a newer stream
pub const SUPERSEDED_REASON: &str = "superseded by new stream";

/// Error text written onto assistant rows whose client went away
pub const CLIENT_CANCELED_REASON: &str = "client canceled";

/// Title a conversation carries until it is auto-titled or renamed
pub const DEFAULT_CONVERSATION_TITLE: &str = "新对话";

/// Content type of plain text messages
pub const TEXT_CONTENT_TYPE: &str = "text";

/// Pagination limits for list endpoints
pub mod pagination {
    /// Default conversations per page
    pub const DEFAULT_CONVERSATION_PAGE_SIZE: u32 = 20;
    /// Default messages per page
    pub const DEFAULT_MESSAGE_PAGE_SIZE: u32 = 50;
    /// Default tools or tool executions per page
    pub const DEFAULT_TOOL_PAGE_SIZE: u32 = 20;
    /// Hard cap on any page size
    pub const MAX_PAGE_SIZE: u32 = 100;
}

/// Title generation limits
pub mod titles {
    /// Completion token budget for the title request
    pub const TITLE_MAX_TOKENS: u32 = 24;
    /// Maximum characters kept from a generated title
    pub const TITLE_MAX_CHARS: usize = 20;
    /// Characters of user text used when generation fails
    pub const FALLBACK_TITLE_CHARS: usize = 16;
}

/// Tool execution limits and MCP client identity
pub mod tools {
    /// Time budget of a tool call when its config sets none
    pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
    /// Upper bound on a configured time budget
    pub const MAX_TIMEOUT_SECS: u64 = 300;
    /// MCP protocol revision offered during `initialize`
    pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";
    /// Client name sent in `initialize`
    pub const MCP_CLIENT_NAME: &str = "orion-server";
    /// Header carrying the MCP session assigned by the server
    pub const MCP_SESSION_HEADER: &str = "Mcp-Session-Id";
}

// ABOUTME: Page-based pagination for conversation and message listings
// ABOUTME: Clamps client-supplied page/pageSize and reports totals for UI pagers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use serde::{Deserialize, Serialize};

use crate::constants::pagination::MAX_PAGE_SIZE;

/// Validated page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number
    pub page: u32,
    /// Items per page, never above `MAX_PAGE_SIZE`
    pub page_size: u32,
}

impl PageRequest {
    /// Build a page request, falling back to `default_size` and clamping out-of-range values
    #[must_use]
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_size: u32) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let page_size = match page_size {
            Some(0) | None => default_size,
            Some(size) => size.min(MAX_PAGE_SIZE),
        };
        Self { page, page_size }
    }

    /// SQL `LIMIT`
    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    /// SQL `OFFSET`
    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

/// Pagination block returned next to a page of items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// 1-based page number
    pub page: u32,
    /// Items per page
    pub page_size: u32,
    /// Total matching items
    pub total: i64,
    /// Total number of pages
    pub total_page: i64,
}

impl PageInfo {
    /// Compute page counts for `total` items
    #[must_use]
    pub fn new(request: PageRequest, total: i64) -> Self {
        let size = i64::from(request.page_size);
        Self {
            page: request.page,
            page_size: request.page_size,
            total,
            total_page: (total + size - 1) / size,
        }
    }
}

/// A page of items with its pagination block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Pagination metadata
    pub pagination: PageInfo,
}

impl<T> Page<T> {
    /// Wrap `items` fetched for `request` out of `total`
    #[must_use]
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        Self {
            items,
            pagination: PageInfo::new(request, total),
        }
    }

    /// Convert the items while keeping pagination
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

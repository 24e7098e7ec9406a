//! Page-based listing utilities.

use serde::{Deserialize, Serialize};

/// Default number of items per page.
pub const DEFAULT_PER_PAGE: u32 = 50;

/// Upper bound for items per page.
pub const MAX_PER_PAGE: u32 = 200;

/// A normalized page request (1-based page index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Normalizes optional query values: page starts at 1, per_page is
    /// clamped to `1..=MAX_PER_PAGE`.
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    /// Number of rows to return.
    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Pagination metadata returned alongside list results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PageInfo {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl PageInfo {
    pub fn new(request: PageRequest, total: u64) -> Self {
        let per_page = u64::from(request.per_page);
        let total_pages = total.div_ceil(per_page);
        Self {
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }
}

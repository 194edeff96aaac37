//! Pagination support.

use keystone_core::{Page, PageRequest};
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: u64 = 50;

/// Pagination parameters (1-based pages).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    /// Page number.
    #[serde(default = "default_page")]
    pub page: u64,
    /// Page size.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl Pagination {
    /// Converts to an offset request. Page 0 is treated as page 1.
    #[must_use]
    pub fn to_request(self) -> PageRequest {
        let limit = PageRequest::new(0, self.page_size).limit;
        PageRequest::new(self.page.max(1).saturating_sub(1).saturating_mul(limit), limit)
    }
}

/// Paged response wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct PagedResponse<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Pagination metadata.
    pub pagination: PageInfo,
}

/// Pagination metadata.
#[derive(Debug, Serialize, Deserialize)]
pub struct PageInfo {
    /// Current page number.
    pub page: u64,
    /// Page size.
    pub page_size: u64,
    /// Total number of items.
    pub total_items: u64,
    /// Total number of pages.
    pub total_pages: u64,
    /// Has previous page.
    pub has_previous: bool,
    /// Has next page.
    pub has_next: bool,
}

impl<T> From<Page<T>> for PagedResponse<T> {
    fn from(page: Page<T>) -> Self {
        let page_size = page.limit.max(1);
        let current = page.offset / page_size + 1;
        let total_pages = page.total.div_ceil(page_size);

        Self {
            items: page.items,
            pagination: PageInfo {
                page: current,
                page_size,
                total_items: page.total,
                total_pages,
                has_previous: current > 1,
                has_next: current < total_pages,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_request() {
        let req = Pagination { page: 3, page_size: 20 }.to_request();
        assert_eq!(req.offset, 40);
        assert_eq!(req.limit, 20);

        let req = Pagination { page: 0, page_size: 10_000 }.to_request();
        assert_eq!(req.offset, 0);
        assert_eq!(req.limit, PageRequest::MAX_LIMIT);
    }

    #[test]
    fn test_page_info() {
        let page = Page {
            items: vec![1, 2],
            total: 45,
            offset: 20,
            limit: 20,
        };
        let response = PagedResponse::from(page);
        assert_eq!(response.pagination.page, 2);
        assert_eq!(response.pagination.total_pages, 3);
        assert!(response.pagination.has_previous);
        assert!(response.pagination.has_next);
    }
}

//! Query shapes shared by the store listing and the index search paths

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::book::BookSummary;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Book list/search query parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Title substring (store) or analyzed match (index)
    pub title: Option<String>,
    /// Exact ISBN
    pub isbn: Option<String>,
    /// Author substring (store) or analyzed match (index)
    pub author: Option<String>,
    /// Content substring (store) or analyzed match (index)
    pub content: Option<String>,
    /// Full-text keyword, index search only
    pub keyword: Option<String>,
    /// Page number (default: 1)
    pub page: Option<i64>,
    /// Items per page (default: 10, max: 100)
    pub page_size: Option<i64>,
}

impl BookQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.page_size)
    }

    pub fn filter(&self) -> BookFilter {
        BookFilter {
            title: non_blank(&self.title),
            isbn: non_blank(&self.isbn),
            author: non_blank(&self.author),
            content: non_blank(&self.content),
        }
    }

    pub fn keyword(&self) -> Option<String> {
        non_blank(&self.keyword)
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Conjunctive book filter. `None` means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    pub title: Option<String>,
    pub isbn: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
}

impl BookFilter {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.isbn.is_none() && self.author.is_none() && self.content.is_none()
    }
}

/// Normalized page request. Non-positive inputs fall back to the defaults and
/// oversized pages are clamped to `MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE),
            page_size: page_size
                .filter(|s| *s > 0)
                .map_or(DEFAULT_PAGE_SIZE, |s| s.min(MAX_PAGE_SIZE)),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            return 0;
        }
        (total - 1) / self.page_size + 1
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Paginated response envelope shared by store listing and index search
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookPage {
    pub items: Vec<BookSummary>,
    /// Total matches before pagination
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl BookPage {
    pub fn new(items: Vec<BookSummary>, total: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
            total_pages: pagination.total_pages(total),
        }
    }

    pub fn empty(pagination: Pagination) -> Self {
        Self::new(Vec::new(), 0, pagination)
    }
}

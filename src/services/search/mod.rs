//! Search index adapter.
//!
//! The index is a best-effort mirror of the book store. Callers never use it
//! for existence checks, only for relevance ranking.

pub mod elasticsearch;
pub mod query;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    config::SearchConfig,
    error::{AppError, AppResult},
    models::{
        book::BookDocument,
        query::{BookFilter, Pagination},
    },
};

pub use elasticsearch::ElasticsearchIndex;

/// Failure talking to the search index
#[derive(Debug, Error)]
pub enum IndexError {
    /// Transport error, timeout, or missing index
    #[error("search index unavailable: {0}")]
    Unavailable(String),

    /// The index answered with an error status
    #[error("search index rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("invalid search index response: {0}")]
    Decode(String),
}

impl IndexError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, IndexError::Unavailable(_))
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        AppError::SearchIndex(err.to_string())
    }
}

pub type IndexResult<T> = Result<T, IndexError>;

/// One page of ranked hits
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub total: i64,
    pub documents: Vec<BookDocument>,
}

/// Per-document outcome of a bulk upsert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    pub indexed: usize,
    pub failed: Vec<(i64, String)>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// False when no index is configured
    fn is_enabled(&self) -> bool;

    async fn ping(&self) -> IndexResult<()>;

    /// Create the index with its mapping. An existing index is not an error.
    async fn create_index(&self) -> IndexResult<()>;

    /// Drop the index. A missing index is not an error.
    async fn delete_index(&self) -> IndexResult<()>;

    /// Upsert by id; searchable as soon as the call returns
    async fn index_document(&self, doc: &BookDocument) -> IndexResult<()>;

    async fn bulk_index(&self, docs: &[BookDocument]) -> IndexResult<BulkReport>;

    /// Remove by id. An already absent document is not an error.
    async fn delete_document(&self, id: i64) -> IndexResult<()>;

    async fn get_document(&self, id: i64) -> IndexResult<Option<BookDocument>>;

    async fn search_by_keyword(&self, keyword: &str, pagination: Pagination) -> IndexResult<SearchHits>;

    async fn search_by_filters(&self, filter: &BookFilter, pagination: Pagination) -> IndexResult<SearchHits>;

    async fn search_by_title(&self, title: &str, exact: bool) -> IndexResult<Vec<BookDocument>>;

    async fn search_by_content(&self, content: &str) -> IndexResult<Vec<BookDocument>>;
}

/// Stand-in used when no index is configured: writes succeed as no-ops and
/// searches find nothing.
pub struct DisabledIndex;

#[async_trait]
impl SearchIndex for DisabledIndex {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn ping(&self) -> IndexResult<()> {
        Ok(())
    }

    async fn create_index(&self) -> IndexResult<()> {
        tracing::debug!("Search index disabled, skipping index creation");
        Ok(())
    }

    async fn delete_index(&self) -> IndexResult<()> {
        tracing::debug!("Search index disabled, skipping index deletion");
        Ok(())
    }

    async fn index_document(&self, doc: &BookDocument) -> IndexResult<()> {
        tracing::debug!("Search index disabled, skipping document {}", doc.id);
        Ok(())
    }

    async fn bulk_index(&self, _docs: &[BookDocument]) -> IndexResult<BulkReport> {
        Ok(BulkReport::default())
    }

    async fn delete_document(&self, _id: i64) -> IndexResult<()> {
        Ok(())
    }

    async fn get_document(&self, _id: i64) -> IndexResult<Option<BookDocument>> {
        Ok(None)
    }

    async fn search_by_keyword(&self, _keyword: &str, _pagination: Pagination) -> IndexResult<SearchHits> {
        Ok(SearchHits::default())
    }

    async fn search_by_filters(&self, _filter: &BookFilter, _pagination: Pagination) -> IndexResult<SearchHits> {
        Ok(SearchHits::default())
    }

    async fn search_by_title(&self, _title: &str, _exact: bool) -> IndexResult<Vec<BookDocument>> {
        Ok(Vec::new())
    }

    async fn search_by_content(&self, _content: &str) -> IndexResult<Vec<BookDocument>> {
        Ok(Vec::new())
    }
}

/// Build the index client from configuration
pub fn build_search_index(config: &SearchConfig) -> AppResult<Arc<dyn SearchIndex>> {
    match config.enabled_url() {
        Some(url) => {
            let index = ElasticsearchIndex::new(url, config)
                .map_err(|e| AppError::Internal(format!("Failed to create search client: {}", e)))?;
            tracing::info!("Search index enabled at {} (index '{}')", url, config.index);
            Ok(Arc::new(index))
        }
        None => {
            tracing::info!("No search index configured, relevance search disabled");
            Ok(Arc::new(DisabledIndex))
        }
    }
}

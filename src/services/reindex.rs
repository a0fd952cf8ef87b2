//! Full rebuild of the search index from the book store.
//!
//! Drops and recreates the index, then pages through live books by id and
//! bulk-indexes each page. A run can be cancelled between pages, or stop when
//! the index becomes unreachable, and be resumed later from the last fully
//! indexed id.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::book::BookDocument,
    repository::BookStore,
    services::search::{IndexResult, SearchIndex},
};

/// Simple cancellation flag shared between the shutdown handler and running jobs
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Reindex request body
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReindexOptions {
    /// Continue after this book id without dropping the index
    #[serde(default)]
    pub resume_after: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReindexStatus {
    Done,
    Cancelled,
    /// Index became unreachable mid-run
    Interrupted,
    /// No search index configured
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReindexReport {
    pub status: ReindexStatus,
    pub indexed: usize,
    /// Books that could not be indexed; they stay out of the index until the next run
    pub failed_ids: Vec<i64>,
    pub pages: usize,
    /// Last fully indexed id when cancelled or interrupted; pass back as `resume_after`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_after: Option<i64>,
}

impl ReindexReport {
    fn new(status: ReindexStatus) -> Self {
        Self {
            status,
            indexed: 0,
            failed_ids: Vec::new(),
            pages: 0,
            resume_after: None,
        }
    }
}

#[derive(Clone)]
pub struct ReindexService {
    store: Arc<dyn BookStore>,
    index: Arc<dyn SearchIndex>,
    batch_size: i64,
}

impl ReindexService {
    pub fn new(store: Arc<dyn BookStore>, index: Arc<dyn SearchIndex>, batch_size: i64) -> Self {
        Self {
            store,
            index,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn reindex_all(
        &self,
        options: ReindexOptions,
        cancel: &CancellationToken,
    ) -> AppResult<ReindexReport> {
        if !self.index.is_enabled() {
            tracing::info!("Search index disabled, skipping reindex");
            return Ok(ReindexReport::new(ReindexStatus::Skipped));
        }

        match options.resume_after {
            Some(after) => tracing::info!("Resuming reindex after book {}", after),
            None => {
                if let Err(e) = self.index.delete_index().await {
                    tracing::warn!("Failed to drop search index, continuing: {}", e);
                }
                self.index.create_index().await?;
                tracing::info!("Search index recreated, starting full reindex");
            }
        }

        let mut report = ReindexReport::new(ReindexStatus::Done);
        let mut after = options.resume_after.unwrap_or(0);

        loop {
            if cancel.is_cancelled() {
                tracing::warn!("Reindex cancelled after book {}", after);
                report.status = ReindexStatus::Cancelled;
                report.resume_after = Some(after);
                return Ok(report);
            }

            let books = self.store.list_after(after, self.batch_size).await?;
            let Some(last) = books.last() else {
                break;
            };
            let last_id = last.id;
            let page_len = books.len() as i64;

            let docs: Vec<BookDocument> = books.iter().map(BookDocument::from).collect();
            if let Err(e) = self.index_page(&docs, &mut report).await {
                tracing::warn!("Search index unreachable, stopping reindex after book {}: {}", after, e);
                report.status = ReindexStatus::Interrupted;
                report.resume_after = Some(after);
                return Ok(report);
            }

            report.pages += 1;
            after = last_id;
            tracing::debug!("Reindexed page {} up to book {}", report.pages, after);

            if page_len < self.batch_size {
                break;
            }
        }

        tracing::info!(
            "Reindex finished: {} indexed, {} failed, {} pages",
            report.indexed,
            report.failed_ids.len(),
            report.pages
        );
        Ok(report)
    }

    /// Bulk-index one page. A rejected bulk call falls back to one request
    /// per document so a single bad record cannot sink the page. An
    /// unreachable index is returned to the caller without retrying.
    async fn index_page(&self, docs: &[BookDocument], report: &mut ReindexReport) -> IndexResult<()> {
        match self.index.bulk_index(docs).await {
            Ok(bulk) => {
                report.indexed += bulk.indexed;
                for (id, reason) in bulk.failed {
                    tracing::warn!("Failed to index book {}: {}", id, reason);
                    report.failed_ids.push(id);
                }
            }
            Err(e) if e.is_unavailable() => return Err(e),
            Err(e) => {
                tracing::warn!("Bulk request failed, indexing page one by one: {}", e);
                for doc in docs {
                    match self.index.index_document(doc).await {
                        Ok(()) => report.indexed += 1,
                        Err(e) if e.is_unavailable() => return Err(e),
                        Err(e) => {
                            tracing::warn!("Failed to index book {}: {}", doc.id, e);
                            report.failed_ids.push(doc.id);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

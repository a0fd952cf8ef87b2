//! Book domain service.
//!
//! Keeps the relational store and the search index consistent. The store is
//! authoritative and always written first; the index is a best-effort mirror
//! whose failed writes are parked in the backlog for `reconcile_index`.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{
            Book, BookDocument, BookFields, BookSummary, DeleteReport, IndexAction, IndexSync,
            UpdateBook, WriteOutcome,
        },
        query::{BookPage, BookQuery},
    },
    repository::BookStore,
    services::search::{IndexError, SearchIndex},
};

/// Outcome of a backlog drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReconcileReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Backlog size after this pass
    pub remaining: i64,
}

/// Parse string-encoded ids, silently dropping anything that is not an integer
fn parse_ids(ids: &[String]) -> Vec<i64> {
    let mut parsed: Vec<i64> = ids
        .iter()
        .filter_map(|raw| match raw.trim().parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::debug!("Ignoring unparseable book id '{}'", raw);
                None
            }
        })
        .collect();
    parsed.sort_unstable();
    parsed.dedup();
    parsed
}

#[derive(Clone)]
pub struct BooksService {
    store: Arc<dyn BookStore>,
    index: Arc<dyn SearchIndex>,
}

impl BooksService {
    pub fn new(store: Arc<dyn BookStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self { store, index }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create a book, then mirror it into the index
    pub async fn add_book(&self, fields: BookFields) -> AppResult<WriteOutcome<Book>> {
        fields.validate()?;

        let book = self.store.add(&fields).await?;
        tracing::info!("Added book {} '{}' (ISBN {})", book.id, book.title, book.isbn);

        let index = self.mirror_upsert(&book).await;
        Ok(WriteOutcome { value: book, index })
    }

    /// Tombstone books, then remove each one from the index independently.
    /// Unknown, already deleted and unparseable ids are ignored.
    pub async fn delete_books(&self, ids: &[String]) -> AppResult<WriteOutcome<DeleteReport>> {
        let ids = parse_ids(ids);
        if ids.is_empty() {
            return Ok(WriteOutcome {
                value: DeleteReport { deleted: 0 },
                index: self.idle_sync(),
            });
        }

        let deleted = self.store.delete(&ids).await?;
        tracing::info!("Deleted {} of {} requested books", deleted, ids.len());

        if !self.index.is_enabled() {
            return Ok(WriteOutcome {
                value: DeleteReport { deleted },
                index: IndexSync::Disabled,
            });
        }

        let mut failed_ids = Vec::new();
        let mut last_reason = String::new();
        for id in &ids {
            if let Err(e) = self.index.delete_document(*id).await {
                tracing::warn!("Failed to remove book {} from search index: {}", id, e);
                self.record_pending(*id, IndexAction::Delete, &e).await;
                failed_ids.push(*id);
                last_reason = e.to_string();
            }
        }

        let index = if failed_ids.is_empty() {
            IndexSync::Synced
        } else {
            IndexSync::Pending {
                failed_ids,
                reason: last_reason,
            }
        };

        Ok(WriteOutcome {
            value: DeleteReport { deleted },
            index,
        })
    }

    /// Overwrite a book under the optimistic lock, then re-index the full record.
    ///
    /// The expected version is the caller's `version` or, when absent, the one
    /// read just before the write. A stale version fails with `VersionConflict`
    /// and is never retried here.
    pub async fn update_book(&self, id: i64, update: UpdateBook) -> AppResult<WriteOutcome<Book>> {
        update.validate()?;

        let expected = match update.version {
            Some(version) => version,
            None => self.store.get_by_id(id).await?.version,
        };

        let book = self
            .store
            .update_optimistic(id, expected, &update.fields)
            .await?;
        tracing::info!("Updated book {} to version {}", book.id, book.version);

        let index = self.mirror_upsert(&book).await;
        Ok(WriteOutcome { value: book, index })
    }

    // =========================================================================
    // Store reads
    // =========================================================================

    pub async fn get_book(&self, id: i64) -> AppResult<Book> {
        self.store.get_by_id(id).await
    }

    pub async fn get_book_by_isbn(&self, isbn: &str) -> AppResult<Book> {
        let isbn = isbn.trim();
        if isbn.is_empty() {
            return Err(AppError::BadRequest("isbn is required".to_string()));
        }
        self.store.get_by_isbn(isbn).await
    }

    /// Structured listing straight from the store
    pub async fn list_books(&self, query: &BookQuery) -> AppResult<BookPage> {
        let pagination = query.pagination();
        let (books, total) = self.store.list(&query.filter(), pagination).await?;
        let items = books.into_iter().map(BookSummary::from).collect();
        Ok(BookPage::new(items, total, pagination))
    }

    // =========================================================================
    // Index reads
    // =========================================================================

    /// Relevance search: keyword when given, field filters otherwise
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<BookPage> {
        let pagination = query.pagination();
        if !self.index.is_enabled() {
            return Ok(BookPage::empty(pagination));
        }

        let result = match query.keyword() {
            Some(keyword) => self.index.search_by_keyword(&keyword, pagination).await,
            None => self.index.search_by_filters(&query.filter(), pagination).await,
        };

        match degrade(result)? {
            Some(hits) => {
                let items = hits.documents.into_iter().map(BookSummary::from).collect();
                Ok(BookPage::new(items, hits.total, pagination))
            }
            None => Ok(BookPage::empty(pagination)),
        }
    }

    pub async fn search_by_title(&self, title: &str, exact: bool) -> AppResult<Vec<BookSummary>> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::BadRequest("title is required".to_string()));
        }
        if !self.index.is_enabled() {
            return Ok(Vec::new());
        }

        let docs = degrade(self.index.search_by_title(title, exact).await)?.unwrap_or_default();
        Ok(docs.into_iter().map(BookSummary::from).collect())
    }

    pub async fn search_by_content(&self, content: &str) -> AppResult<Vec<BookSummary>> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("content is required".to_string()));
        }
        if !self.index.is_enabled() {
            return Ok(Vec::new());
        }

        let docs = degrade(self.index.search_by_content(content).await)?.unwrap_or_default();
        Ok(docs.into_iter().map(BookSummary::from).collect())
    }

    // =========================================================================
    // Index maintenance
    // =========================================================================

    /// Create the index with its mapping. Returns false when no index is configured.
    pub async fn init_index(&self) -> AppResult<bool> {
        if !self.index.is_enabled() {
            tracing::info!("Search index disabled, nothing to initialize");
            return Ok(false);
        }
        self.index.create_index().await?;
        Ok(true)
    }

    /// What the index currently holds for a book, for drift diagnosis.
    /// `None` when the document is absent or no index is configured.
    pub async fn indexed_document(&self, id: i64) -> AppResult<Option<BookDocument>> {
        if !self.index.is_enabled() {
            return Ok(None);
        }
        Ok(self.index.get_document(id).await?)
    }

    pub async fn pending_index_ops(&self) -> AppResult<i64> {
        self.store.count_pending_index_ops().await
    }

    /// Replay up to `limit` backlog entries, oldest first
    pub async fn reconcile_index(&self, limit: i64) -> AppResult<ReconcileReport> {
        if !self.index.is_enabled() {
            return Ok(ReconcileReport {
                remaining: self.store.count_pending_index_ops().await?,
                ..ReconcileReport::default()
            });
        }

        let ops = self.store.pending_index_ops(limit.max(1)).await?;
        let mut report = ReconcileReport {
            processed: ops.len(),
            ..ReconcileReport::default()
        };

        for op in ops {
            let result = match op.action {
                IndexAction::Upsert => match self.store.get_by_id(op.book_id).await {
                    Ok(book) => self.index.index_document(&BookDocument::from(&book)).await,
                    // Deleted since the failure: the mirror must not keep it
                    Err(AppError::NotFound(_)) => self.index.delete_document(op.book_id).await,
                    Err(e) => return Err(e),
                },
                IndexAction::Delete => self.index.delete_document(op.book_id).await,
            };

            match result {
                Ok(()) => {
                    self.store.complete_index_op(op.id).await?;
                    report.succeeded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Backlog {} ({} book {}) failed again: {}",
                        op.id,
                        op.action.as_str(),
                        op.book_id,
                        e
                    );
                    self.store.fail_index_op(op.id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        report.remaining = self.store.count_pending_index_ops().await?;
        tracing::info!(
            "Reconciled search index: {} processed, {} succeeded, {} failed, {} remaining",
            report.processed,
            report.succeeded,
            report.failed,
            report.remaining
        );
        Ok(report)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn idle_sync(&self) -> IndexSync {
        if self.index.is_enabled() {
            IndexSync::Synced
        } else {
            IndexSync::Disabled
        }
    }

    async fn mirror_upsert(&self, book: &Book) -> IndexSync {
        if !self.index.is_enabled() {
            return IndexSync::Disabled;
        }

        match self.index.index_document(&BookDocument::from(book)).await {
            Ok(()) => IndexSync::Synced,
            Err(e) => {
                tracing::warn!("Book {} stored but not indexed: {}", book.id, e);
                self.record_pending(book.id, IndexAction::Upsert, &e).await;
                IndexSync::Pending {
                    failed_ids: vec![book.id],
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Park a failed index write. The store write already committed, so a
    /// failure here is only logged.
    async fn record_pending(&self, book_id: i64, action: IndexAction, cause: &IndexError) {
        if let Err(e) = self
            .store
            .enqueue_index_op(book_id, action, &cause.to_string())
            .await
        {
            tracing::error!(
                "Failed to record pending {} for book {}: {}",
                action.as_str(),
                book_id,
                e
            );
        }
    }
}

/// Unavailable index degrades to "no result"; any other index error surfaces
fn degrade<T>(result: Result<T, IndexError>) -> AppResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_unavailable() => {
            tracing::warn!("Search index unavailable, returning empty result: {}", e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

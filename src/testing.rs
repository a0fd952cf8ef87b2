//! In-memory `BookStore` and `SearchIndex` used by unit tests

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookDocument, BookFields, IndexAction, PendingIndexOp},
        query::{BookFilter, Pagination},
    },
    repository::BookStore,
    services::search::{BulkReport, IndexError, IndexResult, SearchHits, SearchIndex},
};

pub fn book_fields(title: &str, author: &str, isbn: &str) -> BookFields {
    BookFields {
        title: title.to_string(),
        count: 1,
        isbn: isbn.to_string(),
        author: author.to_string(),
        content: format!("Full text of {}", title),
        summary: String::new(),
    }
}

/// The fixture catalogue used by listing and search tests
pub fn sample_catalogue() -> Vec<BookFields> {
    vec![
        book_fields("Go in Action", "William Kennedy", "9781617291784"),
        book_fields("Learning Go", "Jon Bodner", "9781492077213"),
        book_fields("The Way to Go", "Ivo Balbaert", "9781469769165"),
        book_fields("Programming Rust", "Jim Blandy", "9781492052593"),
        book_fields("Rust in Action", "Tim McNamara", "9781617294556"),
    ]
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

// =============================================================================
// Store
// =============================================================================

struct StoredBook {
    book: Book,
    deleted: bool,
}

#[derive(Default)]
struct StoreState {
    books: BTreeMap<i64, StoredBook>,
    next_id: i64,
    backlog: Vec<PendingIndexOp>,
    next_op_id: i64,
}

/// Mutex-guarded store; `update_optimistic` is a compare-and-swap under the lock
#[derive(Default)]
pub struct MemoryBookStore {
    state: Mutex<StoreState>,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backlog(&self) -> Vec<PendingIndexOp> {
        self.state.lock().unwrap().backlog.clone()
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn add(&self, fields: &BookFields) -> AppResult<Book> {
        let mut state = self.state.lock().unwrap();
        let duplicate = state
            .books
            .values()
            .any(|s| !s.deleted && s.book.isbn == fields.isbn);
        if duplicate {
            return Err(AppError::Conflict(format!(
                "A book with ISBN {} already exists",
                fields.isbn
            )));
        }

        state.next_id += 1;
        let now = Utc::now();
        let book = Book {
            id: state.next_id,
            title: fields.title.clone(),
            count: fields.count,
            isbn: fields.isbn.clone(),
            author: fields.author.clone(),
            content: fields.content.clone(),
            summary: fields.summary.clone(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        state.books.insert(book.id, StoredBook { book: book.clone(), deleted: false });
        Ok(book)
    }

    async fn get_by_id(&self, id: i64) -> AppResult<Book> {
        let state = self.state.lock().unwrap();
        state
            .books
            .get(&id)
            .filter(|s| !s.deleted)
            .map(|s| s.book.clone())
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn get_by_isbn(&self, isbn: &str) -> AppResult<Book> {
        let state = self.state.lock().unwrap();
        state
            .books
            .values()
            .find(|s| !s.deleted && s.book.isbn == isbn)
            .map(|s| s.book.clone())
            .ok_or_else(|| AppError::NotFound(format!("Book with ISBN {} not found", isbn)))
    }

    async fn delete(&self, ids: &[i64]) -> AppResult<u64> {
        let mut state = self.state.lock().unwrap();
        let mut deleted = 0;
        for id in ids {
            if let Some(stored) = state.books.get_mut(id) {
                if !stored.deleted {
                    stored.deleted = true;
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn update_optimistic(
        &self,
        id: i64,
        expected_version: i32,
        fields: &BookFields,
    ) -> AppResult<Book> {
        let mut state = self.state.lock().unwrap();
        let isbn_taken = state
            .books
            .values()
            .any(|s| !s.deleted && s.book.id != id && s.book.isbn == fields.isbn);

        let stored = match state.books.get_mut(&id) {
            Some(stored) if !stored.deleted => stored,
            _ => return Err(AppError::NotFound(format!("Book with id {} not found", id))),
        };
        if stored.book.version != expected_version {
            return Err(AppError::VersionConflict {
                id,
                expected: expected_version,
                current: Some(stored.book.version),
            });
        }
        if isbn_taken {
            return Err(AppError::Conflict(format!(
                "A book with ISBN {} already exists",
                fields.isbn
            )));
        }

        let book = &mut stored.book;
        book.title = fields.title.clone();
        book.count = fields.count;
        book.isbn = fields.isbn.clone();
        book.author = fields.author.clone();
        book.content = fields.content.clone();
        book.summary = fields.summary.clone();
        book.version += 1;
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn list(&self, filter: &BookFilter, pagination: Pagination) -> AppResult<(Vec<Book>, i64)> {
        let state = self.state.lock().unwrap();
        let matching: Vec<Book> = state
            .books
            .values()
            .filter(|s| !s.deleted)
            .map(|s| &s.book)
            .filter(|b| filter.title.as_deref().map_or(true, |t| contains_ci(&b.title, t)))
            .filter(|b| filter.isbn.as_deref().map_or(true, |i| b.isbn == i))
            .filter(|b| filter.author.as_deref().map_or(true, |a| contains_ci(&b.author, a)))
            .filter(|b| filter.content.as_deref().map_or(true, |c| contains_ci(&b.content, c)))
            .cloned()
            .collect();

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.page_size as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_after(&self, after_id: i64, limit: i64) -> AppResult<Vec<Book>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .books
            .range(after_id + 1..)
            .filter(|(_, s)| !s.deleted)
            .take(limit as usize)
            .map(|(_, s)| s.book.clone())
            .collect())
    }

    async fn enqueue_index_op(&self, book_id: i64, action: IndexAction, error: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        state.next_op_id += 1;
        let op = PendingIndexOp {
            id: state.next_op_id,
            book_id,
            action,
            attempts: 0,
            last_error: Some(error.to_string()),
            created_at: Utc::now(),
        };
        state.backlog.push(op);
        Ok(())
    }

    async fn pending_index_ops(&self, limit: i64) -> AppResult<Vec<PendingIndexOp>> {
        let state = self.state.lock().unwrap();
        Ok(state.backlog.iter().take(limit as usize).cloned().collect())
    }

    async fn complete_index_op(&self, op_id: i64) -> AppResult<()> {
        self.state.lock().unwrap().backlog.retain(|op| op.id != op_id);
        Ok(())
    }

    async fn fail_index_op(&self, op_id: i64, error: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(op) = state.backlog.iter_mut().find(|op| op.id == op_id) {
            op.attempts += 1;
            op.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn count_pending_index_ops(&self) -> AppResult<i64> {
        Ok(self.state.lock().unwrap().backlog.len() as i64)
    }
}

// =============================================================================
// Index
// =============================================================================

/// Substring-matching index. `set_unavailable(true)` makes every call fail
/// as if the cluster were unreachable.
#[derive(Default)]
pub struct MemoryIndex {
    docs: Mutex<BTreeMap<i64, BookDocument>>,
    unavailable: AtomicBool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn document(&self, id: i64) -> Option<BookDocument> {
        self.docs.lock().unwrap().get(&id).cloned()
    }

    fn check(&self) -> IndexResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(IndexError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    /// Matches newest id first, like the ranked sort on equal scores
    fn matching(&self, predicate: impl Fn(&BookDocument) -> bool) -> Vec<BookDocument> {
        self.docs
            .lock()
            .unwrap()
            .values()
            .rev()
            .filter(|d| predicate(*d))
            .cloned()
            .collect()
    }

    fn page(docs: Vec<BookDocument>, pagination: Pagination) -> SearchHits {
        let total = docs.len() as i64;
        let documents = docs
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.page_size as usize)
            .collect();
        SearchHits { total, documents }
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn ping(&self) -> IndexResult<()> {
        self.check()
    }

    async fn create_index(&self) -> IndexResult<()> {
        self.check()
    }

    async fn delete_index(&self) -> IndexResult<()> {
        self.check()?;
        self.docs.lock().unwrap().clear();
        Ok(())
    }

    async fn index_document(&self, doc: &BookDocument) -> IndexResult<()> {
        self.check()?;
        self.docs.lock().unwrap().insert(doc.id, doc.clone());
        Ok(())
    }

    async fn bulk_index(&self, docs: &[BookDocument]) -> IndexResult<BulkReport> {
        self.check()?;
        let mut stored = self.docs.lock().unwrap();
        for doc in docs {
            stored.insert(doc.id, doc.clone());
        }
        Ok(BulkReport { indexed: docs.len(), failed: Vec::new() })
    }

    async fn delete_document(&self, id: i64) -> IndexResult<()> {
        self.check()?;
        self.docs.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn get_document(&self, id: i64) -> IndexResult<Option<BookDocument>> {
        self.check()?;
        Ok(self.document(id))
    }

    async fn search_by_keyword(&self, keyword: &str, pagination: Pagination) -> IndexResult<SearchHits> {
        self.check()?;
        let docs = self.matching(|d| {
            contains_ci(&d.title, keyword)
                || contains_ci(&d.author, keyword)
                || contains_ci(&d.summary, keyword)
                || contains_ci(&d.content, keyword)
        });
        Ok(Self::page(docs, pagination))
    }

    async fn search_by_filters(&self, filter: &BookFilter, pagination: Pagination) -> IndexResult<SearchHits> {
        self.check()?;
        let docs = self.matching(|d| {
            filter.title.as_deref().map_or(true, |t| contains_ci(&d.title, t))
                && filter.isbn.as_deref().map_or(true, |i| d.isbn == i)
                && filter.author.as_deref().map_or(true, |a| contains_ci(&d.author, a))
                && filter.content.as_deref().map_or(true, |c| contains_ci(&d.content, c))
        });
        Ok(Self::page(docs, pagination))
    }

    async fn search_by_title(&self, title: &str, exact: bool) -> IndexResult<Vec<BookDocument>> {
        self.check()?;
        Ok(self.matching(|d| if exact { d.title == title } else { contains_ci(&d.title, title) }))
    }

    async fn search_by_content(&self, content: &str) -> IndexResult<Vec<BookDocument>> {
        self.check()?;
        Ok(self.matching(|d| contains_ci(&d.content, content)))
    }
}

//! Book model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Canonical book record, owned by the relational store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub count: i64,
    pub isbn: String,
    pub author: String,
    pub content: String,
    pub summary: String,
    /// Optimistic lock version, starts at 1
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Writable book fields, used for creation and full overwrite on update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct BookFields {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    #[validate(range(min = 0, message = "Count must not be negative"))]
    pub count: i64,
    #[validate(length(min = 1, max = 17, message = "ISBN must be 1-17 characters"))]
    pub isbn: String,
    #[serde(default)]
    #[validate(length(max = 100, message = "Author must be at most 100 characters"))]
    pub author: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub summary: String,
}

/// Update request: full field overwrite guarded by the optimistic lock
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[serde(flatten)]
    #[validate(nested)]
    pub fields: BookFields,
    /// Version the client last read. When omitted, the version read just
    /// before the write is used.
    #[serde(default)]
    pub version: Option<i32>,
}

/// Book representation for lists and search hits (content omitted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BookSummary {
    pub id: i64,
    pub title: String,
    pub count: i64,
    pub isbn: String,
    pub author: String,
    pub summary: String,
}

impl From<Book> for BookSummary {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            count: book.count,
            isbn: book.isbn,
            author: book.author,
            summary: book.summary,
        }
    }
}

/// Search index mirror of a book. Carries no version: the index is
/// overwritten wholesale on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BookDocument {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub summary: String,
}

impl From<&Book> for BookDocument {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            count: book.count,
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            content: book.content.clone(),
            summary: book.summary.clone(),
        }
    }
}

impl From<BookDocument> for BookSummary {
    fn from(doc: BookDocument) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            count: doc.count,
            isbn: doc.isbn,
            author: doc.author,
            summary: doc.summary,
        }
    }
}

/// State of the index mirror after a store write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexSync {
    /// Store and index agree
    Synced,
    /// Store write committed, index write failed; backlog entries were recorded
    Pending { failed_ids: Vec<i64>, reason: String },
    /// No search index is configured
    Disabled,
}

impl IndexSync {
    pub fn is_synced(&self) -> bool {
        matches!(self, IndexSync::Synced)
    }
}

/// Result of a dual write: the store value plus the index mirror status
#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome<T> {
    #[serde(flatten)]
    pub value: T,
    pub index: IndexSync,
}

/// Outcome of a delete request
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeleteReport {
    /// Number of rows tombstoned by this call
    pub deleted: u64,
}

/// Kind of pending index mirror operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexAction {
    Upsert,
    Delete,
}

impl IndexAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexAction::Upsert => "upsert",
            IndexAction::Delete => "delete",
        }
    }
}

impl std::str::FromStr for IndexAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(IndexAction::Upsert),
            "delete" => Ok(IndexAction::Delete),
            _ => Err(format!("Invalid index action: {}", s)),
        }
    }
}

/// Backlog row for an index write that did not land
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingIndexOp {
    pub id: i64,
    pub book_id: i64,
    pub action: IndexAction,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

//! Repository layer for database operations

pub mod books;
pub mod users;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookFields, IndexAction, PendingIndexOp},
        query::{BookFilter, Pagination},
    },
};

/// Canonical book storage.
///
/// Mutual exclusion for updates is delegated to the storage layer:
/// `update_optimistic` must be a single compare-and-swap on `version`.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Insert a new book with `version = 1`
    async fn add(&self, fields: &BookFields) -> AppResult<Book>;

    /// Get a live (non-tombstoned) book by id
    async fn get_by_id(&self, id: i64) -> AppResult<Book>;

    /// Get a live book by ISBN
    async fn get_by_isbn(&self, isbn: &str) -> AppResult<Book>;

    /// Tombstone live books among `ids`, returning how many rows changed.
    /// Unknown or already deleted ids are ignored.
    async fn delete(&self, ids: &[i64]) -> AppResult<u64>;

    /// Overwrite all fields if the stored version still equals `expected_version`.
    /// Fails with `NotFound` or `VersionConflict`.
    async fn update_optimistic(
        &self,
        id: i64,
        expected_version: i32,
        fields: &BookFields,
    ) -> AppResult<Book>;

    /// Filtered, paginated listing with the pre-pagination total
    async fn list(&self, filter: &BookFilter, pagination: Pagination) -> AppResult<(Vec<Book>, i64)>;

    /// Keyset page of live books with `id > after_id`, ordered by id
    async fn list_after(&self, after_id: i64, limit: i64) -> AppResult<Vec<Book>>;

    // Index backlog

    async fn enqueue_index_op(&self, book_id: i64, action: IndexAction, error: &str) -> AppResult<()>;

    /// Oldest pending operations first
    async fn pending_index_ops(&self, limit: i64) -> AppResult<Vec<PendingIndexOp>>;

    async fn complete_index_op(&self, op_id: i64) -> AppResult<()>;

    async fn fail_index_op(&self, op_id: i64, error: &str) -> AppResult<()>;

    async fn count_pending_index_ops(&self) -> AppResult<i64>;
}

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub users: users::UsersRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            users: users::UsersRepository::new(pool.clone()),
            pool,
        }
    }

    /// Round-trip to the database, used by the readiness probe
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

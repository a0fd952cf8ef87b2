//! Books repository for database operations.
//!
//! Rows are never hard-deleted: `deleted_at` marks a tombstone and every
//! read filters on `deleted_at IS NULL`.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder, Row};

use super::BookStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookFields, IndexAction, PendingIndexOp},
        query::{BookFilter, Pagination},
    },
};

const BOOK_COLUMNS: &str =
    "id, title, count, isbn, author, content, summary, version, created_at, updated_at";

/// Same columns without the long `content` text, for list pages
const BOOK_LIST_COLUMNS: &str =
    "id, title, count, isbn, author, '' AS content, summary, version, created_at, updated_at";

/// Escape LIKE metacharacters and wrap for substring matching
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Append the conjunctive filter predicates. The builder must already
/// contain a `WHERE` clause.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &BookFilter) {
    if let Some(ref title) = filter.title {
        qb.push(" AND title ILIKE ").push_bind(like_pattern(title));
    }
    if let Some(ref isbn) = filter.isbn {
        qb.push(" AND isbn = ").push_bind(isbn.clone());
    }
    if let Some(ref author) = filter.author {
        qb.push(" AND author ILIKE ").push_bind(like_pattern(author));
    }
    if let Some(ref content) = filter.content {
        qb.push(" AND content ILIKE ").push_bind(like_pattern(content));
    }
}

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    // =========================================================================
    // CREATE
    // =========================================================================

    async fn add(&self, fields: &BookFields) -> AppResult<Book> {
        let book = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, count, isbn, author, content, summary, version)
            VALUES ($1, $2, $3, $4, $5, $6, 1)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&fields.title)
        .bind(fields.count)
        .bind(&fields.isbn)
        .bind(&fields.author)
        .bind(&fields.content)
        .bind(&fields.summary)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("A book with ISBN {} already exists", fields.isbn))
            }
            other => other,
        })?;

        Ok(book)
    }

    // =========================================================================
    // READ
    // =========================================================================

    async fn get_by_id(&self, id: i64) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1 AND deleted_at IS NULL",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn get_by_isbn(&self, isbn: &str) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE isbn = $1 AND deleted_at IS NULL",
            BOOK_COLUMNS
        ))
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with ISBN {} not found", isbn)))
    }

    async fn list(&self, filter: &BookFilter, pagination: Pagination) -> AppResult<(Vec<Book>, i64)> {
        let mut count_query =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books WHERE deleted_at IS NULL");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select_query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM books WHERE deleted_at IS NULL",
            BOOK_LIST_COLUMNS
        ));
        push_filters(&mut select_query, filter);
        select_query
            .push(" ORDER BY id LIMIT ")
            .push_bind(pagination.page_size)
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let books = select_query
            .build_query_as::<Book>()
            .fetch_all(&self.pool)
            .await?;

        Ok((books, total))
    }

    async fn list_after(&self, after_id: i64, limit: i64) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!(
            r#"
            SELECT {} FROM books
            WHERE id > $1 AND deleted_at IS NULL
            ORDER BY id
            LIMIT $2
            "#,
            BOOK_COLUMNS
        ))
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    // =========================================================================
    // UPDATE (optimistic lock)
    // =========================================================================

    async fn update_optimistic(
        &self,
        id: i64,
        expected_version: i32,
        fields: &BookFields,
    ) -> AppResult<Book> {
        // Single statement: the version check and the write are atomic.
        let updated = sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books SET
                title = $1,
                count = $2,
                isbn = $3,
                author = $4,
                content = $5,
                summary = $6,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $7 AND version = $8 AND deleted_at IS NULL
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&fields.title)
        .bind(fields.count)
        .bind(&fields.isbn)
        .bind(&fields.author)
        .bind(&fields.content)
        .bind(&fields.summary)
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("A book with ISBN {} already exists", fields.isbn))
            }
            other => other,
        })?;

        if let Some(book) = updated {
            return Ok(book);
        }

        // Zero rows: tell a missing row apart from a stale version
        let current: Option<i32> =
            sqlx::query_scalar("SELECT version FROM books WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Err(AppError::NotFound(format!("Book with id {} not found", id))),
            Some(current) => Err(AppError::VersionConflict {
                id,
                expected: expected_version,
                current: Some(current),
            }),
        }
    }

    // =========================================================================
    // DELETE (tombstone)
    // =========================================================================

    async fn delete(&self, ids: &[i64]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE books SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = ANY($1) AND deleted_at IS NULL
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // INDEX BACKLOG
    // =========================================================================

    async fn enqueue_index_op(&self, book_id: i64, action: IndexAction, error: &str) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO book_index_backlog (book_id, action, last_error) VALUES ($1, $2, $3)",
        )
        .bind(book_id)
        .bind(action.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_index_ops(&self, limit: i64) -> AppResult<Vec<PendingIndexOp>> {
        let rows = sqlx::query(
            r#"
            SELECT id, book_id, action, attempts, last_error, created_at
            FROM book_index_backlog
            ORDER BY id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let action: String = r.get("action");
                Ok(PendingIndexOp {
                    id: r.get("id"),
                    book_id: r.get("book_id"),
                    action: action.parse().map_err(AppError::Internal)?,
                    attempts: r.get("attempts"),
                    last_error: r.get("last_error"),
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }

    async fn complete_index_op(&self, op_id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM book_index_backlog WHERE id = $1")
            .bind(op_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail_index_op(&self, op_id: i64, error: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE book_index_backlog
            SET attempts = attempts + 1, last_error = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(op_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_pending_index_ops(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book_index_backlog")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

//! Book endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookFields, BookSummary, DeleteReport, UpdateBook, WriteOutcome},
        query::{BookPage, BookQuery},
    },
};

use super::AuthenticatedUser;

/// Title search parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct TitleSearchQuery {
    pub title: String,
    /// Match the whole title exactly instead of analyzed terms
    #[serde(default)]
    pub exact: bool,
}

/// Content search parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ContentSearchQuery {
    pub content: String,
}

/// Ids to delete, repeated (`ids=1&ids=2`) or comma separated
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteQuery {
    #[serde(default)]
    pub ids: Vec<String>,
}

impl DeleteQuery {
    fn ids(&self) -> Vec<String> {
        self.ids
            .iter()
            .flat_map(|raw| raw.split(','))
            .map(str::to_string)
            .collect()
    }
}

/// List books from the store with structured filters
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "Page of books", body = BookPage),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<BookPage>> {
    let page = state.services.books.list_books(&query).await?;
    Ok(Json(page))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Book>> {
    let book = state.services.books.get_book(id).await?;
    Ok(Json(book))
}

/// Get a live book by ISBN
#[utoipa::path(
    get,
    path = "/books/isbn/{isbn}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("isbn" = String, Path, description = "Book ISBN")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book_by_isbn(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(isbn): Path<String>,
) -> AppResult<Json<Book>> {
    let book = state.services.books.get_book_by_isbn(&isbn).await?;
    Ok(Json(book))
}

/// Create a new book
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = BookFields,
    responses(
        (status = 201, description = "Book created; `index` reports the search mirror status", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Administrator privileges required"),
        (status = 409, description = "ISBN already exists")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(fields): Json<BookFields>,
) -> AppResult<(StatusCode, Json<WriteOutcome<Book>>)> {
    claims.require_admin()?;

    let outcome = state.services.books.add_book(fields).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Overwrite a book under the optimistic lock
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Version conflict or duplicate ISBN", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(update): Json<UpdateBook>,
) -> AppResult<Json<WriteOutcome<Book>>> {
    claims.require_admin()?;

    let outcome = state.services.books.update_book(id, update).await?;
    Ok(Json(outcome))
}

/// Delete books by id. Unknown ids are ignored.
#[utoipa::path(
    delete,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(DeleteQuery),
    responses(
        (status = 200, description = "Books deleted", body = DeleteReport),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn delete_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    axum_extra::extract::Query(query): axum_extra::extract::Query<DeleteQuery>,
) -> AppResult<Json<WriteOutcome<DeleteReport>>> {
    claims.require_admin()?;

    let outcome = state.services.books.delete_books(&query.ids()).await?;
    Ok(Json(outcome))
}

/// Relevance search through the index (keyword, or field filters)
#[utoipa::path(
    get,
    path = "/books/search",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "Ranked page of books", body = BookPage),
        (status = 502, description = "Search index error")
    )
)]
pub async fn search_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<BookPage>> {
    let page = state.services.books.search_books(&query).await?;
    Ok(Json(page))
}

/// Search by title, exact or analyzed
#[utoipa::path(
    get,
    path = "/books/search/title",
    tag = "books",
    security(("bearer_auth" = [])),
    params(TitleSearchQuery),
    responses(
        (status = 200, description = "Matching books, best first", body = Vec<BookSummary>),
        (status = 400, description = "Missing title")
    )
)]
pub async fn search_by_title(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<TitleSearchQuery>,
) -> AppResult<Json<Vec<BookSummary>>> {
    let books = state
        .services
        .books
        .search_by_title(&query.title, query.exact)
        .await?;
    Ok(Json(books))
}

/// Search book content
#[utoipa::path(
    get,
    path = "/books/search/content",
    tag = "books",
    security(("bearer_auth" = [])),
    params(ContentSearchQuery),
    responses(
        (status = 200, description = "Matching books, best first", body = Vec<BookSummary>),
        (status = 400, description = "Missing content")
    )
)]
pub async fn search_by_content(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<ContentSearchQuery>,
) -> AppResult<Json<Vec<BookSummary>>> {
    let books = state.services.books.search_by_content(&query.content).await?;
    Ok(Json(books))
}

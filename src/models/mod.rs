//! Data models for Libris

pub mod book;
pub mod query;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookDocument, BookFields, BookSummary, IndexSync, UpdateBook, WriteOutcome};
pub use query::{BookFilter, BookPage, BookQuery, Pagination};
pub use user::{Role, User, UserClaims};

//! Libris Library Inventory Server
//!
//! REST JSON API over a PostgreSQL book store, mirrored into an
//! Elasticsearch index for relevance search.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

#[cfg(test)]
pub mod testing;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    /// Cancelled on shutdown; long-running admin jobs check it between steps
    pub shutdown: services::reindex::CancellationToken,
}

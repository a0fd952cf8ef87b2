//! Business logic services

pub mod books;
pub mod reindex;
pub mod search;
pub mod users;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::AppResult,
    repository::{BookStore, Repository},
};

use search::SearchIndex;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub books: books::BooksService,
    pub reindex: reindex::ReindexService,
    pub users: users::UsersService,
    pub index: Arc<dyn SearchIndex>,
    repository: Repository,
}

impl Services {
    /// Create all services over the Postgres repository
    pub fn new(repository: Repository, config: &AppConfig, index: Arc<dyn SearchIndex>) -> Self {
        let store: Arc<dyn BookStore> = Arc::new(repository.books.clone());
        Self::with_store(repository, store, config, index)
    }

    /// Same as `new` with an explicit book store
    pub fn with_store(
        repository: Repository,
        store: Arc<dyn BookStore>,
        config: &AppConfig,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            books: books::BooksService::new(store.clone(), index.clone()),
            reindex: reindex::ReindexService::new(
                store,
                index.clone(),
                config.search.reindex_batch_size,
            ),
            users: users::UsersService::new(repository.users.clone(), config.auth.clone()),
            index,
            repository,
        }
    }

    pub async fn ping_database(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}

//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{admin, auth, books, health};

/// Registers the JWT bearer scheme referenced by `security(("bearer_auth" = []))`
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "0.3.0",
        description = "Library inventory REST API with a search index mirror",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::me,
        // Books
        books::list_books,
        books::get_book,
        books::get_book_by_isbn,
        books::create_book,
        books::update_book,
        books::delete_books,
        books::search_books,
        books::search_by_title,
        books::search_by_content,
        // Index administration
        admin::init_index,
        admin::reindex,
        admin::reconcile,
        admin::indexed_document,
    ),
    components(
        schemas(
            // Auth
            crate::models::user::Role,
            crate::models::user::User,
            crate::models::user::RegisterRequest,
            crate::models::user::LoginRequest,
            crate::models::user::LoginResponse,
            // Books
            crate::models::book::Book,
            crate::models::book::BookFields,
            crate::models::book::UpdateBook,
            crate::models::book::BookSummary,
            crate::models::book::DeleteReport,
            crate::models::book::BookDocument,
            crate::models::query::BookQuery,
            crate::models::query::BookPage,
            books::TitleSearchQuery,
            books::ContentSearchQuery,
            // Index administration
            admin::InitIndexResponse,
            crate::services::books::ReconcileReport,
            crate::services::reindex::ReindexOptions,
            crate::services::reindex::ReindexReport,
            crate::services::reindex::ReindexStatus,
            // Health
            health::HealthResponse,
            health::ReadinessResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "books", description = "Book inventory and search"),
        (name = "admin", description = "Search index administration")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

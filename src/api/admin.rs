//! Search index administration endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{AppError, AppResult},
    models::book::BookDocument,
    services::{
        books::ReconcileReport,
        reindex::{ReindexOptions, ReindexReport},
    },
};

use super::AuthenticatedUser;

const DEFAULT_RECONCILE_LIMIT: i64 = 100;

#[derive(Serialize, ToSchema)]
pub struct InitIndexResponse {
    /// `created` or `disabled`
    pub status: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReconcileQuery {
    /// Maximum backlog entries to replay (default: 100)
    pub limit: Option<i64>,
}

/// Create the search index and its mapping
#[utoipa::path(
    post,
    path = "/admin/index/init",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Index ready", body = InitIndexResponse),
        (status = 403, description = "Administrator privileges required"),
        (status = 502, description = "Search index error")
    )
)]
pub async fn init_index(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<InitIndexResponse>> {
    claims.require_admin()?;

    let created = state.services.books.init_index().await?;
    let status = if created { "created" } else { "disabled" };
    Ok(Json(InitIndexResponse {
        status: status.to_string(),
    }))
}

/// Rebuild the search index from the store
#[utoipa::path(
    post,
    path = "/admin/index/reindex",
    tag = "admin",
    security(("bearer_auth" = [])),
    request_body(content = ReindexOptions, description = "Pass `resume_after` to continue a cancelled run"),
    responses(
        (status = 200, description = "Reindex report", body = ReindexReport),
        (status = 403, description = "Administrator privileges required"),
        (status = 502, description = "Index could not be created")
    )
)]
pub async fn reindex(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    options: Option<Json<ReindexOptions>>,
) -> AppResult<Json<ReindexReport>> {
    claims.require_admin()?;

    let options = options.map(|Json(o)| o).unwrap_or_default();
    tracing::info!("Reindex requested by '{}'", claims.sub);

    let report = state
        .services
        .reindex
        .reindex_all(options, &state.shutdown)
        .await?;
    Ok(Json(report))
}

/// Replay pending index writes from the backlog
#[utoipa::path(
    post,
    path = "/admin/index/reconcile",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(ReconcileQuery),
    responses(
        (status = 200, description = "Reconcile report", body = ReconcileReport),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn reconcile(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ReconcileQuery>,
) -> AppResult<Json<ReconcileReport>> {
    claims.require_admin()?;

    let limit = query.limit.unwrap_or(DEFAULT_RECONCILE_LIMIT);
    let report = state.services.books.reconcile_index(limit).await?;
    Ok(Json(report))
}

/// Show the indexed copy of a book
#[utoipa::path(
    get,
    path = "/admin/index/documents/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Indexed document", body = BookDocument),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Not in the index")
    )
)]
pub async fn indexed_document(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<BookDocument>> {
    claims.require_admin()?;

    state
        .services
        .books
        .indexed_document(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Book {} is not indexed", id)))
}

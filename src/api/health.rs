//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Current status of the service
    pub status: String,
    /// Version of the service
    pub version: String,
}

#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    /// `ready` or `unavailable`
    pub status: String,
    pub version: String,
    /// `up` or `down`
    pub database: String,
    /// `up`, `down` or `disabled`; a down index does not fail readiness
    pub search_index: String,
    /// Index writes waiting in the backlog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_index_ops: Option<i64>,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check endpoint (database and search index connectivity)
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Database unreachable", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(
    State(state): State<crate::AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let services = &state.services;

    let database_up = match services.ping_database().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Readiness: database unreachable: {}", e);
            false
        }
    };

    let search_index = if !services.index.is_enabled() {
        "disabled"
    } else {
        match services.index.ping().await {
            Ok(()) => "up",
            Err(e) => {
                tracing::warn!("Readiness: search index unreachable: {}", e);
                "down"
            }
        }
    };

    let pending_index_ops = if database_up {
        services.books.pending_index_ops().await.ok()
    } else {
        None
    };

    let status = if database_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            status: if database_up { "ready" } else { "unavailable" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: if database_up { "up" } else { "down" }.to_string(),
            search_index: search_index.to_string(),
            pending_index_ops,
        }),
    )
}

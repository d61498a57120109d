// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Application state, service-level handlers and router construction.
//!
//! This module is `pub` so that integration tests can build a test router directly
//! without starting the full binary.

use crate::models::version::{HealthResponse, VersionResponse};
use crate::routes::{
    admin_router, applications_router, auth_router, messages_router, AdminApiDoc,
    ApplicationsApiDoc, AuthApiDoc, MessagesApiDoc,
};
use crate::services::applications::ApplicationService;
use crate::services::auth::{AuthConfig, AuthService};
use crate::services::auth_db::AuthDbClient;
use crate::services::db::PortalDb;
use crate::services::email::EmailService;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use sqlx::PgPool;
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application version extracted from `Cargo.toml` at compile time.
/// The patch segment can be overridden via `PORTAL_PATCH_VERSION` (see `build.rs`).
pub const VERSION: &str = env!("PORTAL_VERSION");

/// Service name reported by `/version`.
pub const SERVICE_NAME: &str = "grant-portal";

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Shared application state injected into every route handler via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub applications: Arc<ApplicationService>,
}

impl AppState {
    /// Wire the services over one connection pool and one mailer.
    pub fn new(pool: PgPool, email: EmailService, auth_config: AuthConfig) -> anyhow::Result<Self> {
        let email = Arc::new(email);
        let auth_db = AuthDbClient::new(pool.clone());

        let auth_service = AuthService::new(auth_db.clone(), email.clone(), auth_config)?;
        let applications = ApplicationService::new(PortalDb::new(pool), auth_db, email);

        Ok(Self {
            auth_service: Arc::new(auth_service),
            applications: Arc::new(applications),
        })
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(version_handler, health_handler),
    components(schemas(VersionResponse, HealthResponse)),
    tags((name = "service", description = "Version and health"))
)]
struct ServiceApiDoc;

#[utoipa::path(
    get,
    path = "/version",
    responses((status = 200, description = "Service name and version", body = VersionResponse)),
    tag = "service"
)]
pub async fn version_handler() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: SERVICE_NAME.to_string(),
        version: VERSION.to_string(),
    })
}

/// Report whether the database is reachable.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    ),
    tag = "service"
)]
pub async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let database = state.applications.ping().await;
    let (status, label) = if database {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            database,
        }),
    )
}

/// Combined OpenAPI document for every route group.
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ServiceApiDoc::openapi();
    doc.merge(AuthApiDoc::openapi());
    doc.merge(ApplicationsApiDoc::openapi());
    doc.merge(MessagesApiDoc::openapi());
    doc.merge(AdminApiDoc::openapi());
    doc
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the Axum application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/version", get(version_handler))
        .route("/health", get(health_handler))
        .merge(applications_router())
        .merge(messages_router())
        .nest("/auth", auth_router())
        .nest("/admin", admin_router())
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
}

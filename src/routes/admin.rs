// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Admin routes: user management, application review and portal settings.

use crate::app::AppState;
use crate::error::ApiError;
use crate::models::admin::{
    ListUsersResponse, UpdateRoleRequest, UpdateUserStatusRequest, UserFilter,
};
use crate::models::application::{
    ApplicationFilter, ApplicationResponse, ApplicationStatus, ListApplicationsResponse,
    NotifyRequest, ScoreRequest, UpdateStatusRequest,
};
use crate::models::auth::{MessageResponse, UserResponse, UserRole, UserStatus};
use crate::models::message::MessageInfo;
use crate::models::settings::{SettingsResponse, UpdateSettingsRequest};
use crate::routes::parse_id;
use crate::services::auth_middleware::AdminUser;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        list_users_handler,
        get_user_handler,
        delete_user_handler,
        update_role_handler,
        update_user_status_handler,
        list_applications_handler,
        get_application_handler,
        update_status_handler,
        score_handler,
        notify_handler,
        get_settings_handler,
        update_settings_handler,
    ),
    components(schemas(
        UpdateRoleRequest,
        UpdateUserStatusRequest,
        ListUsersResponse,
        UpdateStatusRequest,
        ScoreRequest,
        NotifyRequest,
        UpdateSettingsRequest,
    )),
    tags((name = "admin", description = "User management and application review"))
)]
pub struct AdminApiDoc;

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users_handler))
        .route(
            "/users/{id}",
            get(get_user_handler).delete(delete_user_handler),
        )
        .route("/users/{id}/role", put(update_role_handler))
        .route("/users/{id}/status", put(update_user_status_handler))
        .route("/applications", get(list_applications_handler))
        .route("/applications/{id}", get(get_application_handler))
        .route("/applications/{id}/status", put(update_status_handler))
        .route("/applications/{id}/score", put(score_handler))
        .route("/applications/{id}/notify", post(notify_handler))
        .route(
            "/settings",
            get(get_settings_handler).put(update_settings_handler),
        )
}

fn parse_role(raw: &str) -> Result<UserRole, ApiError> {
    UserRole::parse(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid role: {raw}")))
}

fn parse_user_status(raw: &str) -> Result<UserStatus, ApiError> {
    UserStatus::parse(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid status: {raw}")))
}

fn parse_application_status(raw: &str) -> Result<ApplicationStatus, ApiError> {
    ApplicationStatus::parse(raw)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid status: {raw}")))
}

// ============================================================================
// Users
// ============================================================================

#[utoipa::path(
    get,
    path = "/admin/users",
    params(
        ("role" = Option<String>, Query, description = "applicant or admin"),
        ("status" = Option<String>, Query, description = "active or suspended")
    ),
    responses(
        (status = 200, description = "Users", body = ListUsersResponse),
        (status = 401, description = "Not signed in", body = MessageResponse),
        (status = 403, description = "Not an admin", body = MessageResponse)
    ),
    tag = "admin"
)]
async fn list_users_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(filter): Query<UserFilter>,
) -> Result<Json<ListUsersResponse>, ApiError> {
    let role = filter.role.as_deref().map(parse_role).transpose()?;
    let status = filter.status.as_deref().map(parse_user_status).transpose()?;

    let users: Vec<UserResponse> = state
        .auth_service
        .list_users(role, status)
        .await?
        .iter()
        .map(UserResponse::from)
        .collect();

    let count = users.len();
    Ok(Json(ListUsersResponse { users, count }))
}

#[utoipa::path(
    get,
    path = "/admin/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    ),
    tag = "admin"
)]
async fn get_user_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.auth_service.get_user(parse_id(&id)?).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// Delete a user and everything they own.
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse),
        (status = 409, description = "Can't delete yourself", body = MessageResponse)
    ),
    tag = "admin"
)]
async fn delete_user_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.auth_service.delete_user(&admin, parse_id(&id)?).await?;
    Ok(Json(MessageResponse::ok("User deleted")))
}

#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = String, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = UserResponse),
        (status = 400, description = "Unknown role", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse),
        (status = 409, description = "Can't change your own role", body = MessageResponse)
    ),
    tag = "admin"
)]
async fn update_role_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id = parse_id(&id)?;
    let role = parse_role(&payload.role)?;
    let user = state
        .auth_service
        .update_user_role(&admin, user_id, role)
        .await?;
    Ok(Json(UserResponse::from(&user)))
}

/// Suspend or reactivate a user. Suspension signs them out everywhere.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/status",
    params(("id" = String, Path, description = "User ID")),
    request_body = UpdateUserStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = UserResponse),
        (status = 400, description = "Unknown status", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse),
        (status = 409, description = "Can't change your own status", body = MessageResponse)
    ),
    tag = "admin"
)]
async fn update_user_status_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserStatusRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id = parse_id(&id)?;
    let status = parse_user_status(&payload.status)?;
    let user = state
        .auth_service
        .update_user_status(&admin, user_id, status)
        .await?;
    Ok(Json(UserResponse::from(&user)))
}

// ============================================================================
// Applications
// ============================================================================

/// List applications. Drafts are only listed when filtered for explicitly.
#[utoipa::path(
    get,
    path = "/admin/applications",
    params(("status" = Option<String>, Query, description = "Filter by status")),
    responses(
        (status = 200, description = "Applications", body = ListApplicationsResponse),
        (status = 400, description = "Unknown status", body = MessageResponse)
    ),
    tag = "admin"
)]
async fn list_applications_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(filter): Query<ApplicationFilter>,
) -> Result<Json<ListApplicationsResponse>, ApiError> {
    let status = filter
        .status
        .as_deref()
        .map(parse_application_status)
        .transpose()?;

    let applications: Vec<ApplicationResponse> = state
        .applications
        .list_all(status)
        .await?
        .iter()
        .map(ApplicationResponse::for_admin)
        .collect();

    let count = applications.len();
    Ok(Json(ListApplicationsResponse {
        applications,
        count,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/applications/{id}",
    params(("id" = String, Path, description = "Application ID")),
    responses(
        (status = 200, description = "Application", body = ApplicationResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    ),
    tag = "admin"
)]
async fn get_application_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<ApplicationResponse>, ApiError> {
    let app = state.applications.get_any(parse_id(&id)?).await?;
    Ok(Json(ApplicationResponse::for_admin(&app)))
}

#[utoipa::path(
    put,
    path = "/admin/applications/{id}/status",
    params(("id" = String, Path, description = "Application ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ApplicationResponse),
        (status = 400, description = "Unknown status", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse),
        (status = 409, description = "Transition not allowed", body = MessageResponse)
    ),
    tag = "admin"
)]
async fn update_status_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<ApplicationResponse>, ApiError> {
    let app_id = parse_id(&id)?;
    let status = parse_application_status(&payload.status)?;
    let app = state
        .applications
        .change_status(&admin, app_id, status, payload.reviewer_notes.as_deref())
        .await?;
    Ok(Json(ApplicationResponse::for_admin(&app)))
}

#[utoipa::path(
    put,
    path = "/admin/applications/{id}/score",
    params(("id" = String, Path, description = "Application ID")),
    request_body = ScoreRequest,
    responses(
        (status = 200, description = "Scored", body = ApplicationResponse),
        (status = 400, description = "Score out of range", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse),
        (status = 409, description = "Not in a scorable status", body = MessageResponse)
    ),
    tag = "admin"
)]
async fn score_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<ScoreRequest>,
) -> Result<Json<ApplicationResponse>, ApiError> {
    let app = state
        .applications
        .score(&admin, parse_id(&id)?, &payload)
        .await?;
    Ok(Json(ApplicationResponse::for_admin(&app)))
}

/// Message the applicant about their application and email them a copy.
#[utoipa::path(
    post,
    path = "/admin/applications/{id}/notify",
    params(("id" = String, Path, description = "Application ID")),
    request_body = NotifyRequest,
    responses(
        (status = 200, description = "Message stored", body = MessageInfo),
        (status = 400, description = "Empty subject or body", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    ),
    tag = "admin"
)]
async fn notify_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<NotifyRequest>,
) -> Result<Json<MessageInfo>, ApiError> {
    let message = state
        .applications
        .notify(&admin, parse_id(&id)?, &payload)
        .await?;
    Ok(Json(MessageInfo::from(&message)))
}

// ============================================================================
// Settings
// ============================================================================

#[utoipa::path(
    get,
    path = "/admin/settings",
    responses((status = 200, description = "Portal settings", body = SettingsResponse)),
    tag = "admin"
)]
async fn get_settings_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<SettingsResponse>, ApiError> {
    let settings = state.applications.settings().await?;
    Ok(Json(SettingsResponse::from(&settings)))
}

#[utoipa::path(
    put,
    path = "/admin/settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings updated", body = SettingsResponse),
        (status = 400, description = "Invalid deadline or amount", body = MessageResponse)
    ),
    tag = "admin"
)]
async fn update_settings_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let settings = state
        .applications
        .update_settings(&admin, &payload)
        .await?;
    Ok(Json(SettingsResponse::from(&settings)))
}

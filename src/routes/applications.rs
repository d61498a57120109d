// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Applicant routes: own applications and submission.

use crate::app::AppState;
use crate::error::ApiError;
use crate::models::application::{
    ApplicationRequest, ApplicationResponse, ListApplicationsResponse,
};
use crate::models::auth::{AuthUser, MessageResponse};
use crate::routes::parse_id;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        list_applications_handler,
        create_application_handler,
        get_application_handler,
        update_application_handler,
        delete_application_handler,
        submit_application_handler,
    ),
    components(schemas(
        ApplicationRequest,
        ApplicationResponse,
        ListApplicationsResponse,
    )),
    tags((name = "applications", description = "Applicant proposals"))
)]
pub struct ApplicationsApiDoc;

pub fn applications_router() -> Router<AppState> {
    Router::new()
        .route(
            "/applications",
            get(list_applications_handler).post(create_application_handler),
        )
        .route(
            "/applications/{id}",
            get(get_application_handler)
                .put(update_application_handler)
                .delete(delete_application_handler),
        )
        .route(
            "/applications/{id}/submit",
            post(submit_application_handler),
        )
}

/// List the caller's applications.
#[utoipa::path(
    get,
    path = "/applications",
    responses(
        (status = 200, description = "Own applications", body = ListApplicationsResponse),
        (status = 401, description = "Not signed in", body = MessageResponse)
    ),
    tag = "applications"
)]
async fn list_applications_handler(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ListApplicationsResponse>, ApiError> {
    let applications: Vec<ApplicationResponse> = state
        .applications
        .list_own(&user)
        .await?
        .iter()
        .map(ApplicationResponse::for_applicant)
        .collect();

    let count = applications.len();
    Ok(Json(ListApplicationsResponse {
        applications,
        count,
    }))
}

/// Start a new draft.
#[utoipa::path(
    post,
    path = "/applications",
    request_body = ApplicationRequest,
    responses(
        (status = 201, description = "Draft created", body = ApplicationResponse),
        (status = 400, description = "Invalid input", body = MessageResponse),
        (status = 401, description = "Not signed in", body = MessageResponse)
    ),
    tag = "applications"
)]
async fn create_application_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ApplicationRequest>,
) -> Result<(StatusCode, Json<ApplicationResponse>), ApiError> {
    let app = state.applications.create(&user, &payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApplicationResponse::for_applicant(&app)),
    ))
}

#[utoipa::path(
    get,
    path = "/applications/{id}",
    params(("id" = String, Path, description = "Application ID")),
    responses(
        (status = 200, description = "Application", body = ApplicationResponse),
        (status = 404, description = "Not found or not yours", body = MessageResponse)
    ),
    tag = "applications"
)]
async fn get_application_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApplicationResponse>, ApiError> {
    let app = state.applications.get_own(&user, parse_id(&id)?).await?;
    Ok(Json(ApplicationResponse::for_applicant(&app)))
}

/// Edit a draft.
#[utoipa::path(
    put,
    path = "/applications/{id}",
    params(("id" = String, Path, description = "Application ID")),
    request_body = ApplicationRequest,
    responses(
        (status = 200, description = "Draft updated", body = ApplicationResponse),
        (status = 400, description = "Invalid input", body = MessageResponse),
        (status = 404, description = "Not found or not yours", body = MessageResponse),
        (status = 409, description = "No longer a draft", body = MessageResponse)
    ),
    tag = "applications"
)]
async fn update_application_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<ApplicationRequest>,
) -> Result<Json<ApplicationResponse>, ApiError> {
    let app = state
        .applications
        .update(&user, parse_id(&id)?, &payload)
        .await?;
    Ok(Json(ApplicationResponse::for_applicant(&app)))
}

/// Delete a draft.
#[utoipa::path(
    delete,
    path = "/applications/{id}",
    params(("id" = String, Path, description = "Application ID")),
    responses(
        (status = 200, description = "Draft deleted", body = MessageResponse),
        (status = 404, description = "Not found or not yours", body = MessageResponse),
        (status = 409, description = "No longer a draft", body = MessageResponse)
    ),
    tag = "applications"
)]
async fn delete_application_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.applications.delete(&user, parse_id(&id)?).await?;
    Ok(Json(MessageResponse::ok("Application deleted")))
}

/// Submit a draft for review.
#[utoipa::path(
    post,
    path = "/applications/{id}/submit",
    params(("id" = String, Path, description = "Application ID")),
    responses(
        (status = 200, description = "Submitted", body = ApplicationResponse),
        (status = 400, description = "Requested amount over the maximum", body = MessageResponse),
        (
            status = 403,
            description = "Email unverified, submissions closed or deadline passed",
            body = MessageResponse
        ),
        (status = 404, description = "Not found or not yours", body = MessageResponse),
        (status = 409, description = "Already submitted", body = MessageResponse)
    ),
    tag = "applications"
)]
async fn submit_application_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApplicationResponse>, ApiError> {
    let app = state.applications.submit(&user, parse_id(&id)?).await?;
    Ok(Json(ApplicationResponse::for_applicant(&app)))
}

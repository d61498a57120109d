// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Applicant inbox and public portal settings.

use crate::app::AppState;
use crate::error::ApiError;
use crate::models::auth::{AuthUser, MessageResponse};
use crate::models::message::{ListMessagesResponse, MessageInfo};
use crate::models::settings::SettingsResponse;
use crate::routes::parse_id;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(list_messages_handler, mark_message_read_handler, get_settings_handler),
    components(schemas(MessageInfo, ListMessagesResponse, SettingsResponse)),
    tags((name = "messages", description = "Inbox and public settings"))
)]
pub struct MessagesApiDoc;

pub fn messages_router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(list_messages_handler))
        .route("/messages/{id}/read", post(mark_message_read_handler))
        .route("/settings", get(get_settings_handler))
}

/// Messages from the review team.
#[utoipa::path(
    get,
    path = "/messages",
    responses(
        (status = 200, description = "Inbox", body = ListMessagesResponse),
        (status = 401, description = "Not signed in", body = MessageResponse)
    ),
    tag = "messages"
)]
async fn list_messages_handler(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ListMessagesResponse>, ApiError> {
    let messages: Vec<MessageInfo> = state
        .applications
        .messages(&user)
        .await?
        .iter()
        .map(MessageInfo::from)
        .collect();

    let count = messages.len();
    let unread = messages.iter().filter(|m| !m.read).count();
    Ok(Json(ListMessagesResponse {
        messages,
        count,
        unread,
    }))
}

#[utoipa::path(
    post,
    path = "/messages/{id}/read",
    params(("id" = String, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Marked read", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    ),
    tag = "messages"
)]
async fn mark_message_read_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .applications
        .mark_message_read(&user, parse_id(&id)?)
        .await?;
    Ok(Json(MessageResponse::ok("Message marked as read")))
}

/// Whether submissions are open, the deadline and the funding cap.
#[utoipa::path(
    get,
    path = "/settings",
    responses((status = 200, description = "Portal settings", body = SettingsResponse)),
    tag = "messages"
)]
async fn get_settings_handler(
    State(state): State<AppState>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let settings = state.applications.settings().await?;
    Ok(Json(SettingsResponse::from(&settings)))
}

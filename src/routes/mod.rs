// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Route handlers for the HTTP API.

pub mod admin;
pub mod applications;
pub mod auth;
pub mod messages;

pub use admin::{admin_router, AdminApiDoc};
pub use applications::{applications_router, ApplicationsApiDoc};
pub use auth::{auth_router, AuthApiDoc};
pub use messages::{messages_router, MessagesApiDoc};

use crate::error::ApiError;
use uuid::Uuid;

/// Parse an id taken from the request path.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request("Invalid ID"))
}

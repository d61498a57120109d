// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use crate::models::auth::UserResponse;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request to change a user's role
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateRoleRequest {
    /// applicant or admin
    pub role: String,
}

/// Request to suspend or reactivate a user
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateUserStatusRequest {
    /// active or suspended
    pub status: String,
}

/// Query filter for the user listing
#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<String>,
    pub status: Option<String>,
}

/// Response for listing users
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListUsersResponse {
    pub users: Vec<UserResponse>,
    pub count: usize,
}

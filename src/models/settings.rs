// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Portal-wide submission settings (single row).
#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub submissions_open: bool,
    pub submission_deadline: Option<DateTime<Utc>>,
    pub max_requested_amount: Option<i64>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
}

impl PortalSettings {
    /// Whether a submission made at `now` is accepted.
    pub fn accepts_submissions_at(&self, now: DateTime<Utc>) -> bool {
        self.submissions_open && self.submission_deadline.is_none_or(|deadline| now <= deadline)
    }
}

/// Request to update portal settings
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct UpdateSettingsRequest {
    pub submissions_open: bool,
    /// RFC 3339 timestamp, or null for no deadline
    #[serde(default)]
    pub submission_deadline: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, message = "Maximum requested amount must be greater than zero"))]
    pub max_requested_amount: Option<i64>,
}

/// Response for portal settings
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SettingsResponse {
    pub submissions_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_deadline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requested_amount: Option<i64>,
    /// Open and not past the deadline right now
    pub accepting_submissions: bool,
}

impl From<&PortalSettings> for SettingsResponse {
    fn from(settings: &PortalSettings) -> Self {
        Self {
            submissions_open: settings.submissions_open,
            submission_deadline: settings.submission_deadline.map(|t| t.to_rfc3339()),
            max_requested_amount: settings.max_requested_amount,
            accepting_submissions: settings.accepts_submissions_at(Utc::now()),
        }
    }
}

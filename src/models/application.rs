// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Review status of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    UnderReview,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ApplicationStatus::Draft),
            "submitted" => Some(ApplicationStatus::Submitted),
            "under_review" => Some(ApplicationStatus::UnderReview),
            "accepted" => Some(ApplicationStatus::Accepted),
            "rejected" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }

    /// Only drafts can be edited or deleted by their owner.
    pub fn is_editable(&self) -> bool {
        matches!(self, ApplicationStatus::Draft)
    }

    pub fn can_be_scored(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Submitted | ApplicationStatus::UnderReview
        )
    }

    /// Transitions an admin may apply. Submitting a draft is the applicant's
    /// own action and is not part of this table.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (Submitted, UnderReview)
                | (Submitted, Rejected)
                | (Submitted, Draft)
                | (UnderReview, Accepted)
                | (UnderReview, Rejected)
                | (UnderReview, Draft)
        )
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application (project proposal) record from the database.
#[derive(Debug, Clone)]
pub struct Application {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub summary: String,
    pub description: String,
    pub category: Option<String>,
    pub requested_amount: i64,
    pub status: ApplicationStatus,
    pub score: Option<i32>,
    pub reviewer_notes: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// API Request Types
// ============================================================================

/// Fields an applicant fills in. Used for both create and update.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct ApplicationRequest {
    #[validate(
        custom(
            function = "crate::services::validation::not_blank",
            message = "Title cannot be empty"
        ),
        length(max = 200, message = "Title must be at most 200 characters")
    )]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Summary must be at most 1000 characters"))]
    pub summary: String,
    #[serde(default)]
    #[validate(length(max = 20000, message = "Description must be at most 20000 characters"))]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 200, message = "Category must be at most 200 characters"))]
    pub category: Option<String>,
    /// Requested funding in whole currency units
    #[validate(range(min = 1, message = "Requested amount must be greater than zero"))]
    pub requested_amount: i64,
}

/// Admin status change.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// One of draft, submitted, under_review, accepted, rejected
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_notes: Option<String>,
}

/// Admin score.
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct ScoreRequest {
    /// 0 to 100
    #[validate(range(min = 0, max = 100, message = "Score must be between 0 and 100"))]
    pub score: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_notes: Option<String>,
}

/// Admin message to the applicant about an application.
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct NotifyRequest {
    #[validate(
        custom(
            function = "crate::services::validation::not_blank",
            message = "Subject cannot be empty"
        ),
        length(max = 200, message = "Subject must be at most 200 characters")
    )]
    pub subject: String,
    #[validate(
        custom(
            function = "crate::services::validation::not_blank",
            message = "Message cannot be empty"
        ),
        length(max = 10000, message = "Message must be at most 10000 characters")
    )]
    pub body: String,
}

/// Query filter for admin listings.
#[derive(Debug, Default, Deserialize)]
pub struct ApplicationFilter {
    pub status: Option<String>,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApplicationResponse {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub summary: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub requested_amount: i64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ApplicationResponse {
    /// Applicants see their status and score but not the reviewer's notes.
    pub fn for_applicant(app: &Application) -> Self {
        Self {
            reviewer_notes: None,
            ..Self::for_admin(app)
        }
    }

    pub fn for_admin(app: &Application) -> Self {
        Self {
            id: app.id.to_string(),
            user_id: app.user_id.to_string(),
            title: app.title.clone(),
            summary: app.summary.clone(),
            description: app.description.clone(),
            category: app.category.clone(),
            requested_amount: app.requested_amount,
            status: app.status.as_str().to_string(),
            score: app.score,
            reviewer_notes: app.reviewer_notes.clone(),
            submitted_at: app.submitted_at.map(|t| t.to_rfc3339()),
            reviewed_at: app.reviewed_at.map(|t| t.to_rfc3339()),
            created_at: app.created_at.to_rfc3339(),
            updated_at: app.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListApplicationsResponse {
    pub applications: Vec<ApplicationResponse>,
    pub count: usize,
}

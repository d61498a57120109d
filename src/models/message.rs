// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Message from an admin to an applicant.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
    pub subject: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    pub subject: String,
    pub body: String,
    pub read: bool,
    pub created_at: String,
}

impl From<&Message> for MessageInfo {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.to_string(),
            application_id: message.application_id.map(|id| id.to_string()),
            subject: message.subject.clone(),
            body: message.body.clone(),
            read: message.read,
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListMessagesResponse {
    pub messages: Vec<MessageInfo>,
    pub count: usize,
    pub unread: usize,
}

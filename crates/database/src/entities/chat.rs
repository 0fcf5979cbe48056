//! Chat, participant and tombstone entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub name: String,
    pub is_group: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChatRequest {
    pub name: String,
    pub is_group: bool,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatParticipant {
    pub chat_id: Uuid,
    pub user_id: Uuid,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

impl ChatParticipant {
    pub fn new(chat_id: Uuid, user_id: Uuid, is_admin: bool) -> Self {
        Self {
            chat_id,
            user_id,
            is_admin,
            joined_at: Utc::now(),
        }
    }
}

/// A chat hidden for one user without affecting the other participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedChat {
    pub chat_id: Uuid,
    pub user_id: Uuid,
    pub deleted_at: DateTime<Utc>,
}

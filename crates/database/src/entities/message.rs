//! Message entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub unsent: bool,
    pub unsent_at: Option<DateTime<Utc>>,
    pub deleted_for_sender: bool,
    pub deleted_for_all: bool,
    pub reply_to_message_id: Option<Uuid>,
    pub is_read: bool,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Message as handed over by the transport layer, with identifiers still in
/// their string form. `MessageRepository::save_message` validates and parses them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveMessageRequest {
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub reply_to_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

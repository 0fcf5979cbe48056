//! Repository for message data access operations.
//!
//! `save_message` is the only multi-statement write: the membership check and
//! the insert are a single conditional statement, and the chat's activity
//! timestamp is bumped in the same transaction.

use crate::entities::{Message, ReadReceipt, SaveMessageRequest};
use crate::repos::chat_repository::touch_chat;
use crate::types::{fold_case, like_pattern, parse_id, DatabaseError, DatabaseResult, Pagination};
use crate::unit_of_work::UnitOfWork;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Page size for message listings when the caller passes a non-positive limit.
pub const DEFAULT_MESSAGE_LIMIT: i64 = 50;

const MESSAGE_COLUMNS: &str = "message_id, chat_id, sender_id, content, media_url, media_type, \
     sent_at, unsent, unsent_at, deleted_for_sender, deleted_for_all, reply_to_message_id, \
     is_read, is_edited, is_deleted, created_at, updated_at, deleted_at";

fn map_message(row: &SqliteRow) -> DatabaseResult<Message> {
    Ok(Message {
        id: row.try_get("message_id")?,
        chat_id: row.try_get("chat_id")?,
        sender_id: row.try_get("sender_id")?,
        content: row.try_get("content")?,
        media_url: row.try_get("media_url")?,
        media_type: row.try_get("media_type")?,
        sent_at: row.try_get("sent_at")?,
        unsent: row.try_get("unsent")?,
        unsent_at: row.try_get("unsent_at")?,
        deleted_for_sender: row.try_get("deleted_for_sender")?,
        deleted_for_all: row.try_get("deleted_for_all")?,
        reply_to_message_id: row.try_get("reply_to_message_id")?,
        is_read: row.try_get("is_read")?,
        is_edited: row.try_get("is_edited")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// Validate and parse the identifiers of an incoming message.
fn build_message(request: &SaveMessageRequest) -> DatabaseResult<Message> {
    let id = parse_id("message_id", &request.message_id)?;
    let chat_id = parse_id("chat_id", &request.chat_id)?;
    let sender_id = parse_id("sender_id", &request.sender_id)?;
    let reply_to_message_id = match request.reply_to_message_id.as_deref() {
        Some(value) if !value.trim().is_empty() => Some(parse_id("reply_to_message_id", value)?),
        _ => None,
    };

    let now = Utc::now();
    Ok(Message {
        id,
        chat_id,
        sender_id,
        content: request.content.clone(),
        media_url: request.media_url.clone(),
        media_type: request.media_type.clone(),
        sent_at: request.sent_at.unwrap_or(now),
        unsent: false,
        unsent_at: None,
        deleted_for_sender: false,
        deleted_for_all: false,
        reply_to_message_id,
        is_read: false,
        is_edited: false,
        is_deleted: false,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

/// Repository for message database operations
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    /// Create a new message repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a message from a current participant of a live chat.
    ///
    /// Identifier problems are reported before the database is touched. A
    /// missing chat is [`DatabaseError::NotFound`] and a sender outside the
    /// chat is [`DatabaseError::AccessDenied`]; in both cases nothing is
    /// written. Failures of the writes themselves come back as
    /// [`DatabaseError::Transaction`] naming the step.
    pub async fn save_message(&self, request: &SaveMessageRequest) -> DatabaseResult<Message> {
        let message = build_message(request)?;
        let mut uow = UnitOfWork::begin(&self.pool).await?;

        let inserted = sqlx::query(
            "INSERT INTO messages (message_id, chat_id, sender_id, content, content_folded, media_url,
                                   media_type, sent_at, reply_to_message_id, created_at, updated_at)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
             WHERE EXISTS (SELECT 1 FROM chats WHERE chat_id = ? AND deleted_at IS NULL)
               AND EXISTS (SELECT 1 FROM chat_participants WHERE chat_id = ? AND user_id = ?)",
        )
        .bind(message.id)
        .bind(message.chat_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(fold_case(&message.content))
        .bind(&message.media_url)
        .bind(&message.media_type)
        .bind(message.sent_at)
        .bind(message.reply_to_message_id)
        .bind(message.created_at)
        .bind(message.updated_at)
        .bind(message.chat_id)
        .bind(message.chat_id)
        .bind(message.sender_id)
        .execute(uow.conn())
        .await
        .map_err(|e| DatabaseError::in_transaction("inserting message", e.into()))?;

        if inserted.rows_affected() == 0 {
            let chat_exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM chats WHERE chat_id = ? AND deleted_at IS NULL)",
            )
            .bind(message.chat_id)
            .fetch_one(uow.conn())
            .await?;
            uow.rollback().await?;

            let error = if chat_exists {
                DatabaseError::AccessDenied(format!(
                    "user {} is not a participant of chat {}",
                    message.sender_id, message.chat_id
                ))
            } else {
                DatabaseError::NotFound(format!("chat {}", message.chat_id))
            };
            warn!(
                message_id = %message.id,
                chat_id = %message.chat_id,
                sender_id = %message.sender_id,
                error = %error,
                "message rejected"
            );
            return Err(error);
        }

        touch_chat(uow.conn(), message.chat_id, message.created_at)
            .await
            .map_err(|e| DatabaseError::in_transaction("updating chat activity", e))?;

        uow.commit().await?;

        info!(
            message_id = %message.id,
            chat_id = %message.chat_id,
            sender_id = %message.sender_id,
            "saved message"
        );
        Ok(message)
    }

    pub async fn find_by_id(&self, message_id: Uuid) -> DatabaseResult<Option<Message>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ? AND deleted_at IS NULL"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_message).transpose()
    }

    /// Messages of a chat, newest first, without deleted ones
    pub async fn find_by_chat(
        &self,
        chat_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> DatabaseResult<Vec<Message>> {
        let page = Pagination::with_default(offset, limit, DEFAULT_MESSAGE_LIMIT);

        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ? AND deleted_at IS NULL
             ORDER BY sent_at DESC, message_id ASC
             LIMIT ? OFFSET ?"
        ))
        .bind(chat_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        debug!(%chat_id, count = rows.len(), "loaded messages");
        rows.iter().map(map_message).collect()
    }

    /// Mark a message read and record who read it
    pub async fn mark_as_read(&self, message_id: Uuid, user_id: Uuid) -> DatabaseResult<()> {
        let now = Utc::now();
        let mut uow = UnitOfWork::begin(&self.pool).await?;

        let result = sqlx::query(
            "UPDATE messages SET is_read = TRUE WHERE message_id = ? AND deleted_at IS NULL",
        )
        .bind(message_id)
        .execute(uow.conn())
        .await
        .map_err(|e| DatabaseError::in_transaction("marking message read", e.into()))?;

        if result.rows_affected() == 0 {
            uow.rollback().await?;
            return Err(DatabaseError::NotFound(format!("message {message_id}")));
        }

        sqlx::query(
            "INSERT INTO read_receipts (message_id, user_id, read_at) VALUES (?, ?, ?)
             ON CONFLICT (message_id, user_id) DO NOTHING",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(now)
        .execute(uow.conn())
        .await
        .map_err(|e| DatabaseError::in_transaction("recording read receipt", e.into()))?;

        uow.commit().await?;

        debug!(%message_id, %user_id, "message marked as read");
        Ok(())
    }

    /// Who has read a message, earliest reader first
    pub async fn find_read_receipts(&self, message_id: Uuid) -> DatabaseResult<Vec<ReadReceipt>> {
        let rows = sqlx::query(
            "SELECT message_id, user_id, read_at FROM read_receipts
             WHERE message_id = ?
             ORDER BY read_at ASC, user_id ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ReadReceipt {
                    message_id: row.try_get("message_id")?,
                    user_id: row.try_get("user_id")?,
                    read_at: row.try_get("read_at")?,
                })
            })
            .collect()
    }

    /// Replace the content of a message and flag it as edited
    pub async fn update_message(&self, message_id: Uuid, content: &str) -> DatabaseResult<Message> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE messages SET content = ?, content_folded = ?, is_edited = TRUE, updated_at = ?
             WHERE message_id = ? AND deleted_at IS NULL AND unsent = FALSE",
        )
        .bind(content)
        .bind(fold_case(content))
        .bind(now)
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("message {message_id}")));
        }

        info!(%message_id, "edited message");

        self.find_by_id(message_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("message {message_id}")))
    }

    /// Soft delete a message for everyone. Deleting twice is a no-op.
    pub async fn delete_message(&self, message_id: Uuid) -> DatabaseResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE messages
             SET is_deleted = TRUE, deleted_for_all = TRUE, deleted_at = ?, updated_at = ?
             WHERE message_id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        info!(%message_id, removed = result.rows_affected(), "deleted message");
        Ok(())
    }

    /// Withdraw a sent message. It stays in the listing flagged as unsent.
    pub async fn unsend_message(&self, message_id: Uuid) -> DatabaseResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE messages SET unsent = TRUE, unsent_at = ?, is_deleted = TRUE, updated_at = ?
             WHERE message_id = ? AND deleted_at IS NULL AND unsent = FALSE",
        )
        .bind(now)
        .bind(now)
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("message {message_id}")));
        }

        info!(%message_id, "unsent message");
        Ok(())
    }

    /// Case-insensitive content search within one chat, newest first
    pub async fn search(
        &self,
        chat_id: Uuid,
        query: &str,
        offset: i64,
        limit: i64,
    ) -> DatabaseResult<Vec<Message>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let page = Pagination::with_default(offset, limit, DEFAULT_MESSAGE_LIMIT);

        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ? AND deleted_at IS NULL AND unsent = FALSE
               AND content_folded LIKE ? ESCAPE '\\'
             ORDER BY sent_at DESC, message_id ASC
             LIMIT ? OFFSET ?"
        ))
        .bind(chat_id)
        .bind(like_pattern(query))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ChatParticipant;
    use crate::repos::{ChatRepository, ParticipantRepository};
    use crate::test_support::{create_test_pool, insert_chat};
    use chrono::Duration;

    fn request(chat_id: Uuid, sender_id: Uuid, content: &str) -> SaveMessageRequest {
        SaveMessageRequest {
            message_id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            ..SaveMessageRequest::default()
        }
    }

    async fn chat_with_participant(pool: &SqlitePool) -> (Uuid, Uuid) {
        let chat_id = insert_chat(pool, "General").await;
        let user_id = Uuid::new_v4();
        ParticipantRepository::new(pool.clone())
            .add(&mut ChatParticipant::new(chat_id, user_id, false))
            .await
            .unwrap();
        (chat_id, user_id)
    }

    #[test]
    fn test_identifier_validation() {
        let good = request(Uuid::new_v4(), Uuid::new_v4(), "hi");

        let empty = SaveMessageRequest {
            message_id: String::new(),
            ..good.clone()
        };
        assert!(matches!(
            build_message(&empty),
            Err(DatabaseError::ValidationError(_))
        ));

        let garbled = SaveMessageRequest {
            sender_id: "not-a-uuid".to_string(),
            ..good.clone()
        };
        assert!(matches!(
            build_message(&garbled),
            Err(DatabaseError::InvalidIdentifier { field: "sender_id", .. })
        ));

        let blank_reply = SaveMessageRequest {
            reply_to_message_id: Some("  ".to_string()),
            ..good
        };
        assert_eq!(build_message(&blank_reply).unwrap().reply_to_message_id, None);
    }

    #[tokio::test]
    async fn test_save_and_list_messages() {
        let (pool, _temp_dir) = create_test_pool().await;
        let (chat_id, user_id) = chat_with_participant(&pool).await;
        let repo = MessageRepository::new(pool);

        let base = Utc::now();
        let mut saved = Vec::new();
        for (i, text) in ["first", "second", "third"].into_iter().enumerate() {
            let message = repo
                .save_message(&SaveMessageRequest {
                    sent_at: Some(base + Duration::seconds(i as i64)),
                    ..request(chat_id, user_id, text)
                })
                .await
                .unwrap();
            saved.push(message);
        }

        assert_eq!(repo.find_by_id(saved[0].id).await.unwrap().unwrap(), saved[0]);

        let contents: Vec<String> = repo
            .find_by_chat(chat_id, 0, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["third", "second", "first"]);
        assert_eq!(repo.find_by_chat(chat_id, 2, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_rejects_missing_chat_and_outsiders() {
        let (pool, _temp_dir) = create_test_pool().await;
        let (chat_id, _member) = chat_with_participant(&pool).await;
        let repo = MessageRepository::new(pool.clone());

        let missing = repo
            .save_message(&request(Uuid::new_v4(), Uuid::new_v4(), "hello?"))
            .await
            .unwrap_err();
        assert!(missing.is_not_found());

        let outsider = repo
            .save_message(&request(chat_id, Uuid::new_v4(), "let me in"))
            .await
            .unwrap_err();
        assert!(matches!(outsider, DatabaseError::AccessDenied(_)));

        ChatRepository::new(pool).delete(chat_id).await.unwrap();
        let deleted = repo
            .save_message(&request(chat_id, Uuid::new_v4(), "anyone?"))
            .await
            .unwrap_err();
        assert!(deleted.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_message_id_reports_step() {
        let (pool, _temp_dir) = create_test_pool().await;
        let (chat_id, user_id) = chat_with_participant(&pool).await;
        let repo = MessageRepository::new(pool);

        let first = request(chat_id, user_id, "once");
        repo.save_message(&first).await.unwrap();

        let err = repo.save_message(&first).await.unwrap_err();
        match err {
            DatabaseError::Transaction { step, retryable, .. } => {
                assert_eq!(step, "inserting message");
                assert!(!retryable);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_edit_unsend_delete() {
        let (pool, _temp_dir) = create_test_pool().await;
        let (chat_id, user_id) = chat_with_participant(&pool).await;
        let repo = MessageRepository::new(pool.clone());

        let message = repo.save_message(&request(chat_id, user_id, "draft")).await.unwrap();

        assert!(repo.find_read_receipts(message.id).await.unwrap().is_empty());

        let reader = Uuid::new_v4();
        let second_reader = Uuid::new_v4();
        repo.mark_as_read(message.id, reader).await.unwrap();
        repo.mark_as_read(message.id, reader).await.unwrap();
        repo.mark_as_read(message.id, second_reader).await.unwrap();
        assert!(repo.find_by_id(message.id).await.unwrap().unwrap().is_read);

        let receipts = repo.find_read_receipts(message.id).await.unwrap();
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[0].user_id, reader);
        assert_eq!(receipts[1].user_id, second_reader);
        assert!(receipts.iter().all(|r| r.message_id == message.id));

        let edited = repo.update_message(message.id, "final").await.unwrap();
        assert_eq!(edited.content, "final");
        assert!(edited.is_edited);

        repo.unsend_message(message.id).await.unwrap();
        let unsent = repo.find_by_id(message.id).await.unwrap().unwrap();
        assert!(unsent.unsent && unsent.unsent_at.is_some());
        assert!(repo.unsend_message(message.id).await.unwrap_err().is_not_found());
        assert!(repo.update_message(message.id, "again").await.unwrap_err().is_not_found());

        repo.delete_message(message.id).await.unwrap();
        repo.delete_message(message.id).await.unwrap();
        assert!(repo.find_by_id(message.id).await.unwrap().is_none());
        assert!(repo.find_by_chat(chat_id, 0, 10).await.unwrap().is_empty());
        assert!(repo.mark_as_read(message.id, reader).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_search_messages() {
        let (pool, _temp_dir) = create_test_pool().await;
        let (chat_id, user_id) = chat_with_participant(&pool).await;
        let repo = MessageRepository::new(pool);

        repo.save_message(&request(chat_id, user_id, "Lunch at noon?")).await.unwrap();
        repo.save_message(&request(chat_id, user_id, "noon works")).await.unwrap();
        repo.save_message(&request(chat_id, user_id, "50% off today")).await.unwrap();

        assert_eq!(repo.search(chat_id, "NOON", 0, 0).await.unwrap().len(), 2);
        assert_eq!(repo.search(chat_id, "50%", 0, 0).await.unwrap().len(), 1);
        assert_eq!(repo.search(chat_id, "5_%", 0, 0).await.unwrap().len(), 0);
        assert!(repo.search(chat_id, "  ", 0, 0).await.unwrap().is_empty());
        assert!(repo.search(Uuid::new_v4(), "noon", 0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_content() {
        let (pool, _temp_dir) = create_test_pool().await;
        let (chat_id, user_id) = chat_with_participant(&pool).await;
        let repo = MessageRepository::new(pool);

        let message = repo
            .save_message(&request(chat_id, user_id, "Café ÜBER alles"))
            .await
            .unwrap();

        for query in ["café", "CAFÉ", "über", "Über"] {
            let found = repo.search(chat_id, query, 0, 0).await.unwrap();
            assert_eq!(found.len(), 1, "query {query:?}");
            assert_eq!(found[0].id, message.id);
        }

        repo.update_message(message.id, "Straße ÆRØ").await.unwrap();
        assert_eq!(repo.search(chat_id, "ærø", 0, 0).await.unwrap().len(), 1);
        assert_eq!(repo.search(chat_id, "STRASSE", 0, 0).await.unwrap().len(), 0);
        assert!(repo.search(chat_id, "café", 0, 0).await.unwrap().is_empty());
    }
}

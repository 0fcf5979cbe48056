//! Repository for chat data access operations.

use crate::entities::{Chat, CreateChatRequest};
use crate::types::{DatabaseError, DatabaseResult, Pagination};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

const CHAT_COLUMNS: &str =
    "c.chat_id, c.name, c.is_group, c.created_by, c.created_at, c.updated_at, c.deleted_at";

fn map_chat(row: &SqliteRow) -> DatabaseResult<Chat> {
    Ok(Chat {
        id: row.try_get("chat_id")?,
        name: row.try_get("name")?,
        is_group: row.try_get("is_group")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// Bump a live chat's activity timestamp. Returns the number of rows touched.
pub(crate) async fn touch_chat(
    conn: &mut SqliteConnection,
    chat_id: Uuid,
    at: DateTime<Utc>,
) -> DatabaseResult<u64> {
    let result = sqlx::query(
        "UPDATE chats SET updated_at = ? WHERE chat_id = ? AND deleted_at IS NULL",
    )
    .bind(at)
    .bind(chat_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Repository for chat database operations
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    /// Create a new chat repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new chat
    pub async fn create(&self, request: &CreateChatRequest) -> DatabaseResult<Chat> {
        let now = Utc::now();
        let chat = Chat {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            is_group: request.is_group,
            created_by: request.created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        sqlx::query(
            "INSERT INTO chats (chat_id, name, is_group, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(chat.id)
        .bind(&chat.name)
        .bind(chat.is_group)
        .bind(chat.created_by)
        .bind(chat.created_at)
        .bind(chat.updated_at)
        .execute(&self.pool)
        .await?;

        info!(
            chat_id = %chat.id,
            created_by = %chat.created_by,
            is_group = chat.is_group,
            "created new chat"
        );

        Ok(chat)
    }

    /// Find a live chat by ID
    pub async fn find_by_id(&self, chat_id: Uuid) -> DatabaseResult<Option<Chat>> {
        let row = sqlx::query(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats c WHERE c.chat_id = ? AND c.deleted_at IS NULL"
        ))
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_chat).transpose()
    }

    /// Chats the user participates in and has not hidden, most recent activity first
    pub async fn list_by_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> DatabaseResult<Vec<Chat>> {
        let page = Pagination::new(offset, limit);

        let rows = sqlx::query(&format!(
            "SELECT {CHAT_COLUMNS}
             FROM chats c
             JOIN chat_participants p ON p.chat_id = c.chat_id
             WHERE p.user_id = ?
               AND c.deleted_at IS NULL
               AND NOT EXISTS (
                   SELECT 1 FROM deleted_chats d
                   WHERE d.chat_id = c.chat_id AND d.user_id = p.user_id
               )
             ORDER BY c.updated_at DESC, c.chat_id ASC
             LIMIT ? OFFSET ?"
        ))
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        debug!(%user_id, count = rows.len(), "listed chats for user");
        rows.iter().map(map_chat).collect()
    }

    /// Save name and group flag
    pub async fn update(&self, chat: &Chat) -> DatabaseResult<Chat> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE chats SET name = ?, is_group = ?, updated_at = ?
             WHERE chat_id = ? AND deleted_at IS NULL",
        )
        .bind(chat.name.trim())
        .bind(chat.is_group)
        .bind(now)
        .bind(chat.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("chat {}", chat.id)));
        }

        info!(chat_id = %chat.id, "updated chat");

        self.find_by_id(chat.id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("chat {}", chat.id)))
    }

    /// Soft delete a chat for everyone. Deleting twice is a no-op.
    pub async fn delete(&self, chat_id: Uuid) -> DatabaseResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE chats SET deleted_at = ?, updated_at = ? WHERE chat_id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        info!(%chat_id, removed = result.rows_affected(), "soft deleted chat");
        Ok(())
    }

    /// Mark activity on a chat without changing anything else
    pub async fn touch(&self, chat_id: Uuid) -> DatabaseResult<()> {
        let mut conn = self.pool.acquire().await?;

        if touch_chat(&mut conn, chat_id, Utc::now()).await? == 0 {
            return Err(DatabaseError::NotFound(format!("chat {chat_id}")));
        }

        debug!(%chat_id, "touched chat");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ChatParticipant;
    use crate::repos::{DeletedChatRepository, ParticipantRepository};
    use crate::test_support::create_test_pool;
    use std::time::Duration;

    fn group(name: &str) -> CreateChatRequest {
        CreateChatRequest {
            name: name.to_string(),
            is_group: true,
            created_by: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_create_update_delete_chat() {
        let (pool, _temp_dir) = create_test_pool().await;
        let repo = ChatRepository::new(pool);

        let chat = repo.create(&group("Weekend plans")).await.unwrap();
        assert_eq!(repo.find_by_id(chat.id).await.unwrap().unwrap(), chat);

        let mut renamed = chat.clone();
        renamed.name = "Weekend trip".to_string();
        renamed.is_group = false;
        let updated = repo.update(&renamed).await.unwrap();
        assert_eq!(updated.name, "Weekend trip");
        assert!(!updated.is_group);

        repo.delete(chat.id).await.unwrap();
        repo.delete(chat.id).await.unwrap();
        assert!(repo.find_by_id(chat.id).await.unwrap().is_none());
        assert!(repo.update(&renamed).await.unwrap_err().is_not_found());
        assert!(repo.touch(chat.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_touch_advances_updated_at() {
        let (pool, _temp_dir) = create_test_pool().await;
        let repo = ChatRepository::new(pool);

        let chat = repo.create(&group("Standup")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        repo.touch(chat.id).await.unwrap();

        let touched = repo.find_by_id(chat.id).await.unwrap().unwrap();
        assert!(touched.updated_at > chat.updated_at);
    }

    #[tokio::test]
    async fn test_list_by_user_skips_deleted_and_hidden() {
        let (pool, _temp_dir) = create_test_pool().await;
        let chats = ChatRepository::new(pool.clone());
        let participants = ParticipantRepository::new(pool.clone());
        let hidden = DeletedChatRepository::new(pool);

        let user_id = Uuid::new_v4();
        let kept = chats.create(&group("Kept")).await.unwrap();
        let deleted = chats.create(&group("Deleted")).await.unwrap();
        let tombstoned = chats.create(&group("Hidden")).await.unwrap();
        let foreign = chats.create(&group("Not mine")).await.unwrap();

        for chat_id in [kept.id, deleted.id, tombstoned.id] {
            participants
                .add(&mut ChatParticipant::new(chat_id, user_id, false))
                .await
                .unwrap();
        }
        participants
            .add(&mut ChatParticipant::new(foreign.id, Uuid::new_v4(), true))
            .await
            .unwrap();

        chats.delete(deleted.id).await.unwrap();
        hidden.mark_chat_as_deleted(tombstoned.id, user_id).await.unwrap();

        let listed = chats.list_by_user(user_id, 0, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, kept.id);

        hidden.remove(tombstoned.id, user_id).await.unwrap();
        assert_eq!(chats.list_by_user(user_id, 0, 10).await.unwrap().len(), 2);
    }
}

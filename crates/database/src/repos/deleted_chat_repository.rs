//! Per-user chat tombstones.

use crate::entities::DeletedChat;
use crate::types::DatabaseResult;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

fn map_deleted_chat(row: &SqliteRow) -> DatabaseResult<DeletedChat> {
    Ok(DeletedChat {
        chat_id: row.try_get("chat_id")?,
        user_id: row.try_get("user_id")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

pub struct DeletedChatRepository {
    pool: SqlitePool,
}

impl DeletedChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Hide a chat for one user. Marking again refreshes the timestamp.
    pub async fn mark_chat_as_deleted(&self, chat_id: Uuid, user_id: Uuid) -> DatabaseResult<DeletedChat> {
        let tombstone = DeletedChat {
            chat_id,
            user_id,
            deleted_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO deleted_chats (chat_id, user_id, deleted_at) VALUES (?, ?, ?)
             ON CONFLICT (chat_id, user_id) DO UPDATE SET deleted_at = excluded.deleted_at",
        )
        .bind(tombstone.chat_id)
        .bind(tombstone.user_id)
        .bind(tombstone.deleted_at)
        .execute(&self.pool)
        .await?;

        info!(%chat_id, %user_id, "chat hidden for user");
        Ok(tombstone)
    }

    pub async fn is_deleted_for_user(&self, chat_id: Uuid, user_id: Uuid) -> DatabaseResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM deleted_chats WHERE chat_id = ? AND user_id = ?)",
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Restore a hidden chat for the user. A no-op when it was not hidden.
    pub async fn remove(&self, chat_id: Uuid, user_id: Uuid) -> DatabaseResult<()> {
        let result = sqlx::query("DELETE FROM deleted_chats WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        info!(%chat_id, %user_id, removed = result.rows_affected(), "chat restored for user");
        Ok(())
    }

    pub async fn find_by_user(&self, user_id: Uuid) -> DatabaseResult<Vec<DeletedChat>> {
        let rows = sqlx::query(
            "SELECT chat_id, user_id, deleted_at FROM deleted_chats
             WHERE user_id = ? ORDER BY deleted_at DESC, chat_id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_deleted_chat).collect()
    }

    pub async fn find_by_chat(&self, chat_id: Uuid) -> DatabaseResult<Vec<DeletedChat>> {
        let rows = sqlx::query(
            "SELECT chat_id, user_id, deleted_at FROM deleted_chats
             WHERE chat_id = ? ORDER BY deleted_at DESC, user_id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_deleted_chat).collect()
    }
}

//! Repository for chat participants.

use crate::entities::ChatParticipant;
use crate::types::{DatabaseError, DatabaseResult, Pagination};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

fn map_participant(row: &SqliteRow) -> DatabaseResult<ChatParticipant> {
    Ok(ChatParticipant {
        chat_id: row.try_get("chat_id")?,
        user_id: row.try_get("user_id")?,
        is_admin: row.try_get("is_admin")?,
        joined_at: row.try_get("joined_at")?,
    })
}

/// Repository for chat participant database operations
pub struct ParticipantRepository {
    pool: SqlitePool,
}

impl ParticipantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Add a participant; `joined_at` is stamped with the insert time
    pub async fn add(&self, participant: &mut ChatParticipant) -> DatabaseResult<()> {
        participant.joined_at = Utc::now();

        sqlx::query(
            "INSERT INTO chat_participants (chat_id, user_id, is_admin, joined_at) VALUES (?, ?, ?, ?)",
        )
        .bind(participant.chat_id)
        .bind(participant.user_id)
        .bind(participant.is_admin)
        .bind(participant.joined_at)
        .execute(&self.pool)
        .await?;

        info!(
            chat_id = %participant.chat_id,
            user_id = %participant.user_id,
            is_admin = participant.is_admin,
            "added chat participant"
        );
        Ok(())
    }

    /// Remove a participant. Removing a missing participant is a no-op.
    pub async fn remove(&self, chat_id: Uuid, user_id: Uuid) -> DatabaseResult<()> {
        let result = sqlx::query("DELETE FROM chat_participants WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        info!(%chat_id, %user_id, removed = result.rows_affected(), "removed chat participant");
        Ok(())
    }

    /// Participants of a chat in join order
    pub async fn list_by_chat(
        &self,
        chat_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> DatabaseResult<Vec<ChatParticipant>> {
        let page = Pagination::new(offset, limit);

        let rows = sqlx::query(
            "SELECT chat_id, user_id, is_admin, joined_at FROM chat_participants
             WHERE chat_id = ?
             ORDER BY joined_at ASC, user_id ASC
             LIMIT ? OFFSET ?",
        )
        .bind(chat_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_participant).collect()
    }

    /// Every chat membership row of a user
    pub async fn find_by_user(&self, user_id: Uuid) -> DatabaseResult<Vec<ChatParticipant>> {
        let rows = sqlx::query(
            "SELECT chat_id, user_id, is_admin, joined_at FROM chat_participants
             WHERE user_id = ?
             ORDER BY joined_at DESC, chat_id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_participant).collect()
    }

    pub async fn is_participant(&self, chat_id: Uuid, user_id: Uuid) -> DatabaseResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM chat_participants WHERE chat_id = ? AND user_id = ?)",
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Save the admin flag
    pub async fn update(&self, participant: &ChatParticipant) -> DatabaseResult<()> {
        let result = sqlx::query(
            "UPDATE chat_participants SET is_admin = ? WHERE chat_id = ? AND user_id = ?",
        )
        .bind(participant.is_admin)
        .bind(participant.chat_id)
        .bind(participant.user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "participant {} of chat {}",
                participant.user_id, participant.chat_id
            )));
        }

        info!(
            chat_id = %participant.chat_id,
            user_id = %participant.user_id,
            is_admin = participant.is_admin,
            "updated chat participant"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_pool, insert_chat};

    #[tokio::test]
    async fn test_participant_lifecycle() {
        let (pool, _temp_dir) = create_test_pool().await;
        let chat_id = insert_chat(&pool, "Book club").await;
        let repo = ParticipantRepository::new(pool);

        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut admin = ChatParticipant::new(chat_id, alice, true);
        repo.add(&mut admin).await.unwrap();
        repo.add(&mut ChatParticipant::new(chat_id, bob, false)).await.unwrap();

        assert!(repo.is_participant(chat_id, alice).await.unwrap());
        assert_eq!(repo.list_by_chat(chat_id, 0, 10).await.unwrap().len(), 2);
        assert_eq!(repo.list_by_chat(chat_id, 1, 10).await.unwrap().len(), 1);
        assert_eq!(repo.find_by_user(bob).await.unwrap()[0].chat_id, chat_id);

        let mut promoted = ChatParticipant::new(chat_id, bob, true);
        repo.update(&promoted).await.unwrap();
        let bob_row = repo.find_by_user(bob).await.unwrap().remove(0);
        assert!(bob_row.is_admin);

        repo.remove(chat_id, bob).await.unwrap();
        repo.remove(chat_id, bob).await.unwrap();
        assert!(!repo.is_participant(chat_id, bob).await.unwrap());

        promoted.is_admin = false;
        assert!(repo.update(&promoted).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_and_orphan_participants() {
        let (pool, _temp_dir) = create_test_pool().await;
        let chat_id = insert_chat(&pool, "Family").await;
        let repo = ParticipantRepository::new(pool);
        let user_id = Uuid::new_v4();

        repo.add(&mut ChatParticipant::new(chat_id, user_id, false)).await.unwrap();
        let dup = repo
            .add(&mut ChatParticipant::new(chat_id, user_id, false))
            .await
            .unwrap_err();
        assert!(matches!(dup, DatabaseError::Duplicate(_)));

        let orphan = repo
            .add(&mut ChatParticipant::new(Uuid::new_v4(), user_id, false))
            .await
            .unwrap_err();
        assert!(matches!(orphan, DatabaseError::ConstraintViolation(_)));
    }
}

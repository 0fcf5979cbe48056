//! Repository for community join requests.

use crate::entities::{CommunityJoinRequest, CreateJoinRequest, JoinRequestStatus};
use crate::types::{DatabaseError, DatabaseResult};
use crate::unit_of_work::UnitOfWork;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

const REQUEST_COLUMNS: &str = "request_id, community_id, user_id, status, created_at, updated_at";

fn map_request(row: &SqliteRow) -> DatabaseResult<CommunityJoinRequest> {
    let status: String = row.try_get("status")?;

    Ok(CommunityJoinRequest {
        id: row.try_get("request_id")?,
        community_id: row.try_get("community_id")?,
        user_id: row.try_get("user_id")?,
        status: JoinRequestStatus::from(status.as_str()),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Repository for join request database operations
pub struct CommunityJoinRequestRepository {
    pool: SqlitePool,
}

impl CommunityJoinRequestRepository {
    /// Create a new join request repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Start a transaction for multi-step flows such as approving a request
    /// and adding the member.
    pub async fn begin_tx(&self) -> DatabaseResult<UnitOfWork> {
        UnitOfWork::begin(&self.pool).await
    }

    /// File a pending request. A second pending request for the same
    /// community and user is [`DatabaseError::Duplicate`]; a missing or
    /// soft-deleted community is [`DatabaseError::NotFound`].
    pub async fn add(&self, request: &CreateJoinRequest) -> DatabaseResult<CommunityJoinRequest> {
        let mut conn = self.pool.acquire().await?;
        self.add_tx(&mut conn, request).await
    }

    pub async fn add_tx(
        &self,
        conn: &mut SqliteConnection,
        request: &CreateJoinRequest,
    ) -> DatabaseResult<CommunityJoinRequest> {
        let now = Utc::now();
        let join_request = CommunityJoinRequest {
            id: Uuid::new_v4(),
            community_id: request.community_id,
            user_id: request.user_id,
            status: JoinRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let result = sqlx::query(
            "INSERT INTO community_join_requests (request_id, community_id, user_id, status, created_at, updated_at)
             SELECT ?, ?, ?, ?, ?, ?
             WHERE EXISTS (SELECT 1 FROM communities WHERE community_id = ? AND deleted_at IS NULL)",
        )
        .bind(join_request.id)
        .bind(join_request.community_id)
        .bind(join_request.user_id)
        .bind(join_request.status.as_str())
        .bind(join_request.created_at)
        .bind(join_request.updated_at)
        .bind(join_request.community_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "community {}",
                join_request.community_id
            )));
        }

        info!(
            request_id = %join_request.id,
            community_id = %join_request.community_id,
            user_id = %join_request.user_id,
            "created join request"
        );
        Ok(join_request)
    }

    /// Delete a request. Removing a missing request is a no-op.
    pub async fn remove(&self, request_id: Uuid) -> DatabaseResult<()> {
        let result = sqlx::query("DELETE FROM community_join_requests WHERE request_id = ?")
            .bind(request_id)
            .execute(&self.pool)
            .await?;

        info!(%request_id, removed = result.rows_affected(), "removed join request");
        Ok(())
    }

    pub async fn find_by_id(&self, request_id: Uuid) -> DatabaseResult<Option<CommunityJoinRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM community_join_requests WHERE request_id = ?"
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_request).transpose()
    }

    /// Pending requests for a community, oldest first
    pub async fn find_by_community(
        &self,
        community_id: Uuid,
    ) -> DatabaseResult<Vec<CommunityJoinRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM community_join_requests
             WHERE community_id = ? AND status = 'pending'
             ORDER BY created_at ASC, request_id ASC"
        ))
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_request).collect()
    }

    /// Every request a user has filed, whatever its status, newest first
    pub async fn find_by_user(&self, user_id: Uuid) -> DatabaseResult<Vec<CommunityJoinRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM community_join_requests
             WHERE user_id = ?
             ORDER BY created_at DESC, request_id ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_request).collect()
    }

    pub async fn update(&self, request: &mut CommunityJoinRequest) -> DatabaseResult<()> {
        let mut conn = self.pool.acquire().await?;
        self.update_tx(&mut conn, request).await
    }

    /// Save the request's status on a caller-managed connection or transaction
    pub async fn update_tx(
        &self,
        conn: &mut SqliteConnection,
        request: &mut CommunityJoinRequest,
    ) -> DatabaseResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE community_join_requests SET status = ?, updated_at = ? WHERE request_id = ?",
        )
        .bind(request.status.as_str())
        .bind(now)
        .bind(request.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("join request {}", request.id)));
        }

        request.updated_at = now;
        info!(request_id = %request.id, status = %request.status, "updated join request");
        Ok(())
    }

    pub async fn has_pending_join_request(
        &self,
        community_id: Uuid,
        user_id: Uuid,
    ) -> DatabaseResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM community_join_requests
                WHERE community_id = ? AND user_id = ? AND status = 'pending'
             )",
        )
        .bind(community_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::CommunityRepository;
    use crate::test_support::{create_test_pool, insert_community};

    #[tokio::test]
    async fn test_pending_lifecycle() {
        let (pool, _temp_dir) = create_test_pool().await;
        let community_id = insert_community(&pool, "Knitting", false).await;
        let repo = CommunityJoinRequestRepository::new(pool);
        let user_id = Uuid::new_v4();

        assert!(!repo.has_pending_join_request(community_id, user_id).await.unwrap());

        let mut request = repo.add(&CreateJoinRequest { community_id, user_id }).await.unwrap();
        assert_eq!(request.status, JoinRequestStatus::Pending);
        assert!(repo.has_pending_join_request(community_id, user_id).await.unwrap());
        assert_eq!(repo.find_by_community(community_id).await.unwrap().len(), 1);

        request.status = JoinRequestStatus::Rejected;
        repo.update(&mut request).await.unwrap();
        assert!(!repo.has_pending_join_request(community_id, user_id).await.unwrap());
        assert!(repo.find_by_community(community_id).await.unwrap().is_empty());

        // a rejected request does not block a new one
        repo.add(&CreateJoinRequest { community_id, user_id }).await.unwrap();
        assert_eq!(repo.find_by_user(user_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_pending_request_is_duplicate() {
        let (pool, _temp_dir) = create_test_pool().await;
        let community_id = insert_community(&pool, "Cycling", false).await;
        let repo = CommunityJoinRequestRepository::new(pool);
        let request = CreateJoinRequest {
            community_id,
            user_id: Uuid::new_v4(),
        };

        repo.add(&request).await.unwrap();
        let err = repo.add(&request).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_remove_and_update_missing() {
        let (pool, _temp_dir) = create_test_pool().await;
        let community_id = insert_community(&pool, "Birding", false).await;
        let repo = CommunityJoinRequestRepository::new(pool);
        let user_id = Uuid::new_v4();

        let mut request = repo.add(&CreateJoinRequest { community_id, user_id }).await.unwrap();
        repo.remove(request.id).await.unwrap();
        repo.remove(request.id).await.unwrap();

        assert!(repo.find_by_id(request.id).await.unwrap().is_none());
        assert!(!repo.has_pending_join_request(community_id, user_id).await.unwrap());

        request.status = JoinRequestStatus::Approved;
        assert!(repo.update(&mut request).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_or_deleted_community_is_not_found() {
        let (pool, _temp_dir) = create_test_pool().await;
        let community_id = insert_community(&pool, "Retired", true).await;
        let communities = CommunityRepository::new(pool.clone());
        let repo = CommunityJoinRequestRepository::new(pool);
        let user_id = Uuid::new_v4();

        let err = repo
            .add(&CreateJoinRequest {
                community_id: Uuid::new_v4(),
                user_id,
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        communities.delete(community_id).await.unwrap();
        let err = repo
            .add(&CreateJoinRequest { community_id, user_id })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(repo.find_by_user(user_id).await.unwrap().is_empty());
    }
}

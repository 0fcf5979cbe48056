//! Repository for community membership data access operations.

use crate::entities::{CommunityMember, MemberRole};
use crate::repos::community_repository::community_is_live;
use crate::types::{DatabaseError, DatabaseResult};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

const MEMBER_COLUMNS: &str = "community_id, user_id, role, created_at, updated_at, deleted_at";

fn map_member(row: &SqliteRow) -> DatabaseResult<CommunityMember> {
    let role: String = row.try_get("role")?;

    Ok(CommunityMember {
        community_id: row.try_get("community_id")?,
        user_id: row.try_get("user_id")?,
        role: MemberRole::from(role.as_str()),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// Repository for community member database operations
pub struct CommunityMemberRepository {
    pool: SqlitePool,
}

impl CommunityMemberRepository {
    /// Create a new community member repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Whether the user holds an active membership in the community
    pub async fn is_member(&self, community_id: Uuid, user_id: Uuid) -> DatabaseResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM community_members
                WHERE community_id = ? AND user_id = ? AND deleted_at IS NULL
             )",
        )
        .bind(community_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Add a member. Timestamps on `member` are restamped to the insert time.
    pub async fn add(&self, member: &mut CommunityMember) -> DatabaseResult<()> {
        let mut conn = self.pool.acquire().await?;
        self.add_tx(&mut conn, member).await
    }

    /// Add a member on a caller-managed connection or transaction.
    ///
    /// A soft-deleted membership for the same pair is revived in place; an
    /// active one is reported as [`DatabaseError::Duplicate`]. A missing or
    /// soft-deleted community is [`DatabaseError::NotFound`].
    pub async fn add_tx(
        &self,
        conn: &mut SqliteConnection,
        member: &mut CommunityMember,
    ) -> DatabaseResult<()> {
        let now = Utc::now();
        member.created_at = now;
        member.updated_at = now;
        member.deleted_at = None;

        let result = sqlx::query(
            "INSERT INTO community_members (community_id, user_id, role, created_at, updated_at, deleted_at)
             SELECT ?, ?, ?, ?, ?, NULL
             WHERE EXISTS (SELECT 1 FROM communities WHERE community_id = ? AND deleted_at IS NULL)
             ON CONFLICT (community_id, user_id) DO UPDATE SET
                role = excluded.role,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                deleted_at = NULL
             WHERE community_members.deleted_at IS NOT NULL",
        )
        .bind(member.community_id)
        .bind(member.user_id)
        .bind(member.role.as_str())
        .bind(member.created_at)
        .bind(member.updated_at)
        .bind(member.community_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            if !community_is_live(conn, member.community_id).await? {
                return Err(DatabaseError::NotFound(format!(
                    "community {}",
                    member.community_id
                )));
            }
            return Err(DatabaseError::Duplicate(format!(
                "user {} is already a member of community {}",
                member.user_id, member.community_id
            )));
        }

        info!(
            community_id = %member.community_id,
            user_id = %member.user_id,
            role = %member.role,
            "added community member"
        );
        Ok(())
    }

    /// Soft delete a membership. Removing a missing membership is a no-op.
    pub async fn remove(&self, community_id: Uuid, user_id: Uuid) -> DatabaseResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE community_members SET deleted_at = ?, updated_at = ?
             WHERE community_id = ? AND user_id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(community_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        info!(%community_id, %user_id, removed = result.rows_affected(), "removed community member");
        Ok(())
    }

    pub async fn find_by_id(
        &self,
        community_id: Uuid,
        user_id: Uuid,
    ) -> DatabaseResult<Option<CommunityMember>> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM community_members
             WHERE community_id = ? AND user_id = ? AND deleted_at IS NULL"
        ))
        .bind(community_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_member).transpose()
    }

    /// Active members of a community, oldest first
    pub async fn find_by_community(&self, community_id: Uuid) -> DatabaseResult<Vec<CommunityMember>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM community_members
             WHERE community_id = ? AND deleted_at IS NULL
             ORDER BY created_at ASC, user_id ASC"
        ))
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(%community_id, count = rows.len(), "loaded community members");
        rows.iter().map(map_member).collect()
    }

    /// Active memberships of a user, newest first
    pub async fn find_by_user(&self, user_id: Uuid) -> DatabaseResult<Vec<CommunityMember>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM community_members
             WHERE user_id = ? AND deleted_at IS NULL
             ORDER BY created_at DESC, community_id ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_member).collect()
    }

    pub async fn update(&self, member: &mut CommunityMember) -> DatabaseResult<()> {
        let mut conn = self.pool.acquire().await?;
        self.update_tx(&mut conn, member).await
    }

    /// Save the member's role on a caller-managed connection or transaction
    pub async fn update_tx(
        &self,
        conn: &mut SqliteConnection,
        member: &mut CommunityMember,
    ) -> DatabaseResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE community_members SET role = ?, updated_at = ?
             WHERE community_id = ? AND user_id = ? AND deleted_at IS NULL",
        )
        .bind(member.role.as_str())
        .bind(now)
        .bind(member.community_id)
        .bind(member.user_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "member {} of community {}",
                member.user_id, member.community_id
            )));
        }

        member.updated_at = now;
        info!(
            community_id = %member.community_id,
            user_id = %member.user_id,
            role = %member.role,
            "updated community member"
        );
        Ok(())
    }

    /// Number of active members in a community
    pub async fn count_by_community(&self, community_id: Uuid) -> DatabaseResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM community_members WHERE community_id = ? AND deleted_at IS NULL",
        )
        .bind(community_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

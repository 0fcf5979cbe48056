//! Repository for community data access operations.
//!
//! Reads never return soft-deleted communities, and every community handed
//! back carries its categories. Paged queries and their totals are built from
//! the same predicate builder so the two cannot drift apart.

use std::collections::HashMap;

use crate::entities::{Category, Community, CreateCommunityRequest, MembershipStatus};
use crate::repos::category_repository::map_category;
use crate::types::{fold_case, like_pattern, DatabaseError, DatabaseResult, Paginated, Pagination};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

const COMMUNITY_COLUMNS: &str = "c.community_id, c.name, c.description, c.logo_url, c.banner_url, \
     c.creator_id, c.is_approved, c.created_at, c.updated_at, c.deleted_at";

const COMMUNITY_ORDER: &str = " ORDER BY c.created_at ASC, c.community_id ASC";

fn map_community(row: &SqliteRow) -> DatabaseResult<Community> {
    Ok(Community {
        id: row.try_get("community_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        logo_url: row.try_get("logo_url")?,
        banner_url: row.try_get("banner_url")?,
        creator_id: row.try_get("creator_id")?,
        is_approved: row.try_get("is_approved")?,
        categories: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn validate_name(name: &str) -> DatabaseResult<()> {
    if name.trim().is_empty() {
        return Err(DatabaseError::ValidationError(
            "community name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Whether the community exists and is not soft-deleted.
pub(crate) async fn community_is_live(
    conn: &mut SqliteConnection,
    community_id: Uuid,
) -> DatabaseResult<bool> {
    let live: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM communities WHERE community_id = ? AND deleted_at IS NULL)",
    )
    .bind(community_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(live)
}

/// Trimmed, de-duplicated, non-empty category names.
fn normalize_categories(categories: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(categories.len());
    for name in categories.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Predicates shared by a page query and its count query.
#[derive(Debug, Default)]
struct CommunityFilter {
    pattern: Option<String>,
    is_approved: Option<bool>,
    community_ids: Option<Vec<Uuid>>,
}

impl CommunityFilter {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" WHERE c.deleted_at IS NULL");

        if let Some(pattern) = &self.pattern {
            builder.push(" AND (c.name_folded LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\' OR c.description_folded LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\')");
        }

        if let Some(is_approved) = self.is_approved {
            builder.push(" AND c.is_approved = ");
            builder.push_bind(is_approved);
        }

        if let Some(ids) = &self.community_ids {
            builder.push(" AND c.community_id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }
    }
}

/// Repository for community database operations
pub struct CommunityRepository {
    pool: SqlitePool,
}

impl CommunityRepository {
    /// Create a new community repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new community
    pub async fn create(&self, request: &CreateCommunityRequest) -> DatabaseResult<Community> {
        let mut conn = self.pool.acquire().await?;
        self.create_tx(&mut conn, request).await
    }

    /// Create a community on a caller-managed connection or transaction
    pub async fn create_tx(
        &self,
        conn: &mut SqliteConnection,
        request: &CreateCommunityRequest,
    ) -> DatabaseResult<Community> {
        validate_name(&request.name)?;

        let now = Utc::now();
        let community = Community {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            description: request.description.clone(),
            logo_url: request.logo_url.clone(),
            banner_url: request.banner_url.clone(),
            creator_id: request.creator_id,
            is_approved: request.is_approved,
            categories: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        sqlx::query(
            "INSERT INTO communities (community_id, name, description, name_folded, description_folded,
                                      logo_url, banner_url, creator_id, is_approved, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(community.id)
        .bind(&community.name)
        .bind(&community.description)
        .bind(fold_case(&community.name))
        .bind(fold_case(&community.description))
        .bind(&community.logo_url)
        .bind(&community.banner_url)
        .bind(community.creator_id)
        .bind(community.is_approved)
        .bind(community.created_at)
        .bind(community.updated_at)
        .execute(&mut *conn)
        .await?;

        info!(
            community_id = %community.id,
            name = %community.name,
            creator_id = %community.creator_id,
            "created new community"
        );

        Ok(community)
    }

    /// Find a live community by ID
    pub async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Community>> {
        let row = sqlx::query(&format!(
            "SELECT {COMMUNITY_COLUMNS} FROM communities c WHERE c.community_id = ? AND c.deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.single_with_categories(row).await
    }

    /// Find a live community by its unique name
    pub async fn find_by_name(&self, name: &str) -> DatabaseResult<Option<Community>> {
        let row = sqlx::query(&format!(
            "SELECT {COMMUNITY_COLUMNS} FROM communities c WHERE c.name = ? AND c.deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        self.single_with_categories(row).await
    }

    /// Save every mutable column of a community
    pub async fn update(&self, community: &Community) -> DatabaseResult<Community> {
        validate_name(&community.name)?;
        let now = Utc::now();
        let name = community.name.trim();

        let result = sqlx::query(
            "UPDATE communities
             SET name = ?, description = ?, name_folded = ?, description_folded = ?,
                 logo_url = ?, banner_url = ?, is_approved = ?, updated_at = ?
             WHERE community_id = ? AND deleted_at IS NULL",
        )
        .bind(name)
        .bind(&community.description)
        .bind(fold_case(name))
        .bind(fold_case(&community.description))
        .bind(&community.logo_url)
        .bind(&community.banner_url)
        .bind(community.is_approved)
        .bind(now)
        .bind(community.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("community {}", community.id)));
        }

        info!(community_id = %community.id, "updated community");

        self.find_by_id(community.id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("community {}", community.id)))
    }

    /// Soft delete a community. Deleting a missing community is a no-op.
    pub async fn delete(&self, id: Uuid) -> DatabaseResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE communities SET deleted_at = ?, updated_at = ? WHERE community_id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        info!(community_id = %id, removed = result.rows_affected(), "soft deleted community");
        Ok(())
    }

    /// Page through all live communities
    pub async fn list(&self, offset: i64, limit: i64) -> DatabaseResult<Vec<Community>> {
        let page = Pagination::new(offset, limit);
        self.fetch_page(&CommunityFilter::default(), page).await
    }

    /// Page through communities tagged with any of the given category names
    pub async fn list_by_categories(
        &self,
        categories: &[String],
        offset: i64,
        limit: i64,
    ) -> DatabaseResult<Vec<Community>> {
        let page = Pagination::new(offset, limit);
        let names = normalize_categories(categories);

        if names.is_empty() {
            return self.fetch_page(&CommunityFilter::default(), page).await;
        }

        let ids = self.community_ids_for_categories(&names).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let filter = CommunityFilter {
            community_ids: Some(ids),
            ..CommunityFilter::default()
        };
        self.fetch_page(&filter, page).await
    }

    /// Case-insensitive search over name and description with optional
    /// category and approval filters. Returns the page and the total match count.
    pub async fn search(
        &self,
        query: &str,
        categories: &[String],
        is_approved: Option<bool>,
        offset: i64,
        limit: i64,
    ) -> DatabaseResult<Paginated<Community>> {
        let page = Pagination::new(offset, limit);
        let query = query.trim();

        let mut filter = CommunityFilter {
            pattern: (!query.is_empty()).then(|| like_pattern(query)),
            is_approved,
            community_ids: None,
        };

        let names = normalize_categories(categories);
        if !names.is_empty() {
            let ids = self.community_ids_for_categories(&names).await?;
            if ids.is_empty() {
                debug!(?names, "no communities in requested categories");
                return Ok(Paginated::empty());
            }
            filter.community_ids = Some(ids);
        }

        let total = self.count_matching(&filter).await?;
        let items = if total == 0 {
            Vec::new()
        } else {
            self.fetch_page(&filter, page).await?
        };

        debug!(query, total, returned = items.len(), "community search");
        Ok(Paginated { items, total })
    }

    /// Communities the user belongs to (`"member"`) or has a pending request
    /// for (`"pending"`). Any other status is rejected.
    pub async fn list_by_user_membership(
        &self,
        user_id: Uuid,
        status: &str,
        offset: i64,
        limit: i64,
    ) -> DatabaseResult<Paginated<Community>> {
        let status: MembershipStatus = status.parse()?;
        let page = Pagination::new(offset, limit);

        let from_clause = match status {
            MembershipStatus::Member => {
                "FROM communities c
                 JOIN community_members cm ON cm.community_id = c.community_id
                 WHERE c.deleted_at IS NULL AND cm.user_id = ? AND cm.deleted_at IS NULL"
            }
            MembershipStatus::Pending => {
                "FROM communities c
                 JOIN community_join_requests cjr ON cjr.community_id = c.community_id
                 WHERE c.deleted_at IS NULL AND cjr.user_id = ? AND cjr.status = 'pending'"
            }
        };

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(DISTINCT c.community_id) {from_clause}"
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT DISTINCT {COMMUNITY_COLUMNS} {from_clause}{COMMUNITY_ORDER} LIMIT ? OFFSET ?"
        ))
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        let mut items = rows.iter().map(map_community).collect::<DatabaseResult<Vec<_>>>()?;
        self.attach_categories(&mut items).await?;

        debug!(%user_id, %status, total, "listed communities by membership");
        Ok(Paginated { items, total })
    }

    /// Number of live communities
    pub async fn count_all(&self) -> DatabaseResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM communities WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn fetch_page(
        &self,
        filter: &CommunityFilter,
        page: Pagination,
    ) -> DatabaseResult<Vec<Community>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT DISTINCT {COMMUNITY_COLUMNS} FROM communities c"
        ));
        filter.push_where(&mut builder);
        builder.push(COMMUNITY_ORDER);
        builder.push(" LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut communities = rows.iter().map(map_community).collect::<DatabaseResult<Vec<_>>>()?;
        self.attach_categories(&mut communities).await?;
        Ok(communities)
    }

    async fn count_matching(&self, filter: &CommunityFilter) -> DatabaseResult<i64> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(DISTINCT c.community_id) FROM communities c");
        filter.push_where(&mut builder);

        let total: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(total)
    }

    /// First step of category filtering: names to community IDs, one row per community.
    async fn community_ids_for_categories(&self, names: &[String]) -> DatabaseResult<Vec<Uuid>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT cc.community_id FROM community_categories cc
             JOIN categories cat ON cat.category_id = cc.category_id
             WHERE cat.name IN (",
        );
        let mut separated = builder.separated(", ");
        for name in names {
            separated.push_bind(name.clone());
        }
        separated.push_unseparated(") GROUP BY cc.community_id");

        let ids: Vec<Uuid> = builder.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(ids)
    }

    async fn single_with_categories(
        &self,
        row: Option<SqliteRow>,
    ) -> DatabaseResult<Option<Community>> {
        let Some(row) = row else {
            return Ok(None);
        };

        let mut communities = vec![map_community(&row)?];
        self.attach_categories(&mut communities).await?;
        Ok(communities.pop())
    }

    async fn attach_categories(&self, communities: &mut [Community]) -> DatabaseResult<()> {
        if communities.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT cc.community_id AS owner_id, cat.category_id, cat.name, cat.created_at, cat.updated_at
             FROM community_categories cc
             JOIN categories cat ON cat.category_id = cc.category_id
             WHERE cc.community_id IN (",
        );
        let mut separated = builder.separated(", ");
        for community in communities.iter() {
            separated.push_bind(community.id);
        }
        separated.push_unseparated(") ORDER BY cat.name ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut by_owner: HashMap<Uuid, Vec<Category>> = HashMap::new();
        for row in &rows {
            let owner: Uuid = row.try_get("owner_id")?;
            by_owner.entry(owner).or_default().push(map_category(row)?);
        }

        for community in communities.iter_mut() {
            community.categories = by_owner.remove(&community.id).unwrap_or_default();
        }

        Ok(())
    }
}

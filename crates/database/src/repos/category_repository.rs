//! Repository for categories and the community/category association table.

use crate::entities::Category;
use crate::types::{DatabaseError, DatabaseResult};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

fn validate_name(name: &str) -> DatabaseResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DatabaseError::ValidationError(
            "category name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

pub(crate) fn map_category(row: &SqliteRow) -> DatabaseResult<Category> {
    Ok(Category {
        id: row.try_get("category_id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Repository for category database operations
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    /// Create a new category repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a category with a unique name
    pub async fn create(&self, name: &str) -> DatabaseResult<Category> {
        let mut conn = self.pool.acquire().await?;
        self.create_tx(&mut conn, name).await
    }

    pub async fn create_tx(&self, conn: &mut SqliteConnection, name: &str) -> DatabaseResult<Category> {
        let name = validate_name(name)?;

        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO categories (category_id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&mut *conn)
        .await?;

        info!(category_id = %category.id, name = %category.name, "created category");
        Ok(category)
    }

    pub async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Category>> {
        let row = sqlx::query(
            "SELECT category_id, name, created_at, updated_at FROM categories WHERE category_id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_category).transpose()
    }

    pub async fn find_by_name(&self, name: &str) -> DatabaseResult<Option<Category>> {
        let row = sqlx::query(
            "SELECT category_id, name, created_at, updated_at FROM categories WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_category).transpose()
    }

    /// All categories, alphabetically
    pub async fn list(&self) -> DatabaseResult<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT category_id, name, created_at, updated_at FROM categories ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_category).collect()
    }

    /// Save a renamed category
    pub async fn update(&self, category: &Category) -> DatabaseResult<Category> {
        let name = validate_name(&category.name)?;
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE categories SET name = ?, updated_at = ? WHERE category_id = ?",
        )
        .bind(name)
        .bind(now)
        .bind(category.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("category {}", category.id)));
        }

        info!(category_id = %category.id, %name, "updated category");

        self.find_by_id(category.id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("category {}", category.id)))
    }

    /// Delete a category; its community associations go with it
    pub async fn delete(&self, id: Uuid) -> DatabaseResult<()> {
        let result = sqlx::query("DELETE FROM categories WHERE category_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        info!(category_id = %id, removed = result.rows_affected(), "deleted category");
        Ok(())
    }

    /// Link a community to a category. Linking twice is a no-op.
    pub async fn add_community_to_category(
        &self,
        community_id: Uuid,
        category_id: Uuid,
    ) -> DatabaseResult<()> {
        let mut conn = self.pool.acquire().await?;
        self.add_community_to_category_tx(&mut conn, community_id, category_id)
            .await
    }

    pub async fn add_community_to_category_tx(
        &self,
        conn: &mut SqliteConnection,
        community_id: Uuid,
        category_id: Uuid,
    ) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO community_categories (community_id, category_id, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT (community_id, category_id) DO NOTHING",
        )
        .bind(community_id)
        .bind(category_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        info!(%community_id, %category_id, "linked community to category");
        Ok(())
    }

    pub async fn remove_community_from_category(
        &self,
        community_id: Uuid,
        category_id: Uuid,
    ) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM community_categories WHERE community_id = ? AND category_id = ?")
            .bind(community_id)
            .bind(category_id)
            .execute(&self.pool)
            .await?;

        info!(%community_id, %category_id, "unlinked community from category");
        Ok(())
    }

    /// Categories a community belongs to, resolved through the join table
    pub async fn get_categories_by_community(
        &self,
        community_id: Uuid,
    ) -> DatabaseResult<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT c.category_id, c.name, c.created_at, c.updated_at
             FROM categories c
             JOIN community_categories cc ON cc.category_id = c.category_id
             WHERE cc.community_id = ?
             ORDER BY c.name ASC",
        )
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(%community_id, count = rows.len(), "loaded categories for community");
        rows.iter().map(map_category).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_pool, insert_community};

    #[tokio::test]
    async fn test_create_and_find_category() {
        let (pool, _temp_dir) = create_test_pool().await;
        let repo = CategoryRepository::new(pool);

        let created = repo.create("Technology").await.unwrap();
        let by_id = repo.find_by_id(created.id).await.unwrap().unwrap();
        let by_name = repo.find_by_name("Technology").await.unwrap().unwrap();

        assert_eq!(by_id, created);
        assert_eq!(by_name.id, created.id);
        assert!(repo.find_by_name("Gaming").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_and_blank_names_rejected() {
        let (pool, _temp_dir) = create_test_pool().await;
        let repo = CategoryRepository::new(pool);

        repo.create("Music").await.unwrap();
        assert!(matches!(
            repo.create("Music").await,
            Err(DatabaseError::Duplicate(_))
        ));
        assert!(matches!(
            repo.create("   ").await,
            Err(DatabaseError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_category() {
        let (pool, _temp_dir) = create_test_pool().await;
        let repo = CategoryRepository::new(pool);

        let mut category = repo.create("Sport").await.unwrap();
        category.name = "Sports".to_string();
        let updated = repo.update(&category).await.unwrap();
        assert_eq!(updated.name, "Sports");

        repo.delete(category.id).await.unwrap();
        assert!(repo.find_by_id(category.id).await.unwrap().is_none());
        // deleting again is fine
        repo.delete(category.id).await.unwrap();

        assert!(repo.update(&category).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_rejects_blank_name() {
        let (pool, _temp_dir) = create_test_pool().await;
        let repo = CategoryRepository::new(pool);

        let mut category = repo.create("Travel").await.unwrap();
        category.name = " \t ".to_string();
        assert!(matches!(
            repo.update(&category).await,
            Err(DatabaseError::ValidationError(_))
        ));

        let stored = repo.find_by_id(category.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Travel");
    }

    #[tokio::test]
    async fn test_community_category_links() {
        let (pool, _temp_dir) = create_test_pool().await;
        let community_id = insert_community(&pool, "Rustaceans", true).await;
        let repo = CategoryRepository::new(pool);

        let tech = repo.create("Technology").await.unwrap();
        let games = repo.create("Gaming").await.unwrap();

        repo.add_community_to_category(community_id, tech.id).await.unwrap();
        repo.add_community_to_category(community_id, tech.id).await.unwrap();
        repo.add_community_to_category(community_id, games.id).await.unwrap();

        let names: Vec<String> = repo
            .get_categories_by_community(community_id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Gaming", "Technology"]);

        repo.remove_community_from_category(community_id, games.id).await.unwrap();
        repo.remove_community_from_category(community_id, games.id).await.unwrap();
        assert_eq!(repo.get_categories_by_community(community_id).await.unwrap().len(), 1);

        repo.delete(tech.id).await.unwrap();
        assert!(repo.get_categories_by_community(community_id).await.unwrap().is_empty());
    }
}

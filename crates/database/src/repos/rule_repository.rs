//! Repository for community rules.

use crate::entities::{CommunityRule, CreateRuleRequest};
use crate::types::{DatabaseError, DatabaseResult};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

fn map_rule(row: &SqliteRow) -> DatabaseResult<CommunityRule> {
    Ok(CommunityRule {
        id: row.try_get("rule_id")?,
        community_id: row.try_get("community_id")?,
        rule_text: row.try_get("rule_text")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn validate_rule_text(text: &str) -> DatabaseResult<()> {
    if text.trim().is_empty() {
        return Err(DatabaseError::ValidationError(
            "rule text must not be empty".to_string(),
        ));
    }
    Ok(())
}

pub struct CommunityRuleRepository {
    pool: SqlitePool,
}

impl CommunityRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add(&self, request: &CreateRuleRequest) -> DatabaseResult<CommunityRule> {
        let mut conn = self.pool.acquire().await?;
        self.add_tx(&mut conn, request).await
    }

    pub async fn add_tx(
        &self,
        conn: &mut SqliteConnection,
        request: &CreateRuleRequest,
    ) -> DatabaseResult<CommunityRule> {
        validate_rule_text(&request.rule_text)?;

        let now = Utc::now();
        let rule = CommunityRule {
            id: Uuid::new_v4(),
            community_id: request.community_id,
            rule_text: request.rule_text.trim().to_string(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO community_rules (rule_id, community_id, rule_text, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(rule.id)
        .bind(rule.community_id)
        .bind(&rule.rule_text)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&mut *conn)
        .await?;

        info!(rule_id = %rule.id, community_id = %rule.community_id, "added community rule");
        Ok(rule)
    }

    /// Delete a rule. Removing a missing rule is a no-op.
    pub async fn remove(&self, rule_id: Uuid) -> DatabaseResult<()> {
        let result = sqlx::query("DELETE FROM community_rules WHERE rule_id = ?")
            .bind(rule_id)
            .execute(&self.pool)
            .await?;

        info!(%rule_id, removed = result.rows_affected(), "removed community rule");
        Ok(())
    }

    pub async fn find_by_id(&self, rule_id: Uuid) -> DatabaseResult<Option<CommunityRule>> {
        let row = sqlx::query(
            "SELECT rule_id, community_id, rule_text, created_at, updated_at
             FROM community_rules WHERE rule_id = ?",
        )
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_rule).transpose()
    }

    /// Rules of a community in the order they were added
    pub async fn find_by_community(&self, community_id: Uuid) -> DatabaseResult<Vec<CommunityRule>> {
        let rows = sqlx::query(
            "SELECT rule_id, community_id, rule_text, created_at, updated_at
             FROM community_rules WHERE community_id = ?
             ORDER BY created_at ASC, rule_id ASC",
        )
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_rule).collect()
    }

    pub async fn update(&self, rule: &CommunityRule) -> DatabaseResult<CommunityRule> {
        validate_rule_text(&rule.rule_text)?;
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE community_rules SET rule_text = ?, updated_at = ? WHERE rule_id = ?",
        )
        .bind(rule.rule_text.trim())
        .bind(now)
        .bind(rule.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("rule {}", rule.id)));
        }

        info!(rule_id = %rule.id, "updated community rule");

        self.find_by_id(rule.id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("rule {}", rule.id)))
    }
}

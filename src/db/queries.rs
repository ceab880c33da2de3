// Query helpers for teams and API keys.
//
// Team-owned CRM data never goes through here; it is only reachable via
// `crm::CrmRepository`, which applies the tenant filter.

use crate::db::schema::*;
use crate::types::generate_key;
use anyhow::{Result, anyhow};
use surrealdb::RecordId;
use surrealdb::{Surreal, engine::any::Any};

pub struct QueryBuilder;

impl QueryBuilder {
    /// Create a team with a freshly generated key.
    pub async fn create_team(db: &Surreal<Any>, data: &TeamCreate) -> Result<TeamRecord> {
        let key = generate_key();
        let mut res = db
            .query(
                r#"
                CREATE type::thing('team', $key) CONTENT {
                    key: $key,
                    slug: $slug,
                    name: $name,
                    created_at: time::now()
                }
                "#,
            )
            .bind(("key", key))
            .bind(("slug", data.slug.clone()))
            .bind(("name", data.name.clone()))
            .await?;

        let created: Option<TeamRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create team record"))
    }

    pub async fn find_team_by_key(db: &Surreal<Any>, key: &str) -> Result<Option<TeamRecord>> {
        let mut res = db
            .query("SELECT * FROM team WHERE key = $key LIMIT 1")
            .bind(("key", key.to_string()))
            .await?;

        let team: Option<TeamRecord> = res.take(0)?;
        Ok(team)
    }

    pub async fn find_team_by_slug(db: &Surreal<Any>, slug: &str) -> Result<Option<TeamRecord>> {
        let mut res = db
            .query("SELECT * FROM team WHERE slug = $slug LIMIT 1")
            .bind(("slug", slug.to_string()))
            .await?;

        let team: Option<TeamRecord> = res.take(0)?;
        Ok(team)
    }

    pub async fn list_teams(db: &Surreal<Any>) -> Result<Vec<TeamRecord>> {
        let mut res = db.query("SELECT * FROM team ORDER BY slug ASC").await?;
        let teams: Vec<TeamRecord> = res.take(0)?;
        Ok(teams)
    }

    /// Store a new API key (hash only).
    pub async fn create_api_key(db: &Surreal<Any>, data: &ApiKeyCreate) -> Result<ApiKeyRecord> {
        let mut res = db
            .query(
                r#"
                CREATE api_key CONTENT {
                    key_hash: $key_hash,
                    key_prefix: $key_prefix,
                    user_id: $user_id,
                    name: $name,
                    is_active: true,
                    expires_at: $expires_at,
                    created_at: time::now()
                }
                "#,
            )
            .bind(("key_hash", data.key_hash.clone()))
            .bind(("key_prefix", data.key_prefix.clone()))
            .bind(("user_id", data.user_id.clone()))
            .bind(("name", data.name.clone()))
            .bind(("expires_at", data.expires_at.clone()))
            .await?;

        let created: Option<ApiKeyRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create api key record"))
    }

    pub async fn find_api_key_by_hash(
        db: &Surreal<Any>,
        key_hash: &str,
    ) -> Result<Option<ApiKeyRecord>> {
        let mut res = db
            .query("SELECT * FROM api_key WHERE key_hash = $key_hash LIMIT 1")
            .bind(("key_hash", key_hash.to_string()))
            .await?;

        let key: Option<ApiKeyRecord> = res.take(0)?;
        Ok(key)
    }

    pub async fn update_api_key_last_used(db: &Surreal<Any>, id: &RecordId) -> Result<()> {
        db.query("UPDATE $id SET last_used_at = time::now()")
            .bind(("id", id.clone()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn list_api_keys(db: &Surreal<Any>) -> Result<Vec<ApiKeyRecord>> {
        let mut res = db
            .query("SELECT * FROM api_key ORDER BY created_at DESC")
            .await?;
        let keys: Vec<ApiKeyRecord> = res.take(0)?;
        Ok(keys)
    }

    pub async fn list_active_api_keys(db: &Surreal<Any>) -> Result<Vec<ApiKeyRecord>> {
        let mut res = db
            .query("SELECT * FROM api_key WHERE is_active = true ORDER BY created_at DESC")
            .await?;
        let keys: Vec<ApiKeyRecord> = res.take(0)?;
        Ok(keys)
    }

    /// Revoke every key with the given prefix. Returns whether any key matched.
    pub async fn deactivate_api_key_by_prefix(db: &Surreal<Any>, prefix: &str) -> Result<bool> {
        let mut res = db
            .query("UPDATE api_key SET is_active = false WHERE key_prefix = $prefix RETURN AFTER")
            .bind(("prefix", prefix.to_string()))
            .await?;
        let updated: Vec<ApiKeyRecord> = res.take(0)?;
        Ok(!updated.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};
    use crate::types::{ApiKeyHash, ApiKeyPrefix};

    async fn setup_test_db() -> Surreal<Any> {
        let db = create_connection(DatabaseConfig::memory()).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_create_and_find_team() {
        let db = setup_test_db().await;
        let team = QueryBuilder::create_team(
            &db,
            &TeamCreate {
                slug: "acme".to_string(),
                name: "Acme".to_string(),
            },
        )
        .await
        .unwrap();

        let by_key = QueryBuilder::find_team_by_key(&db, &team.key).await.unwrap();
        assert_eq!(by_key.unwrap().slug, "acme");

        let by_slug = QueryBuilder::find_team_by_slug(&db, "acme").await.unwrap();
        assert_eq!(by_slug.unwrap().key, team.key);

        assert!(QueryBuilder::find_team_by_slug(&db, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_team_slug_rejected() {
        let db = setup_test_db().await;
        let create = TeamCreate {
            slug: "acme".to_string(),
            name: "Acme".to_string(),
        };
        QueryBuilder::create_team(&db, &create).await.unwrap();
        assert!(QueryBuilder::create_team(&db, &create).await.is_err());
    }

    #[tokio::test]
    async fn test_api_key_lifecycle() {
        let db = setup_test_db().await;
        let created = QueryBuilder::create_api_key(
            &db,
            &ApiKeyCreate {
                key_hash: ApiKeyHash::new("abc123"),
                key_prefix: ApiKeyPrefix::new("lc_test"),
                user_id: "u1".to_string(),
                name: Some("zapier".to_string()),
                expires_at: None,
            },
        )
        .await
        .unwrap();
        assert!(created.is_active);

        let found = QueryBuilder::find_api_key_by_hash(&db, "abc123").await.unwrap();
        assert_eq!(found.unwrap().user_id, "u1");

        assert!(QueryBuilder::deactivate_api_key_by_prefix(&db, "lc_test").await.unwrap());
        assert!(!QueryBuilder::deactivate_api_key_by_prefix(&db, "lc_none").await.unwrap());
        assert!(QueryBuilder::list_active_api_keys(&db).await.unwrap().is_empty());
        assert_eq!(QueryBuilder::list_api_keys(&db).await.unwrap().len(), 1);
    }
}

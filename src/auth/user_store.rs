//! User storage and management.

use anyhow::Result;

use crate::access::QueryFilter;
use crate::db::Db;
use crate::db::schema::{AuditLogCreate, AuditLogRecord, UserCreate, UserRecord};
use crate::types::generate_key;

/// User store for database operations.
#[derive(Clone)]
pub struct UserStore {
    db: Db,
}

impl UserStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Create a new, active user.
    pub async fn create_user(&self, create: &UserCreate) -> Result<UserRecord> {
        let key = generate_key();

        let query = r#"
            CREATE type::thing('user', $key) CONTENT {
                key: $key,
                email: $email,
                display_name: $display_name,
                team_id: $team_id,
                team_role: $team_role,
                is_admin: $is_admin,
                is_active: true,
                created_at: time::now(),
                updated_at: time::now()
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("key", key))
            .bind(("email", create.email.clone()))
            .bind(("display_name", create.display_name.clone()))
            .bind(("team_id", create.team_id.clone()))
            .bind(("team_role", create.team_role.clone()))
            .bind(("is_admin", create.is_admin))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        users
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Failed to create user"))
    }

    /// Get a user by key.
    pub async fn get_user(&self, key: &str) -> Result<Option<UserRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM user WHERE key = $key LIMIT 1")
            .bind(("key", key.to_string()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM user WHERE email = $email LIMIT 1")
            .bind(("email", email.to_string()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Update the user's last_seen_at timestamp.
    pub async fn touch_last_seen(&self, key: &str) -> Result<()> {
        self.db
            .query("UPDATE user SET last_seen_at = time::now() WHERE key = $key")
            .bind(("key", key.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn deactivate_user(&self, key: &str) -> Result<()> {
        self.set_active(key, false).await
    }

    pub async fn reactivate_user(&self, key: &str) -> Result<()> {
        self.set_active(key, true).await
    }

    async fn set_active(&self, key: &str, active: bool) -> Result<()> {
        let query = r#"
            UPDATE user SET
                is_active = $active,
                updated_at = time::now()
            WHERE key = $key
        "#;

        self.db
            .query(query)
            .bind(("key", key.to_string()))
            .bind(("active", active))
            .await?
            .check()?;
        Ok(())
    }

    /// Move a user into a team with a role, or out of any team with `None`.
    pub async fn set_membership(
        &self,
        key: &str,
        team_id: Option<&str>,
        team_role: Option<&str>,
    ) -> Result<Option<UserRecord>> {
        let query = r#"
            UPDATE user SET
                team_id = $team_id,
                team_role = $team_role,
                updated_at = time::now()
            WHERE key = $key
            RETURN AFTER
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("key", key.to_string()))
            .bind(("team_id", team_id.map(str::to_string)))
            .bind(("team_role", team_role.map(str::to_string)))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Set or clear the legacy admin flag.
    pub async fn set_legacy_admin(&self, key: &str, is_admin: bool) -> Result<()> {
        self.db
            .query("UPDATE user SET is_admin = $is_admin, updated_at = time::now() WHERE key = $key")
            .bind(("key", key.to_string()))
            .bind(("is_admin", is_admin))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn list_team_members(&self, team_key: &str) -> Result<Vec<UserRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM user WHERE team_id = $team_id ORDER BY email ASC")
            .bind(("team_id", team_key.to_string()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users)
    }

    /// Write an audit log entry.
    pub async fn audit_log(&self, entry: AuditLogCreate) -> Result<()> {
        let query = r#"
            CREATE audit_log CONTENT {
                user_id: $user_id,
                team_id: $team_id,
                action: $action,
                resource_type: $resource_type,
                resource_id: $resource_id,
                details: $details,
                created_at: time::now()
            }
        "#;

        self.db
            .query(query)
            .bind(("user_id", entry.user_id))
            .bind(("team_id", entry.team_id))
            .bind(("action", entry.action))
            .bind(("resource_type", entry.resource_type))
            .bind(("resource_id", entry.resource_id))
            .bind(("details", entry.details))
            .await?
            .check()?;

        Ok(())
    }

    /// Read audit entries matching an already tenant-scoped filter.
    pub async fn audit_entries(
        &self,
        filter: &QueryFilter,
        limit: u32,
    ) -> Result<Vec<AuditLogRecord>> {
        let query = format!(
            "SELECT * FROM audit_log {} ORDER BY created_at DESC LIMIT $limit",
            filter.where_clause()
        );

        let mut res = self
            .db
            .query(query)
            .bind(filter.bindings())
            .bind(("limit", limit))
            .await?;

        let logs: Vec<AuditLogRecord> = res.take(0)?;
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};

    async fn setup_store() -> UserStore {
        let db = create_connection(DatabaseConfig::memory()).await.unwrap();
        ensure_schema(&db).await.unwrap();
        UserStore::new(db)
    }

    fn new_user(email: &str) -> UserCreate {
        UserCreate {
            email: email.to_string(),
            display_name: Some("Test User".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let store = setup_store().await;
        let user = store.create_user(&new_user("a@example.com")).await.unwrap();

        assert!(user.is_active);
        assert!(!user.is_admin);
        assert!(user.team_id.is_none());

        let fetched = store.get_user(&user.key).await.unwrap().unwrap();
        assert_eq!(fetched.email, "a@example.com");

        let by_email = store.get_user_by_email("a@example.com").await.unwrap();
        assert_eq!(by_email.unwrap().key, user.key);
    }

    #[tokio::test]
    async fn test_missing_user_is_none() {
        let store = setup_store().await;
        assert!(store.get_user("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_deactivation() {
        let store = setup_store().await;
        let user = store.create_user(&new_user("a@example.com")).await.unwrap();

        store.deactivate_user(&user.key).await.unwrap();
        assert!(!store.get_user(&user.key).await.unwrap().unwrap().is_active);

        store.reactivate_user(&user.key).await.unwrap();
        assert!(store.get_user(&user.key).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_set_membership_and_list_members() {
        let store = setup_store().await;
        let a = store.create_user(&new_user("a@example.com")).await.unwrap();
        let b = store.create_user(&new_user("b@example.com")).await.unwrap();

        let updated = store
            .set_membership(&a.key, Some("t1"), Some("ADMIN"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.team_id.as_deref(), Some("t1"));
        assert_eq!(updated.team_role.as_deref(), Some("ADMIN"));

        store.set_membership(&b.key, Some("t2"), Some("MEMBER")).await.unwrap();

        let members = store.list_team_members("t1").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].key, a.key);

        store.set_membership(&a.key, None, None).await.unwrap();
        assert!(store.list_team_members("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_entries_are_filtered() {
        let store = setup_store().await;
        for team in ["t1", "t2"] {
            store
                .audit_log(AuditLogCreate {
                    user_id: Some("u1".to_string()),
                    team_id: Some(team.to_string()),
                    action: "record_created".to_string(),
                    resource_type: "lead".to_string(),
                    resource_id: None,
                    details: None,
                })
                .await
                .unwrap();
        }

        let all = store.audit_entries(&QueryFilter::match_all(), 10).await.unwrap();
        assert_eq!(all.len(), 2);

        let mut only_t1 = QueryFilter::match_all();
        only_t1.and_eq("team_id", "t1").unwrap();
        let scoped = store.audit_entries(&only_t1, 10).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].team_id.as_deref(), Some("t1"));
    }
}

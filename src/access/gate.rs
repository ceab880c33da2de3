use anyhow::Result;
use tracing::{debug, error};

use super::context::{AccessContext, Membership};
use super::role::TeamRole;
use crate::auth::{UserContext, UserStore};
use crate::config::AccessConfig;
use crate::db::{Db, QueryBuilder};
use crate::types::{TeamId, TeamSlug, UserId};

/// Resolves a session into an [`AccessContext`].
///
/// Stateless: every call reads the user and team fresh from the store, so
/// calling it twice in one request yields equal results and nothing is
/// cached across requests.
#[derive(Clone)]
pub struct TenantAccessGate {
    users: UserStore,
    db: Db,
    internal_team_slug: TeamSlug,
}

impl TenantAccessGate {
    pub fn new(db: Db, config: &AccessConfig) -> Self {
        Self {
            users: UserStore::new(db.clone()),
            db,
            internal_team_slug: TeamSlug::new(config.internal_team_slug.clone()),
        }
    }

    /// Resolve the caller's access.
    ///
    /// No session, an unknown or deactivated user yield
    /// [`AccessContext::none`]. Only a store failure is an error.
    pub async fn resolve(&self, session: Option<&UserContext>) -> Result<AccessContext> {
        let Some(session) = session else {
            return Ok(AccessContext::none());
        };

        match self.load_membership(session.user_id()).await {
            Ok(Some(membership)) => Ok(AccessContext::derive(
                membership,
                self.internal_team_slug.as_str(),
            )),
            Ok(None) => Ok(AccessContext::none()),
            Err(e) => {
                error!("Access resolution failed for {}: {}", session.user_id(), e);
                Err(e)
            }
        }
    }

    async fn load_membership(&self, user_id: &UserId) -> Result<Option<Membership>> {
        let Some(user) = self.users.get_user(user_id.as_str()).await? else {
            debug!("No user record for {}", user_id);
            return Ok(None);
        };
        if !user.is_active {
            debug!("User {} is deactivated", user_id);
            return Ok(None);
        }

        let team = match user.team_id.as_deref() {
            Some(team_key) => match QueryBuilder::find_team_by_key(&self.db, team_key).await? {
                Some(team) => Some((TeamId::new(team.key), TeamSlug::new(team.slug))),
                None => {
                    debug!("User {} references missing team {}", user_id, team_key);
                    None
                }
            },
            None => None,
        };

        let role = user.team_role.as_deref().and_then(|raw| {
            let parsed = TeamRole::parse(raw);
            if parsed.is_none() {
                debug!("Ignoring unknown team role {:?} for {}", raw, user_id);
            }
            parsed
        });

        Ok(Some(Membership {
            user_id: Some(UserId::new(user.key)),
            team,
            role,
            legacy_admin: user.is_admin,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::TenantScope;
    use crate::db::schema::{TeamCreate, UserCreate};
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};

    struct Fixture {
        gate: TenantAccessGate,
        store: UserStore,
        db: Db,
    }

    async fn setup() -> Fixture {
        let db = create_connection(DatabaseConfig::memory()).await.unwrap();
        ensure_schema(&db).await.unwrap();
        Fixture {
            gate: TenantAccessGate::new(db.clone(), &AccessConfig::default()),
            store: UserStore::new(db.clone()),
            db,
        }
    }

    impl Fixture {
        async fn team(&self, slug: &str) -> String {
            QueryBuilder::create_team(
                &self.db,
                &TeamCreate {
                    slug: slug.to_string(),
                    name: slug.to_uppercase(),
                },
            )
            .await
            .unwrap()
            .key
        }

        async fn user(&self, email: &str, team: Option<&str>, role: Option<&str>) -> UserContext {
            let user = self
                .store
                .create_user(&UserCreate {
                    email: email.to_string(),
                    team_id: team.map(str::to_string),
                    team_role: role.map(str::to_string),
                    ..Default::default()
                })
                .await
                .unwrap();
            UserContext::session(user.key, Some(user.email))
        }
    }

    #[tokio::test]
    async fn test_no_session_is_none() {
        let fx = setup().await;
        assert_eq!(fx.gate.resolve(None).await.unwrap(), AccessContext::none());
    }

    #[tokio::test]
    async fn test_unknown_user_is_none() {
        let fx = setup().await;
        let ghost = UserContext::session("ghost", None);
        assert_eq!(fx.gate.resolve(Some(&ghost)).await.unwrap(), AccessContext::none());
    }

    #[tokio::test]
    async fn test_deactivated_user_is_none() {
        let fx = setup().await;
        let t1 = fx.team("t1").await;
        let session = fx.user("a@example.com", Some(&t1), Some("ADMIN")).await;
        fx.store.deactivate_user(session.user_id().as_str()).await.unwrap();

        assert_eq!(fx.gate.resolve(Some(&session)).await.unwrap(), AccessContext::none());
    }

    #[tokio::test]
    async fn test_member_resolves_to_team_scope() {
        let fx = setup().await;
        let t1 = fx.team("t1").await;
        let session = fx.user("a@example.com", Some(&t1), Some("MEMBER")).await;

        let ctx = fx.gate.resolve(Some(&session)).await.unwrap();
        assert_eq!(ctx.scope(), TenantScope::Team(TeamId::new(t1)));
        assert_eq!(ctx.team_role, Some(TeamRole::Member));
        assert!(!ctx.is_admin);
        assert_eq!(ctx.user_id.as_ref(), Some(session.user_id()));
    }

    #[tokio::test]
    async fn test_internal_super_admin_is_unrestricted() {
        let fx = setup().await;
        let internal = fx.team("ledger1").await;
        let session = fx.user("ops@example.com", Some(&internal), Some("SUPER_ADMIN")).await;

        let ctx = fx.gate.resolve(Some(&session)).await.unwrap();
        assert!(ctx.is_global_admin);
        assert_eq!(ctx.scope(), TenantScope::Unrestricted);
    }

    #[tokio::test]
    async fn test_missing_team_is_treated_as_no_team() {
        let fx = setup().await;
        let session = fx.user("a@example.com", Some("deleted-team"), Some("OWNER")).await;

        let ctx = fx.gate.resolve(Some(&session)).await.unwrap();
        assert_eq!(ctx.scope(), TenantScope::NoAccess);
        assert!(ctx.team_id.is_none());
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let fx = setup().await;
        let t1 = fx.team("t1").await;
        let session = fx.user("a@example.com", Some(&t1), Some("OWNER")).await;

        let first = fx.gate.resolve(Some(&session)).await.unwrap();
        let second = fx.gate.resolve(Some(&session)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_legacy_admin_flag_lifts_admin_but_not_scope() {
        let fx = setup().await;
        let t1 = fx.team("t1").await;
        let session = fx.user("old@example.com", Some(&t1), Some("MEMBER")).await;
        assert!(!fx.gate.resolve(Some(&session)).await.unwrap().is_admin);

        fx.store
            .set_legacy_admin(session.user_id().as_str(), true)
            .await
            .unwrap();
        let ctx = fx.gate.resolve(Some(&session)).await.unwrap();
        assert!(ctx.is_admin);
        assert!(!ctx.is_global_admin);
        assert_eq!(ctx.scope(), TenantScope::Team(TeamId::new(t1)));

        fx.store
            .set_legacy_admin(session.user_id().as_str(), false)
            .await
            .unwrap();
        assert!(!fx.gate.resolve(Some(&session)).await.unwrap().is_admin);
    }

    #[tokio::test]
    async fn test_role_change_is_seen_on_next_request() {
        let fx = setup().await;
        let internal = fx.team("ledger1").await;
        let session = fx.user("ops@example.com", Some(&internal), Some("OWNER")).await;
        assert!(!fx.gate.resolve(Some(&session)).await.unwrap().is_global_admin);

        fx.store
            .set_membership(session.user_id().as_str(), Some(&internal), Some("SUPER_ADMIN"))
            .await
            .unwrap();
        assert!(fx.gate.resolve(Some(&session)).await.unwrap().is_global_admin);
    }
}

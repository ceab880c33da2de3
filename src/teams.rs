//! Team administration gated by the caller's access context.

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::access::{AccessContext, QueryFilter, TeamRole};
use crate::auth::UserStore;
use crate::crm::CrmError;
use crate::db::schema::{AuditAction, AuditLogCreate, AuditLogRecord, TeamCreate, TeamRecord, UserRecord};
use crate::db::{Db, QueryBuilder};
use crate::types::TeamId;

/// Public view of a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamView {
    pub key: String,
    pub slug: String,
    pub name: String,
}

impl From<TeamRecord> for TeamView {
    fn from(team: TeamRecord) -> Self {
        Self {
            key: team.key,
            slug: team.slug,
            name: team.name,
        }
    }
}

/// Public view of a team member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    pub key: String,
    pub email: String,
    pub display_name: Option<String>,
    pub team_id: Option<String>,
    pub team_role: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
}

impl From<UserRecord> for MemberView {
    fn from(user: UserRecord) -> Self {
        Self {
            key: user.key,
            email: user.email,
            display_name: user.display_name,
            team_id: user.team_id,
            team_role: user.team_role,
            is_admin: user.is_admin,
            is_active: user.is_active,
        }
    }
}

/// Public view of an audit entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditView {
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: Option<String>,
}

impl From<AuditLogRecord> for AuditView {
    fn from(entry: AuditLogRecord) -> Self {
        Self {
            user_id: entry.user_id,
            team_id: entry.team_id,
            action: entry.action,
            resource_type: entry.resource_type,
            resource_id: entry.resource_id,
            details: entry.details,
            created_at: entry.created_at.map(|d| d.0.to_rfc3339()),
        }
    }
}

/// Lowercase letters, digits and dashes, not starting with a dash.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn forbidden(msg: &str) -> anyhow::Error {
    CrmError::Forbidden(msg.to_string()).into()
}

fn bad_request(msg: impl Into<String>) -> anyhow::Error {
    CrmError::BadRequest(msg.into()).into()
}

#[derive(Clone)]
pub struct TeamAdmin {
    db: Db,
    users: UserStore,
}

impl TeamAdmin {
    pub fn new(db: Db) -> Self {
        Self {
            users: UserStore::new(db.clone()),
            db,
        }
    }

    /// Create a tenant. Global admins only.
    pub async fn create_team(&self, access: &AccessContext, slug: &str, name: &str) -> Result<TeamView> {
        if !access.is_global_admin {
            return Err(forbidden("only global admins may create teams"));
        }
        if !is_valid_slug(slug) {
            return Err(bad_request(format!("invalid team slug: {}", slug)));
        }
        if QueryBuilder::find_team_by_slug(&self.db, slug).await?.is_some() {
            return Err(bad_request(format!("team slug already taken: {}", slug)));
        }

        let team = QueryBuilder::create_team(
            &self.db,
            &TeamCreate {
                slug: slug.to_string(),
                name: name.to_string(),
            },
        )
        .await?;

        info!("Created team {} ({})", team.slug, team.key);
        self.audit(access, AuditAction::TeamCreated, "team", &team.key, &team.key, None)
            .await;
        Ok(team.into())
    }

    /// Place a user in a team with a role.
    ///
    /// A global admin may do anything. A team admin or owner may only manage
    /// users already in their own team whose role does not outrank their own,
    /// may not grant a role above their own, and may never grant or revoke
    /// the top role. Returns `None` when the user does not exist.
    pub async fn set_member_role(
        &self,
        access: &AccessContext,
        user_key: &str,
        team_key: &str,
        role: TeamRole,
    ) -> Result<Option<MemberView>> {
        let team = TeamId::new(team_key);
        if !access.can_manage_team(&team) {
            return Err(forbidden("not allowed to manage this team"));
        }
        if QueryBuilder::find_team_by_key(&self.db, team_key).await?.is_none() {
            return Err(bad_request(format!("unknown team: {}", team_key)));
        }

        let Some(user) = self.users.get_user(user_key).await? else {
            return Ok(None);
        };

        if !access.is_global_admin {
            if role.is_top() {
                return Err(forbidden("only global admins may grant SUPER_ADMIN"));
            }
            if user.team_id.as_deref() != Some(team_key) {
                return Ok(None);
            }
            let current = user.team_role.as_deref().and_then(TeamRole::parse);
            if current.is_some_and(|r| r.is_top()) {
                return Err(forbidden("only global admins may change a SUPER_ADMIN"));
            }
            let Some(own) = access.team_role else {
                return Err(forbidden("not allowed to manage this team"));
            };
            if current.is_some_and(|r| r > own) || role > own {
                return Err(forbidden("cannot manage a role above your own"));
            }
        }

        let previous = user.team_role.clone();
        let updated = self
            .users
            .set_membership(user_key, Some(team_key), Some(role.as_str()))
            .await?;

        info!("Set {} to {} in team {}", user_key, role, team_key);
        self.audit(
            access,
            AuditAction::RoleChanged,
            "user",
            user_key,
            team_key,
            Some(serde_json::json!({ "from": previous, "to": role.as_str() })),
        )
        .await;

        Ok(updated.map(MemberView::from))
    }

    /// Members of a team. Empty when the team is outside the caller's scope.
    pub async fn list_members(&self, access: &AccessContext, team_key: &str) -> Result<Vec<MemberView>> {
        if !access.tenant_filter().admits(Some(team_key)) {
            return Ok(Vec::new());
        }
        let members = self.users.list_team_members(team_key).await?;
        Ok(members.into_iter().map(MemberView::from).collect())
    }

    /// All teams for a global admin, the caller's own team otherwise.
    pub async fn list_teams(&self, access: &AccessContext) -> Result<Vec<TeamView>> {
        if access.is_global_admin {
            let teams = QueryBuilder::list_teams(&self.db).await?;
            return Ok(teams.into_iter().map(TeamView::from).collect());
        }
        let Some(team) = &access.team_id else {
            return Ok(Vec::new());
        };
        let team = QueryBuilder::find_team_by_key(&self.db, team.as_str()).await?;
        Ok(team.into_iter().map(TeamView::from).collect())
    }

    /// Recent audit entries within the caller's scope. Admins only.
    pub async fn audit_trail(&self, access: &AccessContext, limit: u32) -> Result<Vec<AuditView>> {
        if !access.is_admin {
            return Err(forbidden("audit log requires an admin role"));
        }
        let Some(filter) = QueryFilter::from_tenant(&access.tenant_filter()) else {
            return Ok(Vec::new());
        };
        let entries = self.users.audit_entries(&filter, limit).await?;
        Ok(entries.into_iter().map(AuditView::from).collect())
    }

    async fn audit(
        &self,
        access: &AccessContext,
        action: AuditAction,
        resource_type: &str,
        resource_id: &str,
        team_id: &str,
        details: Option<serde_json::Value>,
    ) {
        let entry = AuditLogCreate {
            user_id: access.user_id.as_ref().map(|u| u.to_string()),
            team_id: Some(team_id.to_string()),
            action: action.as_str().to_string(),
            resource_type: resource_type.to_string(),
            resource_id: Some(resource_id.to_string()),
            details,
        };
        if let Err(e) = self.users.audit_log(entry).await {
            warn!("Failed to write audit entry for {} {}: {}", resource_type, resource_id, e);
        }
    }
}

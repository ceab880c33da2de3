use serde::{Deserialize, Serialize};

use super::role::TeamRole;
use super::scope::{TenantFilter, TenantScope};
use crate::types::{TeamId, TeamSlug, UserId};

/// Result of the tenant access gate for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessContext {
    pub team_id: Option<TeamId>,
    pub is_global_admin: bool,
    pub team_role: Option<TeamRole>,
    pub is_admin: bool,
    /// Key of the calling user; needed for ownership narrowing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// Resolved membership of a principal, as read from the store.
#[derive(Debug, Clone, Default)]
pub struct Membership {
    pub user_id: Option<UserId>,
    /// The principal's team, if it exists: (key, slug)
    pub team: Option<(TeamId, TeamSlug)>,
    pub role: Option<TeamRole>,
    /// Legacy admin flag
    pub legacy_admin: bool,
}

/// `true` only for the top role inside the internal team.
pub fn is_global_admin(team_slug: Option<&str>, role: Option<TeamRole>, internal: &str) -> bool {
    team_slug == Some(internal) && role == Some(TeamRole::SuperAdmin)
}

impl AccessContext {
    /// No access at all.
    pub fn none() -> Self {
        Self {
            team_id: None,
            is_global_admin: false,
            team_role: None,
            is_admin: false,
            user_id: None,
        }
    }

    /// Pure derivation from a membership and the internal team slug.
    pub fn derive(membership: Membership, internal_team_slug: &str) -> Self {
        let Membership {
            user_id,
            team,
            role,
            legacy_admin,
        } = membership;

        // A role without a team grants nothing.
        let role = team.as_ref().and(role);
        let slug = team.as_ref().map(|(_, slug)| slug.as_str());

        let global = is_global_admin(slug, role, internal_team_slug);
        let is_admin = global || role.is_some_and(|r| r.is_elevated()) || legacy_admin;

        Self {
            team_id: team.map(|(id, _)| id),
            is_global_admin: global,
            team_role: role,
            is_admin,
            user_id,
        }
    }

    pub fn scope(&self) -> TenantScope {
        if self.is_global_admin {
            TenantScope::Unrestricted
        } else if let Some(team) = &self.team_id {
            TenantScope::Team(team.clone())
        } else {
            TenantScope::NoAccess
        }
    }

    pub fn tenant_filter(&self) -> TenantFilter {
        self.scope().to_filter()
    }

    pub fn has_access(&self) -> bool {
        self.scope().has_access()
    }

    /// Ownership narrowing for non-elevated principals.
    ///
    /// Returns the `(field, user)` clause to add on top of the tenant filter,
    /// or `None` when the principal sees the whole scope. A narrowing
    /// principal without a user id yields `Some((field, None))`, which must
    /// match nothing.
    pub fn ownership_filter<'a>(&self, field: &'a str) -> Option<(&'a str, Option<UserId>)> {
        if self.is_admin {
            None
        } else {
            Some((field, self.user_id.clone()))
        }
    }

    /// Whether this principal may administer members of `team`.
    pub fn can_manage_team(&self, team: &TeamId) -> bool {
        self.is_global_admin
            || (self.team_id.as_ref() == Some(team)
                && self.team_role.is_some_and(|r| r.is_elevated()))
    }
}

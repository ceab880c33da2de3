//! Tenant scope and the filter predicate derived from it.

use serde::{Deserialize, Serialize};

use crate::types::TeamId;

/// Name of the team-ownership attribute on every team-owned record.
pub const TEAM_FIELD: &str = "team_id";

/// What a request may see. Computed per request, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "teamId", rename_all = "snake_case")]
pub enum TenantScope {
    /// No session, unknown user, or a user with no team.
    NoAccess,
    /// Restricted to a single team.
    Team(TeamId),
    /// Global admin: every team.
    Unrestricted,
}

impl TenantScope {
    pub fn to_filter(&self) -> TenantFilter {
        match self {
            Self::NoAccess => TenantFilter::MatchNone,
            Self::Team(team) => TenantFilter::TeamEquals(team.clone()),
            Self::Unrestricted => TenantFilter::MatchAll,
        }
    }

    pub fn has_access(&self) -> bool {
        !matches!(self, Self::NoAccess)
    }
}

/// Predicate over a record's `team_id`.
///
/// `MatchNone` must short-circuit to an empty result; it is never turned
/// into an unfiltered query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantFilter {
    MatchNone,
    MatchAll,
    TeamEquals(TeamId),
}

impl TenantFilter {
    /// Evaluate the predicate against a record's team attribute.
    pub fn admits(&self, team_id: Option<&str>) -> bool {
        match self {
            Self::MatchNone => false,
            Self::MatchAll => true,
            Self::TeamEquals(team) => team_id == Some(team.as_str()),
        }
    }
}

//! Team roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role a user holds inside their team, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeamRole {
    Member,
    Admin,
    Owner,
    SuperAdmin,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "MEMBER",
            Self::Admin => "ADMIN",
            Self::Owner => "OWNER",
            Self::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// Parse a stored role string. Older rows use lowercase or dashed forms.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "MEMBER" => Some(Self::Member),
            "ADMIN" => Some(Self::Admin),
            "OWNER" => Some(Self::Owner),
            "SUPER_ADMIN" | "SUPERADMIN" => Some(Self::SuperAdmin),
            _ => None,
        }
    }

    /// Admin, owner and super-admin may see everything inside their team.
    pub fn is_elevated(&self) -> bool {
        *self >= Self::Admin
    }

    /// The highest-privilege role.
    pub fn is_top(&self) -> bool {
        matches!(self, Self::SuperAdmin)
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown team role: {s}"))
    }
}

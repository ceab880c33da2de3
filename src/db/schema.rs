use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::{RecordId, sql::Datetime};

use crate::types::{ApiKeyHash, ApiKeyPrefix};

/// Persisted team (tenant) record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRecord {
    /// Database identifier (table: `team`)
    pub id: RecordId,
    /// Stable key, the value stored in `team_id` on owned records
    pub key: String,
    /// Unique human-readable slug
    pub slug: String,
    /// Display name
    pub name: String,
    pub created_at: Option<Datetime>,
}

/// Payload for creating a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamCreate {
    pub slug: String,
    pub name: String,
}

/// Persisted user record.
///
/// Team membership is a single nullable `team_id` plus a `team_role`;
/// `is_admin` is the legacy admin flag some older records still carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Database identifier (table: `user`)
    pub id: RecordId,
    /// Stable key, the `sub` of session tokens
    pub key: String,
    pub email: String,
    pub display_name: Option<String>,
    /// Key of the team this user belongs to, if any
    #[serde(default)]
    pub team_id: Option<String>,
    /// Raw role string as stored (`MEMBER`, `ADMIN`, `OWNER`, `SUPER_ADMIN`)
    #[serde(default)]
    pub team_role: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: Option<Datetime>,
    pub updated_at: Option<Datetime>,
    pub last_seen_at: Option<Datetime>,
}

/// Payload for creating a new user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub display_name: Option<String>,
    pub team_id: Option<String>,
    pub team_role: Option<String>,
    pub is_admin: bool,
}

/// Audit log action types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RecordCreated,
    RecordUpdated,
    RecordDeleted,
    ContactLogged,
    TeamCreated,
    RoleChanged,
    ApiKeyCreated,
    ApiKeyRevoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::RecordCreated => "record_created",
            Self::RecordUpdated => "record_updated",
            Self::RecordDeleted => "record_deleted",
            Self::ContactLogged => "contact_logged",
            Self::TeamCreated => "team_created",
            Self::RoleChanged => "role_changed",
            Self::ApiKeyCreated => "api_key_created",
            Self::ApiKeyRevoked => "api_key_revoked",
        }
    }
}

/// Persisted audit log entry. Entries are team-owned like CRM records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogRecord {
    pub id: RecordId,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Option<Value>,
    pub created_at: Option<Datetime>,
}

/// Payload for creating an audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogCreate {
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Option<Value>,
}

/// Persisted API key record for integrations acting as a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: RecordId,
    /// SHA-256 hash of the full API key (never store raw keys)
    pub key_hash: ApiKeyHash,
    /// First part of the key for display/identification (e.g., "lc_abc12345")
    pub key_prefix: ApiKeyPrefix,
    /// Key of the user this API key acts as
    pub user_id: String,
    pub name: Option<String>,
    /// Whether the key is active (can be revoked)
    pub is_active: bool,
    pub expires_at: Option<Datetime>,
    pub created_at: Option<Datetime>,
    /// Last time the key was used for authentication
    pub last_used_at: Option<Datetime>,
}

/// Payload for creating a new API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyCreate {
    pub key_hash: ApiKeyHash,
    pub key_prefix: ApiKeyPrefix,
    pub user_id: String,
    pub name: Option<String>,
    pub expires_at: Option<Datetime>,
}

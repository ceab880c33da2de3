//! Team-owned CRM entity kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every table whose rows carry a `team_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Account,
    Lead,
    Opportunity,
    Invoice,
    Document,
    Task,
    Project,
    Ticket,
    LeadActivity,
}

const ALL: [EntityKind; 9] = [
    EntityKind::Account,
    EntityKind::Lead,
    EntityKind::Opportunity,
    EntityKind::Invoice,
    EntityKind::Document,
    EntityKind::Task,
    EntityKind::Project,
    EntityKind::Ticket,
    EntityKind::LeadActivity,
];

impl EntityKind {
    pub fn all() -> &'static [EntityKind] {
        &ALL
    }

    /// SurrealDB table name.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Lead => "lead",
            Self::Opportunity => "opportunity",
            Self::Invoice => "invoice",
            Self::Document => "document",
            Self::Task => "task",
            Self::Project => "project",
            Self::Ticket => "ticket",
            Self::LeadActivity => "lead_activity",
        }
    }

    /// URL path segment.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Account => "accounts",
            Self::Lead => "leads",
            Self::Opportunity => "opportunities",
            Self::Invoice => "invoices",
            Self::Document => "documents",
            Self::Task => "tasks",
            Self::Project => "projects",
            Self::Ticket => "tickets",
            Self::LeadActivity => "lead-activities",
        }
    }

    /// Accepts either the path segment or the table name.
    pub fn from_path(segment: &str) -> Option<Self> {
        ALL.iter()
            .copied()
            .find(|kind| kind.path() == segment || kind.table() == segment)
    }

    /// Attribute naming the user a record is assigned to. Non-admin members
    /// only see records assigned to themselves.
    pub fn ownership_field(&self) -> Option<&'static str> {
        match self {
            Self::Lead | Self::Ticket => Some("assigned_to"),
            Self::Task => Some("assignee_id"),
            _ => None,
        }
    }

    /// Fields callers may filter on, besides `team_id`.
    pub fn filterable_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Account => &["name", "industry", "status", "owner_id"],
            Self::Lead => &["status", "source", "assigned_to", "account_id"],
            Self::Opportunity => &["stage", "account_id", "owner_id"],
            Self::Invoice => &["status", "account_id"],
            Self::Document => &["kind", "account_id", "lead_id"],
            Self::Task => &["status", "assignee_id", "project_id", "lead_id"],
            Self::Project => &["status", "account_id"],
            Self::Ticket => &["status", "priority", "assigned_to", "account_id"],
            Self::LeadActivity => &["lead_id", "activity_type", "user_id"],
        }
    }

    pub fn is_filterable(&self, field: &str) -> bool {
        field == crate::access::TEAM_FIELD || self.filterable_fields().contains(&field)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

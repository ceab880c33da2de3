//! Typed query filters rendered to SurrealQL.
//!
//! A [`QueryFilter`] is a conjunction of `field = value` clauses. Field names
//! are validated identifiers; values are always bound as parameters.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use super::scope::{TEAM_FIELD, TenantFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    InvalidField(String),
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidField(name) => write!(f, "Invalid field name: {}", name),
        }
    }
}

impl std::error::Error for FilterError {}

/// `[a-z_][a-z0-9_]*`
pub fn is_valid_field(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    clauses: Vec<(String, Value)>,
}

impl QueryFilter {
    /// A filter with no clauses.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Start from a tenant filter. `MatchNone` yields `None`: the caller must
    /// return an empty result without querying.
    pub fn from_tenant(filter: &TenantFilter) -> Option<Self> {
        match filter {
            TenantFilter::MatchNone => None,
            TenantFilter::MatchAll => Some(Self::match_all()),
            TenantFilter::TeamEquals(team) => Some(Self {
                clauses: vec![(TEAM_FIELD.to_string(), Value::String(team.to_string()))],
            }),
        }
    }

    /// Add an equality clause.
    pub fn and_eq(
        &mut self,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self, FilterError> {
        if !is_valid_field(field) {
            return Err(FilterError::InvalidField(field.to_string()));
        }
        self.clauses.push((field.to_string(), value.into()));
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    fn param(index: usize) -> String {
        format!("f{}", index)
    }

    /// `a = $f0 AND b = $f1`, or `None` when there are no clauses.
    pub fn condition(&self) -> Option<String> {
        if self.clauses.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .clauses
            .iter()
            .enumerate()
            .map(|(i, (field, _))| format!("{} = ${}", field, Self::param(i)))
            .collect();
        Some(parts.join(" AND "))
    }

    /// `WHERE ...`, or an empty string when there are no clauses.
    pub fn where_clause(&self) -> String {
        self.condition()
            .map(|c| format!("WHERE {}", c))
            .unwrap_or_default()
    }

    /// Parameter bindings for [`Self::where_clause`].
    pub fn bindings(&self) -> BTreeMap<String, Value> {
        self.clauses
            .iter()
            .enumerate()
            .map(|(i, (_, value))| (Self::param(i), value.clone()))
            .collect()
    }

    /// Evaluate in-process against a JSON record.
    pub fn matches(&self, record: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| record.get(field).unwrap_or(&Value::Null) == value)
    }
}

//! Scoped access to team-owned CRM records.
//!
//! Every operation takes the caller's [`AccessContext`] and derives its
//! query filter from it. A caller without scope gets empty results, never an
//! unfiltered query.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::entity::EntityKind;
use crate::access::{AccessContext, QueryFilter, TEAM_FIELD, TenantScope};
use crate::auth::UserStore;
use crate::config::AccessConfig;
use crate::db::schema::{AuditAction, AuditLogCreate};
use crate::db::{Db, QueryBuilder};
use crate::types::{TeamId, generate_key};

/// Fields the store manages itself; stripped from create payloads and patches.
const MANAGED_FIELDS: [&str; 4] = ["id", "key", "created_at", "updated_at"];

/// Repository-level refusals. Carried through `anyhow` and mapped to HTTP
/// statuses at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrmError {
    Forbidden(String),
    BadRequest(String),
    UnknownField { kind: EntityKind, field: String },
}

impl fmt::Display for CrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            Self::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            Self::UnknownField { kind, field } => {
                write!(f, "Unknown filter field '{}' for {}", field, kind)
            }
        }
    }
}

impl std::error::Error for CrmError {}

/// A team-owned record: key, owning team and free-form fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub key: String,
    pub team_id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EntityRecord {
    fn from_row(row: Value) -> Result<Self> {
        Ok(serde_json::from_value(row)?)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Caller-supplied list options.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    /// Equality filters; names must be filterable for the kind
    pub filters: BTreeMap<String, Value>,
    pub limit: Option<u32>,
    pub start: Option<u32>,
}

impl ListParams {
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }
}

/// Outcome of [`CrmRepository::record_contact_attempt`].
#[derive(Debug, Clone, Serialize)]
pub struct ContactAttempt {
    pub lead: EntityRecord,
    pub activity_key: String,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: u64,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn into_object(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(CrmError::BadRequest(format!("{} must be a JSON object", what)).into()),
    }
}

#[derive(Clone)]
pub struct CrmRepository {
    db: Db,
    users: UserStore,
    config: AccessConfig,
}

impl CrmRepository {
    pub fn new(db: Db, config: AccessConfig) -> Self {
        Self {
            users: UserStore::new(db.clone()),
            db,
            config,
        }
    }

    /// Tenant filter plus ownership narrowing. `None` means match nothing.
    fn scoped_filter(&self, access: &AccessContext, kind: EntityKind) -> Result<Option<QueryFilter>> {
        let Some(mut filter) = QueryFilter::from_tenant(&access.tenant_filter()) else {
            return Ok(None);
        };

        if let Some(field) = kind.ownership_field()
            && let Some((field, user)) = access.ownership_filter(field)
        {
            let Some(user) = user else {
                return Ok(None);
            };
            filter.and_eq(field, user.into_inner())?;
        }

        Ok(Some(filter))
    }

    fn apply_params(
        &self,
        filter: &mut QueryFilter,
        kind: EntityKind,
        params: &ListParams,
    ) -> Result<()> {
        for (field, value) in &params.filters {
            if !kind.is_filterable(field) {
                return Err(CrmError::UnknownField {
                    kind,
                    field: field.clone(),
                }
                .into());
            }
            filter.and_eq(field, value.clone())?;
        }
        Ok(())
    }

    pub async fn list(
        &self,
        access: &AccessContext,
        kind: EntityKind,
        params: &ListParams,
    ) -> Result<Vec<EntityRecord>> {
        let Some(mut filter) = self.scoped_filter(access, kind)? else {
            debug!("No scope for {} list; returning empty", kind);
            return Ok(Vec::new());
        };
        self.apply_params(&mut filter, kind, params)?;

        let query = format!(
            "SELECT * OMIT id FROM type::table($tb) {} ORDER BY created_at DESC LIMIT $limit START $start",
            filter.where_clause()
        );

        let mut res = self
            .db
            .query(query)
            .bind(filter.bindings())
            .bind(("tb", kind.table()))
            .bind(("limit", self.config.page_size(params.limit)))
            .bind(("start", params.start.unwrap_or(0)))
            .await?;

        let rows: Vec<Value> = res.take(0)?;
        rows.into_iter().map(EntityRecord::from_row).collect()
    }

    pub async fn count(
        &self,
        access: &AccessContext,
        kind: EntityKind,
        params: &ListParams,
    ) -> Result<u64> {
        let Some(mut filter) = self.scoped_filter(access, kind)? else {
            return Ok(0);
        };
        self.apply_params(&mut filter, kind, params)?;

        let query = format!(
            "SELECT count() FROM type::table($tb) {} GROUP ALL",
            filter.where_clause()
        );

        let mut res = self
            .db
            .query(query)
            .bind(filter.bindings())
            .bind(("tb", kind.table()))
            .await?;

        let rows: Vec<CountRow> = res.take(0)?;
        Ok(rows.first().map(|r| r.count).unwrap_or(0))
    }

    /// Fetch a record by key. Out-of-scope records are `None`.
    pub async fn get(
        &self,
        access: &AccessContext,
        kind: EntityKind,
        key: &str,
    ) -> Result<Option<EntityRecord>> {
        let Some(mut filter) = self.scoped_filter(access, kind)? else {
            return Ok(None);
        };
        filter.and_eq("key", key)?;

        let query = format!(
            "SELECT * OMIT id FROM type::table($tb) {} LIMIT 1",
            filter.where_clause()
        );

        let mut res = self
            .db
            .query(query)
            .bind(filter.bindings())
            .bind(("tb", kind.table()))
            .await?;

        let rows: Vec<Value> = res.take(0)?;
        rows.into_iter().next().map(EntityRecord::from_row).transpose()
    }

    async fn require_team(&self, team_key: &str) -> Result<TeamId> {
        match QueryBuilder::find_team_by_key(&self.db, team_key).await? {
            Some(team) => Ok(TeamId::new(team.key)),
            None => Err(CrmError::BadRequest(format!("unknown team: {}", team_key)).into()),
        }
    }

    /// Create a record in the caller's team.
    ///
    /// Team-scoped callers always create in their own team; a global admin
    /// must name the target team via `team_override` or the payload.
    pub async fn create(
        &self,
        access: &AccessContext,
        kind: EntityKind,
        data: Value,
        team_override: Option<TeamId>,
    ) -> Result<EntityRecord> {
        let mut fields = into_object(data, "record")?;
        for field in MANAGED_FIELDS {
            fields.remove(field);
        }
        let requested_team = fields
            .remove(TEAM_FIELD)
            .and_then(|v| v.as_str().map(str::to_string));

        let team = match access.scope() {
            TenantScope::NoAccess => {
                return Err(CrmError::Forbidden("no team scope".to_string()).into());
            }
            TenantScope::Team(team) => team,
            TenantScope::Unrestricted => {
                let Some(requested) = team_override.map(TeamId::into_inner).or(requested_team)
                else {
                    return Err(CrmError::BadRequest(
                        "team_id is required for cross-team creates".to_string(),
                    )
                    .into());
                };
                self.require_team(&requested).await?
            }
        };

        if let Some(field) = kind.ownership_field()
            && let Some((field, Some(user))) = access.ownership_filter(field)
            && !fields.contains_key(field)
        {
            fields.insert(field.to_string(), Value::String(user.into_inner()));
        }
        if kind == EntityKind::Lead {
            fields.entry("contact_attempts").or_insert(Value::from(0));
        }

        let key = generate_key();
        let now = timestamp();
        fields.insert("key".to_string(), Value::String(key.clone()));
        fields.insert(TEAM_FIELD.to_string(), Value::String(team.to_string()));
        fields.insert("created_at".to_string(), Value::String(now.clone()));
        fields.insert("updated_at".to_string(), Value::String(now));

        let query = r#"
            CREATE type::thing($tb, $key) CONTENT $content RETURN NONE;
            SELECT * OMIT id FROM type::table($tb) WHERE key = $key LIMIT 1;
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("tb", kind.table()))
            .bind(("key", key.clone()))
            .bind(("content", Value::Object(fields)))
            .await?;

        let rows: Vec<Value> = res.take(1)?;
        let record = rows
            .into_iter()
            .next()
            .map(EntityRecord::from_row)
            .transpose()?
            .ok_or_else(|| anyhow::anyhow!("failed to create {} record", kind))?;

        info!("Created {} {} in team {}", kind, record.key, record.team_id);
        self.audit(access, AuditAction::RecordCreated, kind, &record.key, &record.team_id, None)
            .await;

        Ok(record)
    }

    /// Merge `patch` into an in-scope record. Returns `None` when the record
    /// is missing or out of scope.
    ///
    /// A narrowed principal may not hand a record to someone else: the
    /// ownership field can only be set to the caller.
    pub async fn update(
        &self,
        access: &AccessContext,
        kind: EntityKind,
        key: &str,
        patch: Value,
    ) -> Result<Option<EntityRecord>> {
        let mut patch = into_object(patch, "patch")?;
        for field in MANAGED_FIELDS {
            patch.remove(field);
        }

        if access.is_global_admin {
            if let Some(team) = patch.get(TEAM_FIELD) {
                let Some(team) = team.as_str() else {
                    return Err(CrmError::BadRequest("team_id must be a string".to_string()).into());
                };
                self.require_team(team).await?;
            }
        } else if patch.remove(TEAM_FIELD).is_some() {
            debug!("Ignoring team_id in {} patch from team-scoped caller", kind);
        }

        if let Some(field) = kind.ownership_field()
            && let Some((field, owner)) = access.ownership_filter(field)
            && let Some(requested) = patch.get(field)
            && requested.as_str() != owner.as_ref().map(|u| u.as_str())
        {
            return Err(CrmError::Forbidden(format!("only admins may change {}", field)).into());
        }

        let Some(mut filter) = self.scoped_filter(access, kind)? else {
            return Ok(None);
        };
        filter.and_eq("key", key)?;

        patch.insert("updated_at".to_string(), Value::String(timestamp()));
        let changed: Vec<String> = patch.keys().cloned().collect();

        // The read-back uses the same filter, so the caller only ever sees
        // the row through its own scope.
        let where_clause = filter.where_clause();
        let query = format!(
            "UPDATE type::table($tb) MERGE $patch {where_clause} RETURN NONE;
             SELECT * OMIT id FROM type::table($tb) {where_clause} LIMIT 1;"
        );

        let mut res = self
            .db
            .query(query)
            .bind(filter.bindings())
            .bind(("tb", kind.table()))
            .bind(("patch", Value::Object(patch)))
            .await?
            .check()?;

        let rows: Vec<Value> = res.take(1)?;
        let Some(updated) = rows.into_iter().next().map(EntityRecord::from_row).transpose()? else {
            return Ok(None);
        };

        self.audit(
            access,
            AuditAction::RecordUpdated,
            kind,
            key,
            &updated.team_id,
            Some(serde_json::json!({ "fields": changed })),
        )
        .await;

        Ok(Some(updated))
    }

    /// Delete an in-scope record, returning it. `None` when missing or out
    /// of scope.
    pub async fn delete(
        &self,
        access: &AccessContext,
        kind: EntityKind,
        key: &str,
    ) -> Result<Option<EntityRecord>> {
        let Some(existing) = self.get(access, kind, key).await? else {
            return Ok(None);
        };
        let Some(mut filter) = self.scoped_filter(access, kind)? else {
            return Ok(None);
        };
        filter.and_eq("key", key)?;

        let query = format!("DELETE type::table($tb) {}", filter.where_clause());
        self.db
            .query(query)
            .bind(filter.bindings())
            .bind(("tb", kind.table()))
            .await?
            .check()?;

        info!("Deleted {} {} from team {}", kind, key, existing.team_id);
        self.audit(access, AuditAction::RecordDeleted, kind, key, &existing.team_id, None)
            .await;

        Ok(Some(existing))
    }

    /// Increment a lead's contact counter and log the activity, atomically.
    /// `None` when the lead is missing or out of scope; nothing is written
    /// in that case.
    pub async fn record_contact_attempt(
        &self,
        access: &AccessContext,
        lead_key: &str,
        note: Option<String>,
    ) -> Result<Option<ContactAttempt>> {
        let Some(mut filter) = self.scoped_filter(access, EntityKind::Lead)? else {
            return Ok(None);
        };
        filter.and_eq("key", lead_key)?;

        let user_id = access.user_id.as_ref().map(|u| u.to_string());
        let Some(outcome) = self.apply_contact_attempt(&filter, lead_key, user_id, note).await?
        else {
            debug!("Contact attempt on lead {} matched nothing", lead_key);
            return Ok(None);
        };

        self.audit(
            access,
            AuditAction::ContactLogged,
            EntityKind::Lead,
            lead_key,
            &outcome.lead.team_id,
            Some(serde_json::json!({ "activity": outcome.activity_key })),
        )
        .await;

        Ok(Some(outcome))
    }

    /// The transaction behind [`Self::record_contact_attempt`]. The activity
    /// row is only created when the filtered counter update touched the lead,
    /// and takes its `team_id` from the updated row.
    async fn apply_contact_attempt(
        &self,
        filter: &QueryFilter,
        lead_key: &str,
        user_id: Option<String>,
        note: Option<String>,
    ) -> Result<Option<ContactAttempt>> {
        let activity_key = generate_key();
        let where_clause = filter.where_clause();
        let query = format!(
            r#"
            BEGIN TRANSACTION;
            LET $touched = (UPDATE lead SET
                contact_attempts += 1,
                last_contacted_at = $now,
                updated_at = $now
            {where_clause} RETURN AFTER);
            IF array::len($touched) > 0 {{
                CREATE type::thing('lead_activity', $activity_key) CONTENT {{
                    key: $activity_key,
                    team_id: $touched[0].team_id,
                    lead_id: $lead_key,
                    user_id: $user_id,
                    activity_type: 'contact_attempt',
                    note: $note,
                    created_at: $now,
                    updated_at: $now
                }} RETURN NONE;
            }};
            SELECT * OMIT id FROM lead {where_clause} LIMIT 1;
            COMMIT TRANSACTION;
            "#
        );

        let mut res = self
            .db
            .query(query)
            .bind(filter.bindings())
            .bind(("now", timestamp()))
            .bind(("activity_key", activity_key.clone()))
            .bind(("lead_key", lead_key.to_string()))
            .bind(("user_id", user_id))
            .bind(("note", note))
            .await?
            .check()?;

        let last = res.num_statements().saturating_sub(1);
        let rows: Vec<Value> = res.take(last)?;
        let lead = rows.into_iter().next().map(EntityRecord::from_row).transpose()?;

        Ok(lead.map(|lead| ContactAttempt { lead, activity_key }))
    }

    async fn audit(
        &self,
        access: &AccessContext,
        action: AuditAction,
        kind: EntityKind,
        key: &str,
        team_id: &str,
        details: Option<Value>,
    ) {
        let entry = AuditLogCreate {
            user_id: access.user_id.as_ref().map(|u| u.to_string()),
            team_id: Some(team_id.to_string()),
            action: action.as_str().to_string(),
            resource_type: kind.table().to_string(),
            resource_id: Some(key.to_string()),
            details,
        };
        if let Err(e) = self.users.audit_log(entry).await {
            warn!("Failed to write audit entry for {} {}: {}", kind, key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Membership, TeamRole, TenantFilter};
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};
    use crate::types::{TeamSlug, UserId};
    use serde_json::json;

    async fn setup() -> CrmRepository {
        let db = create_connection(DatabaseConfig::memory()).await.unwrap();
        ensure_schema(&db).await.unwrap();
        CrmRepository::new(db, AccessConfig::default())
    }

    fn access(team: &str, role: TeamRole) -> AccessContext {
        AccessContext::derive(
            Membership {
                user_id: Some(UserId::new("u1")),
                team: Some((TeamId::new(team), TeamSlug::new(team))),
                role: Some(role),
                legacy_admin: false,
            },
            "ledger1",
        )
    }

    #[tokio::test]
    async fn test_create_and_get_in_own_team() {
        let repo = setup().await;
        let admin = access("t1", TeamRole::Admin);

        let account = repo
            .create(&admin, EntityKind::Account, json!({ "name": "Acme" }), None)
            .await
            .unwrap();
        assert_eq!(account.team_id, "t1");
        assert_eq!(account.get_str("name"), Some("Acme"));
        assert!(account.get_str("created_at").is_some());

        let fetched = repo
            .get(&admin, EntityKind::Account, &account.key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, account);
    }

    #[tokio::test]
    async fn test_no_access_is_forbidden_for_create_and_empty_for_reads() {
        let repo = setup().await;
        let none = AccessContext::none();

        let err = repo
            .create(&none, EntityKind::Account, json!({ "name": "Acme" }), None)
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CrmError>(), Some(CrmError::Forbidden(_))));

        let params = ListParams::default();
        assert!(repo.list(&none, EntityKind::Account, &params).await.unwrap().is_empty());
        assert_eq!(repo.count(&none, EntityKind::Account, &params).await.unwrap(), 0);
        assert!(repo.get(&none, EntityKind::Account, "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_object_payload_rejected() {
        let repo = setup().await;
        let err = repo
            .create(&access("t1", TeamRole::Admin), EntityKind::Account, json!([1, 2]), None)
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CrmError>(), Some(CrmError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_unknown_filter_field_rejected() {
        let repo = setup().await;
        let params = ListParams::default().with_filter("amount", 10);
        let err = repo
            .list(&access("t1", TeamRole::Admin), EntityKind::Invoice, &params)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::UnknownField { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_filters_and_paging() {
        let repo = setup().await;
        let admin = access("t1", TeamRole::Admin);
        for status in ["open", "open", "won"] {
            repo.create(&admin, EntityKind::Opportunity, json!({ "stage": status }), None)
                .await
                .unwrap();
        }

        let open = ListParams::default().with_filter("stage", "open");
        assert_eq!(repo.list(&admin, EntityKind::Opportunity, &open).await.unwrap().len(), 2);
        assert_eq!(repo.count(&admin, EntityKind::Opportunity, &open).await.unwrap(), 2);

        let page = ListParams {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(repo.list(&admin, EntityKind::Opportunity, &page).await.unwrap().len(), 1);
        assert_eq!(
            repo.count(&admin, EntityKind::Opportunity, &ListParams::default())
                .await
                .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_update_strips_managed_and_team_fields() {
        let repo = setup().await;
        let admin = access("t1", TeamRole::Admin);
        let record = repo
            .create(&admin, EntityKind::Project, json!({ "status": "planned" }), None)
            .await
            .unwrap();

        let updated = repo
            .update(
                &admin,
                EntityKind::Project,
                &record.key,
                json!({ "status": "active", "team_id": "t2", "key": "hijack" }),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.key, record.key);
        assert_eq!(updated.team_id, "t1");
        assert_eq!(updated.get_str("status"), Some("active"));
    }

    #[tokio::test]
    async fn test_member_creates_leads_assigned_to_self() {
        let repo = setup().await;
        let member = access("t1", TeamRole::Member);

        let lead = repo
            .create(&member, EntityKind::Lead, json!({ "name": "Jane" }), None)
            .await
            .unwrap();
        assert_eq!(lead.get_str("assigned_to"), Some("u1"));
        assert_eq!(lead.get("contact_attempts"), Some(&json!(0)));
    }

    fn root() -> AccessContext {
        access("ledger1", TeamRole::SuperAdmin)
    }

    #[tokio::test]
    async fn test_member_cannot_hand_a_lead_to_someone_else() {
        let repo = setup().await;
        let member = access("t1", TeamRole::Member);
        let lead = repo
            .create(&member, EntityKind::Lead, json!({ "name": "Jane" }), None)
            .await
            .unwrap();

        let err = repo
            .update(&member, EntityKind::Lead, &lead.key, json!({ "assigned_to": "u2" }))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CrmError>(), Some(CrmError::Forbidden(_))));

        let unchanged = repo.get(&member, EntityKind::Lead, &lead.key).await.unwrap().unwrap();
        assert_eq!(unchanged.get_str("assigned_to"), Some("u1"));
    }

    #[tokio::test]
    async fn test_update_returns_the_row_the_caller_can_read() {
        let repo = setup().await;
        let member = access("t1", TeamRole::Member);
        let lead = repo
            .create(&member, EntityKind::Lead, json!({ "name": "Jane" }), None)
            .await
            .unwrap();

        let updated = repo
            .update(
                &member,
                EntityKind::Lead,
                &lead.key,
                json!({ "status": "qualified", "assigned_to": "u1" }),
            )
            .await
            .unwrap()
            .unwrap();
        let fetched = repo.get(&member, EntityKind::Lead, &lead.key).await.unwrap().unwrap();
        assert_eq!(updated, fetched);
        assert_eq!(updated.get_str("status"), Some("qualified"));
    }

    #[tokio::test]
    async fn test_admin_may_reassign_within_team() {
        let repo = setup().await;
        let admin = access("t1", TeamRole::Admin);
        let lead = repo
            .create(&admin, EntityKind::Lead, json!({ "name": "Jane", "assigned_to": "u1" }), None)
            .await
            .unwrap();

        let updated = repo
            .update(&admin, EntityKind::Lead, &lead.key, json!({ "assigned_to": "u2" }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.get_str("assigned_to"), Some("u2"));
    }

    #[tokio::test]
    async fn test_contact_transaction_writes_nothing_when_the_lead_does_not_match() {
        let repo = setup().await;
        let admin = access("t2", TeamRole::Admin);
        let lead = repo
            .create(&admin, EntityKind::Lead, json!({ "name": "Moved away" }), None)
            .await
            .unwrap();

        // Missing key, then a lead that now belongs to another team.
        for key in ["gone", lead.key.as_str()] {
            let mut filter =
                QueryFilter::from_tenant(&TenantFilter::TeamEquals(TeamId::new("t1"))).unwrap();
            filter.and_eq("key", key).unwrap();

            let outcome = repo
                .apply_contact_attempt(&filter, key, Some("u1".to_string()), None)
                .await
                .unwrap();
            assert!(outcome.is_none());
        }

        let params = ListParams::default();
        assert_eq!(repo.count(&root(), EntityKind::LeadActivity, &params).await.unwrap(), 0);
        let lead = repo.get(&root(), EntityKind::Lead, &lead.key).await.unwrap().unwrap();
        assert_eq!(lead.get("contact_attempts"), Some(&json!(0)));
        assert!(lead.get_str("last_contacted_at").is_none());
    }

    #[tokio::test]
    async fn test_contact_activity_takes_the_lead_team() {
        let repo = setup().await;
        let admin = access("t1", TeamRole::Admin);
        let lead = repo
            .create(&admin, EntityKind::Lead, json!({ "name": "Jane" }), None)
            .await
            .unwrap();

        let outcome = repo
            .record_contact_attempt(&admin, &lead.key, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.lead.get("contact_attempts"), Some(&json!(1)));

        let activities = repo
            .list(&admin, EntityKind::LeadActivity, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].key, outcome.activity_key);
        assert_eq!(activities[0].team_id, "t1");
    }

    #[tokio::test]
    async fn test_mutations_are_audited() {
        let repo = setup().await;
        let admin = access("t1", TeamRole::Admin);
        let record = repo
            .create(&admin, EntityKind::Invoice, json!({ "status": "draft" }), None)
            .await
            .unwrap();
        repo.delete(&admin, EntityKind::Invoice, &record.key).await.unwrap();

        let entries = repo
            .users
            .audit_entries(&QueryFilter::match_all(), 10)
            .await
            .unwrap();
        let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
        assert!(actions.contains(&"record_created"));
        assert!(actions.contains(&"record_deleted"));
        assert!(entries.iter().all(|e| e.team_id.as_deref() == Some("t1")));
    }
}

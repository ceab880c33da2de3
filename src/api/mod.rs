// REST API endpoints for the CRM

mod admin;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::access::{AccessContext, TenantAccessGate};
use crate::auth::{AuthError, AuthExtractor, UserContext};
use crate::config::{AccessConfig, AppConfig};
use crate::crm::{ContactAttempt, CrmRepository, EntityKind, EntityRecord, ListParams};
use crate::db::Db;
use crate::error::ApiError;
use crate::teams::TeamAdmin;

/// Shared services behind both routers.
pub struct AppContext {
    pub extractor: AuthExtractor,
    pub gate: TenantAccessGate,
    pub repo: CrmRepository,
    pub teams: TeamAdmin,
    pub access_config: AccessConfig,
}

pub type AppState = Arc<AppContext>;

impl AppContext {
    pub fn new(db: Db, config: &AppConfig) -> Self {
        Self {
            extractor: AuthExtractor::new(config.auth.clone(), db.clone()),
            gate: TenantAccessGate::new(db.clone(), &config.access),
            repo: CrmRepository::new(db.clone(), config.access.clone()),
            teams: TeamAdmin::new(db),
            access_config: config.access.clone(),
        }
    }

    /// The request's session, `None` when no credentials were sent.
    async fn session(&self, headers: &HeaderMap) -> Result<Option<UserContext>, AuthError> {
        let header_value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };

        let authorization = header_value(http::header::AUTHORIZATION.as_str());
        let api_key = header_value(&self.extractor.config().api_key_header);
        if authorization.is_none() && api_key.is_none() {
            return Ok(None);
        }

        let ip_address = header_value("X-Forwarded-For").or_else(|| header_value("X-Real-IP"));
        let user_agent = header_value(http::header::USER_AGENT.as_str());

        self.extractor
            .extract_user(
                authorization.as_deref(),
                api_key.as_deref(),
                ip_address,
                user_agent,
            )
            .await
            .map(Some)
    }

    /// API surfaces: a valid session is mandatory.
    pub async fn require_access(&self, headers: &HeaderMap) -> Result<AccessContext, ApiError> {
        let session = self
            .session(headers)
            .await?
            .ok_or_else(|| ApiError::Unauthorized(AuthError::Unauthenticated.to_string()))?;
        Ok(self.gate.resolve(Some(&session)).await?)
    }

    /// UI loaders: a missing or invalid session means no access, not an error.
    pub async fn optional_access(&self, headers: &HeaderMap) -> Result<AccessContext, ApiError> {
        match self.session(headers).await {
            Ok(session) => Ok(self.gate.resolve(session.as_ref()).await?),
            Err(err @ AuthError::DatabaseError(_)) => Err(err.into()),
            Err(e) => {
                debug!("UI loader without a valid session: {}", e);
                Ok(AccessContext::none())
            }
        }
    }
}

pub fn create_public_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/me/access", get(me_access))
        .route("/api/{entity}", get(list_records).post(create_record))
        .route("/api/{entity}/count", get(count_records))
        .route(
            "/api/{entity}/{key}",
            get(get_record).patch(update_record).delete(delete_record),
        )
        .route("/api/{entity}/{key}/contact", post(log_contact))
        .route("/ui/{entity}", get(ui_list))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub fn create_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/admin/teams", get(admin::list_teams).post(admin::create_team))
        .route("/admin/teams/{key}/members", get(admin::list_members))
        .route("/admin/members/{user_key}", put(admin::set_member))
        .route("/admin/audit", get(admin::audit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

fn entity_kind(segment: &str) -> Result<EntityKind, ApiError> {
    EntityKind::from_path(segment).ok_or_else(|| ApiError::not_found(format!("Unknown entity: {}", segment)))
}

fn parse_number(query: &mut HashMap<String, String>, name: &str) -> Result<Option<u32>, ApiError> {
    query
        .remove(name)
        .map(|raw| raw.parse::<u32>())
        .transpose()
        .map_err(|_| ApiError::BadRequest(format!("{} must be a non-negative integer", name)))
}

/// `limit` and `start` are paging; every other query parameter is an
/// equality filter.
fn list_params(mut query: HashMap<String, String>) -> Result<ListParams, ApiError> {
    let limit = parse_number(&mut query, "limit")?;
    let start = parse_number(&mut query, "start")?;
    let filters = query
        .into_iter()
        .map(|(field, value)| (field, Value::String(value)))
        .collect();
    Ok(ListParams {
        filters,
        limit,
        start,
    })
}

async fn me_access(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AccessContext>, ApiError> {
    let access = state.require_access(&headers).await?;
    Ok(Json(access))
}

async fn list_records(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let kind = entity_kind(&entity)?;
    let access = state.require_access(&headers).await?;
    let params = list_params(query)?;

    let items = state.repo.list(&access, kind, &params).await?;
    let count = state.repo.count(&access, kind, &params).await?;

    Ok(Json(serde_json::json!({
        "items": items,
        "count": count
    })))
}

async fn count_records(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let kind = entity_kind(&entity)?;
    let access = state.require_access(&headers).await?;
    let params = list_params(query)?;

    let count = state.repo.count(&access, kind, &params).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

async fn get_record(
    State(state): State<AppState>,
    Path((entity, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<EntityRecord>, ApiError> {
    let kind = entity_kind(&entity)?;
    let access = state.require_access(&headers).await?;

    let record = state
        .repo
        .get(&access, kind, &key)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} not found", kind)))?;
    Ok(Json(record))
}

async fn create_record(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<EntityRecord>), ApiError> {
    let kind = entity_kind(&entity)?;
    let access = state.require_access(&headers).await?;

    let record = state.repo.create(&access, kind, payload, None).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_record(
    State(state): State<AppState>,
    Path((entity, key)): Path<(String, String)>,
    headers: HeaderMap,
    Json(patch): Json<Value>,
) -> Result<Json<EntityRecord>, ApiError> {
    let kind = entity_kind(&entity)?;
    let access = state.require_access(&headers).await?;

    let record = state
        .repo
        .update(&access, kind, &key, patch)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} not found", kind)))?;
    Ok(Json(record))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((entity, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let kind = entity_kind(&entity)?;
    let access = state.require_access(&headers).await?;

    let record = state
        .repo
        .delete(&access, kind, &key)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} not found", kind)))?;
    Ok(Json(serde_json::json!({ "deleted": record.key })))
}

#[derive(Debug, Default, Deserialize)]
struct ContactRequest {
    #[serde(default)]
    note: Option<String>,
}

async fn log_contact(
    State(state): State<AppState>,
    Path((entity, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ContactAttempt>, ApiError> {
    if entity_kind(&entity)? != EntityKind::Lead {
        return Err(ApiError::not_found("Contact logging is only available for leads"));
    }
    let access = state.require_access(&headers).await?;

    let request: ContactRequest = if body.is_empty() {
        ContactRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid contact payload: {}", e)))?
    };

    let outcome = state
        .repo
        .record_contact_attempt(&access, &key, request.note)
        .await?
        .ok_or_else(|| ApiError::not_found("lead not found"))?;
    Ok(Json(outcome))
}

/// Data loader for UI pages. Never fails for a missing session or scope.
async fn ui_list(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let kind = entity_kind(&entity)?;
    let access = state.optional_access(&headers).await?;
    if !access.has_access() {
        return Ok(Json(serde_json::json!({ "items": [], "count": 0 })));
    }

    let params = list_params(query)?;
    let items = state.repo.list(&access, kind, &params).await?;
    let count = state.repo.count(&access, kind, &params).await?;

    Ok(Json(serde_json::json!({
        "items": items,
        "count": count
    })))
}

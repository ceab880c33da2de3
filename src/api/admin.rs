// Admin API handlers: teams, membership, audit log

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;

use super::AppState;
use crate::access::TeamRole;
use crate::error::ApiError;
use crate::teams::{AuditView, MemberView, TeamView};

#[derive(Debug, Deserialize)]
pub(super) struct CreateTeamRequest {
    slug: String,
    name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct SetMemberRequest {
    team_id: String,
    role: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct AuditQuery {
    limit: Option<u32>,
}

pub(super) async fn list_teams(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<TeamView>>, ApiError> {
    let access = state.require_access(&headers).await?;
    Ok(Json(state.teams.list_teams(&access).await?))
}

pub(super) async fn create_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<TeamView>), ApiError> {
    let access = state.require_access(&headers).await?;
    let team = state
        .teams
        .create_team(&access, request.slug.trim(), request.name.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(team)))
}

pub(super) async fn list_members(
    State(state): State<AppState>,
    Path(team_key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<MemberView>>, ApiError> {
    let access = state.require_access(&headers).await?;
    Ok(Json(state.teams.list_members(&access, &team_key).await?))
}

pub(super) async fn set_member(
    State(state): State<AppState>,
    Path(user_key): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SetMemberRequest>,
) -> Result<Json<MemberView>, ApiError> {
    let access = state.require_access(&headers).await?;
    let role = TeamRole::parse(&request.role)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown role: {}", request.role)))?;

    let member = state
        .teams
        .set_member_role(&access, &user_key, &request.team_id, role)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(member))
}

pub(super) async fn audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<AuditView>>, ApiError> {
    let access = state.require_access(&headers).await?;
    let limit = state.access_config.page_size(query.limit);
    Ok(Json(state.teams.audit_trail(&access, limit).await?))
}

//! HTTP handlers for collection teams

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use shared::models::Capability;
use shared::types::PaginatedResponse;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::listing::ListQuery;
use crate::services::team::{
    CreateTeamInput, Team, TeamDetail, TeamFilter, TeamMemberInput, TeamPlanning,
    TeamStatistics, UpdateTeamInput,
};
use crate::services::TeamService;
use crate::AppState;

pub async fn list_teams(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<TeamFilter>,
) -> AppResult<Json<PaginatedResponse<Team>>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = TeamService::new(state.db);
    Ok(Json(service.list_teams(&list, &filter).await?))
}

/// Team with its members and zones
pub async fn get_team(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(team_id): Path<Uuid>,
) -> AppResult<Json<TeamDetail>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = TeamService::new(state.db);
    Ok(Json(service.get_team(team_id).await?))
}

pub async fn create_team(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateTeamInput>,
) -> AppResult<(StatusCode, Json<TeamDetail>)> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = TeamService::new(state.db);
    let team = service.create_team(input).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn update_team(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(team_id): Path<Uuid>,
    Json(input): Json<UpdateTeamInput>,
) -> AppResult<Json<TeamDetail>> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = TeamService::new(state.db);
    Ok(Json(service.update_team(team_id, input).await?))
}

pub async fn delete_team(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(team_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = TeamService::new(state.db);
    service.delete_team(team_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_team_member(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(team_id): Path<Uuid>,
    Json(input): Json<TeamMemberInput>,
) -> AppResult<Json<TeamDetail>> {
    current_user.0.require(Capability::ManageTeamMembers)?;
    let service = TeamService::new(state.db);
    Ok(Json(service.add_member(team_id, input).await?))
}

pub async fn remove_team_member(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((team_id, agent_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<TeamDetail>> {
    current_user.0.require(Capability::ManageTeamMembers)?;
    let service = TeamService::new(state.db);
    Ok(Json(service.remove_member(team_id, agent_id).await?))
}

pub async fn team_statistics(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<TeamStatistics>> {
    current_user.0.require(Capability::ViewReports)?;
    let service = TeamService::new(state.db);
    Ok(Json(service.statistics().await?))
}

/// Working days, hours and upcoming rounds of a team
pub async fn team_planning(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(team_id): Path<Uuid>,
) -> AppResult<Json<TeamPlanning>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = TeamService::new(state.db);
    Ok(Json(service.planning(team_id, Utc::now().date_naive()).await?))
}

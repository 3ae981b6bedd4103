//! HTTP handlers for field agents

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::models::Capability;
use shared::types::PaginatedResponse;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::agent::{
    Agent, AgentFilter, AgentPerformance, AgentZones, AssignZoneInput, CreateAgentInput,
    PositionCount, UpdateAgentInput,
};
use crate::services::listing::ListQuery;
use crate::services::AgentService;
use crate::AppState;

// ============================================================================
// Agent CRUD
// ============================================================================

/// Agents without supervision rights only see themselves
pub async fn list_agents(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<AgentFilter>,
) -> AppResult<Json<PaginatedResponse<Agent>>> {
    current_user
        .0
        .require_any(&[Capability::ViewRegistry, Capability::OpenFieldSession])?;
    let service = AgentService::new(state.db);
    Ok(Json(service.list_agents(&current_user.0, &list, &filter).await?))
}

pub async fn get_agent(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(agent_id): Path<Uuid>,
) -> AppResult<Json<Agent>> {
    current_user
        .0
        .require_any(&[Capability::ViewRegistry, Capability::OpenFieldSession])?;
    let service = AgentService::new(state.db);
    Ok(Json(service.get_agent(&current_user.0, agent_id).await?))
}

pub async fn create_agent(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateAgentInput>,
) -> AppResult<(StatusCode, Json<Agent>)> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = AgentService::new(state.db);
    let agent = service.create_agent(input).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn update_agent(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(agent_id): Path<Uuid>,
    Json(input): Json<UpdateAgentInput>,
) -> AppResult<Json<Agent>> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = AgentService::new(state.db);
    Ok(Json(service.update_agent(agent_id, input).await?))
}

pub async fn delete_agent(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(agent_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = AgentService::new(state.db);
    service.delete_agent(agent_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Availability and zones
// ============================================================================

pub async fn available_agents(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Agent>>> {
    current_user.0.require(Capability::ViewActiveAgents)?;
    let service = AgentService::new(state.db);
    Ok(Json(service.available_agents().await?))
}

/// Agent count per position
pub async fn agent_statistics(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<PositionCount>>> {
    current_user.0.require(Capability::ViewReports)?;
    let service = AgentService::new(state.db);
    Ok(Json(service.statistics().await?))
}

/// Rounds, completion and incidents of one agent
pub async fn agent_performance(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(agent_id): Path<Uuid>,
) -> AppResult<Json<AgentPerformance>> {
    current_user
        .0
        .require_any(&[Capability::ViewRegistry, Capability::OpenFieldSession])?;
    let service = AgentService::new(state.db);
    Ok(Json(service.performance(&current_user.0, agent_id).await?))
}

pub async fn assign_agent_zone(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(agent_id): Path<Uuid>,
    Json(input): Json<AssignZoneInput>,
) -> AppResult<Json<AgentZones>> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = AgentService::new(state.db);
    Ok(Json(service.assign_zone(agent_id, input).await?))
}

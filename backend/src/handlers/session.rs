//! HTTP handlers for field sessions of agents

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::models::{AgentSession, Capability, EndedSession};
use shared::types::PaginatedResponse;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::listing::ListQuery;
use crate::services::session::{ActiveAgent, SessionFilter, StartSessionInput, StartSessionResponse};
use crate::services::SessionService;
use crate::AppState;

/// Open a session at the agent's GPS position
pub async fn start_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<StartSessionInput>,
) -> AppResult<(StatusCode, Json<StartSessionResponse>)> {
    current_user.0.require(Capability::OpenFieldSession)?;
    let service = SessionService::new(state.db);
    let response = service.start_session(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn end_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<EndedSession>> {
    current_user.0.require(Capability::OpenFieldSession)?;
    let service = SessionService::new(state.db);
    Ok(Json(service.end_session(&current_user.0, session_id).await?))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<SessionFilter>,
) -> AppResult<Json<PaginatedResponse<AgentSession>>> {
    current_user
        .0
        .require_any(&[Capability::OpenFieldSession, Capability::ViewActiveAgents])?;
    let service = SessionService::new(state.db);
    Ok(Json(service.list_sessions(&current_user.0, &list, &filter).await?))
}

pub async fn get_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<AgentSession>> {
    current_user
        .0
        .require_any(&[Capability::OpenFieldSession, Capability::ViewActiveAgents])?;
    let service = SessionService::new(state.db);
    Ok(Json(service.get_session(&current_user.0, session_id).await?))
}

/// Agents with an open session
pub async fn active_agents(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<ActiveAgent>>> {
    current_user.0.require(Capability::ViewActiveAgents)?;
    let service = SessionService::new(state.db);
    Ok(Json(service.active_agents().await?))
}

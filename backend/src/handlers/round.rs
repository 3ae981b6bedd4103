//! HTTP handlers for collection rounds and their stops

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
use crate::services::listing::ListQuery;
use crate::services::round::{
    ArriveStopInput, CompleteStopInput, CreateRoundInput, CreateStopInput, FailStopInput,
    PostponeStopInput, RoundActionInput, RoundFilter, RoundView, Stop, StopFilter,
    UpdateRoundInput,
};
use crate::services::RoundService;
use crate::AppState;

// ============================================================================
// Rounds
// ============================================================================

pub async fn list_rounds(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<RoundFilter>,
) -> AppResult<Json<PaginatedResponse<RoundView>>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = RoundService::new(state.db);
    Ok(Json(service.list_rounds(&list, &filter).await?))
}

pub async fn get_round(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(round_id): Path<Uuid>,
) -> AppResult<Json<RoundView>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = RoundService::new(state.db);
    Ok(Json(service.get_round(round_id).await?))
}

pub async fn create_round(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateRoundInput>,
) -> AppResult<(StatusCode, Json<RoundView>)> {
    current_user.0.require(Capability::PlanRounds)?;
    let service = RoundService::new(state.db);
    let round = service.create_round(input).await?;
    Ok((StatusCode::CREATED, Json(round)))
}

pub async fn update_round(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(round_id): Path<Uuid>,
    Json(input): Json<UpdateRoundInput>,
) -> AppResult<Json<RoundView>> {
    current_user.0.require(Capability::PlanRounds)?;
    let service = RoundService::new(state.db);
    Ok(Json(service.update_round(round_id, input).await?))
}

pub async fn start_round(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(round_id): Path<Uuid>,
) -> AppResult<Json<RoundView>> {
    current_user.0.require(Capability::OperateStops)?;
    let service = RoundService::new(state.db);
    Ok(Json(service.start_round(round_id).await?))
}

/// Complete the round and freeze its completion rate
pub async fn end_round(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(round_id): Path<Uuid>,
    input: Option<Json<RoundActionInput>>,
) -> AppResult<Json<RoundView>> {
    current_user.0.require(Capability::OperateStops)?;
    let service = RoundService::new(state.db);
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(service.end_round(round_id, input).await?))
}

pub async fn cancel_round(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(round_id): Path<Uuid>,
    input: Option<Json<RoundActionInput>>,
) -> AppResult<Json<RoundView>> {
    current_user.0.require(Capability::PlanRounds)?;
    let service = RoundService::new(state.db);
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(service.cancel_round(round_id, input).await?))
}

pub async fn postpone_round(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(round_id): Path<Uuid>,
    input: Option<Json<RoundActionInput>>,
) -> AppResult<Json<RoundView>> {
    current_user.0.require(Capability::PlanRounds)?;
    let service = RoundService::new(state.db);
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(service.postpone_round(round_id, input).await?))
}

/// Stops of a round in visit order
pub async fn round_stops(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(round_id): Path<Uuid>,
) -> AppResult<Json<Vec<Stop>>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = RoundService::new(state.db);
    Ok(Json(service.round_stops(round_id).await?))
}

pub async fn create_stop(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(round_id): Path<Uuid>,
    Json(input): Json<CreateStopInput>,
) -> AppResult<(StatusCode, Json<Stop>)> {
    current_user.0.require(Capability::PlanRounds)?;
    let service = RoundService::new(state.db);
    let stop = service.create_stop(round_id, input).await?;
    Ok((StatusCode::CREATED, Json(stop)))
}

// ============================================================================
// Stops
// ============================================================================

/// Clients see the stops at their own address
pub async fn list_stops(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<StopFilter>,
) -> AppResult<Json<PaginatedResponse<Stop>>> {
    current_user.0.require_own_or_any(&[Capability::ViewRegistry])?;
    let service = RoundService::new(state.db);
    Ok(Json(service.list_stops(&current_user.0, &list, &filter).await?))
}

pub async fn get_stop(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(stop_id): Path<Uuid>,
) -> AppResult<Json<Stop>> {
    current_user.0.require_own_or_any(&[Capability::ViewRegistry])?;
    let service = RoundService::new(state.db);
    Ok(Json(service.get_stop(&current_user.0, stop_id).await?))
}

pub async fn arrive_at_stop(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(stop_id): Path<Uuid>,
    Json(input): Json<ArriveStopInput>,
) -> AppResult<Json<Stop>> {
    current_user.0.require(Capability::OperateStops)?;
    let service = RoundService::new(state.db);
    Ok(Json(service.arrive(stop_id, input).await?))
}

pub async fn complete_stop(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(stop_id): Path<Uuid>,
    input: Option<Json<CompleteStopInput>>,
) -> AppResult<Json<Stop>> {
    current_user.0.require(Capability::OperateStops)?;
    let service = RoundService::new(state.db);
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(service.complete(stop_id, input).await?))
}

pub async fn fail_stop(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(stop_id): Path<Uuid>,
    Json(input): Json<FailStopInput>,
) -> AppResult<Json<Stop>> {
    current_user.0.require(Capability::OperateStops)?;
    let service = RoundService::new(state.db);
    Ok(Json(service.fail(stop_id, input).await?))
}

pub async fn postpone_stop(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(stop_id): Path<Uuid>,
    input: Option<Json<PostponeStopInput>>,
) -> AppResult<Json<Stop>> {
    current_user.0.require(Capability::OperateStops)?;
    let service = RoundService::new(state.db);
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(service.postpone_stop(stop_id, input).await?))
}

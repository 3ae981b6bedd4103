//! HTTP handlers for collection zones

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
use crate::services::client::Client;
use crate::services::listing::ListQuery;
use crate::services::zone::{CreateZoneInput, UpdateZoneInput, Zone, ZoneStatistics};
use crate::services::ZoneService;
use crate::AppState;

pub async fn list_zones(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
) -> AppResult<Json<PaginatedResponse<Zone>>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = ZoneService::new(state.db);
    Ok(Json(service.list_zones(&list).await?))
}

pub async fn get_zone(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(zone_id): Path<Uuid>,
) -> AppResult<Json<Zone>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = ZoneService::new(state.db);
    Ok(Json(service.get_zone(zone_id).await?))
}

pub async fn create_zone(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateZoneInput>,
) -> AppResult<(StatusCode, Json<Zone>)> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ZoneService::new(state.db);
    let zone = service.create_zone(input).await?;
    Ok((StatusCode::CREATED, Json(zone)))
}

pub async fn update_zone(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(zone_id): Path<Uuid>,
    Json(input): Json<UpdateZoneInput>,
) -> AppResult<Json<Zone>> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ZoneService::new(state.db);
    Ok(Json(service.update_zone(zone_id, input).await?))
}

pub async fn delete_zone(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(zone_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ZoneService::new(state.db);
    service.delete_zone(zone_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn zone_clients(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(zone_id): Path<Uuid>,
) -> AppResult<Json<Vec<Client>>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = ZoneService::new(state.db);
    Ok(Json(service.zone_clients(zone_id).await?))
}

pub async fn zone_statistics(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(zone_id): Path<Uuid>,
) -> AppResult<Json<ZoneStatistics>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = ZoneService::new(state.db);
    Ok(Json(service.statistics(zone_id).await?))
}

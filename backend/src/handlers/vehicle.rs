//! HTTP handlers for the vehicle fleet

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
use crate::services::vehicle::{
    CreateVehicleInput, MaintenanceOutcome, MaintenanceRecord, RegisterMaintenanceInput,
    UpdateVehicleInput, Vehicle, VehicleFilter,
};
use crate::services::VehicleService;
use crate::AppState;

// ============================================================================
// Vehicle CRUD
// ============================================================================

pub async fn list_vehicles(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<VehicleFilter>,
) -> AppResult<Json<PaginatedResponse<Vehicle>>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = VehicleService::new(state.db);
    Ok(Json(service.list_vehicles(&list, &filter).await?))
}

pub async fn get_vehicle(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<Json<Vehicle>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = VehicleService::new(state.db);
    Ok(Json(service.get_vehicle(vehicle_id).await?))
}

pub async fn create_vehicle(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateVehicleInput>,
) -> AppResult<(StatusCode, Json<Vehicle>)> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = VehicleService::new(state.db);
    let vehicle = service.create_vehicle(input).await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

pub async fn update_vehicle(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(vehicle_id): Path<Uuid>,
    Json(input): Json<UpdateVehicleInput>,
) -> AppResult<Json<Vehicle>> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = VehicleService::new(state.db);
    Ok(Json(service.update_vehicle(vehicle_id, input).await?))
}

pub async fn delete_vehicle(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = VehicleService::new(state.db);
    service.delete_vehicle(vehicle_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Availability and maintenance
// ============================================================================

pub async fn operational_vehicles(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Vehicle>>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = VehicleService::new(state.db);
    Ok(Json(service.operational_vehicles().await?))
}

/// Vehicles with a revision, insurance or inspection due
pub async fn maintenance_due_vehicles(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Vehicle>>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = VehicleService::new(state.db);
    let today = Utc::now().date_naive();
    Ok(Json(service.maintenance_due(today).await?))
}

pub async fn register_maintenance(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(vehicle_id): Path<Uuid>,
    Json(input): Json<RegisterMaintenanceInput>,
) -> AppResult<(StatusCode, Json<MaintenanceOutcome>)> {
    current_user.0.require(Capability::RegisterMaintenance)?;
    let service = VehicleService::new(state.db);
    let outcome = service
        .register_maintenance(vehicle_id, current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn maintenance_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<Json<Vec<MaintenanceRecord>>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = VehicleService::new(state.db);
    Ok(Json(service.maintenance_history(vehicle_id).await?))
}

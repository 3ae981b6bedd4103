//! HTTP handlers for the client registry

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
use crate::services::client::{
    Client, ClientFilter, ClientHistory, ClientStatistics, CreateClientInput, UpdateClientInput,
};
use crate::services::listing::ListQuery;
use crate::services::ClientService;
use crate::AppState;

// ============================================================================
// Client CRUD
// ============================================================================

/// Clients only get their own record back
pub async fn list_clients(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<ClientFilter>,
) -> AppResult<Json<PaginatedResponse<Client>>> {
    current_user.0.require_own_or_any(&[Capability::ViewRegistry])?;
    let service = ClientService::new(state.db);
    Ok(Json(service.list_clients(&current_user.0, &list, &filter).await?))
}

pub async fn get_client(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
) -> AppResult<Json<Client>> {
    current_user.0.require_own_or_any(&[Capability::ViewRegistry])?;
    let service = ClientService::new(state.db);
    Ok(Json(service.get_client(&current_user.0, client_id).await?))
}

pub async fn create_client(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateClientInput>,
) -> AppResult<(StatusCode, Json<Client>)> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ClientService::new(state.db);
    let client = service.create_client(input).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update_client(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
    Json(input): Json<UpdateClientInput>,
) -> AppResult<Json<Client>> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ClientService::new(state.db);
    Ok(Json(service.update_client(client_id, input).await?))
}

pub async fn delete_client(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ClientService::new(state.db);
    service.delete_client(client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Inactivity and statistics
// ============================================================================

pub async fn mark_client_inactive(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
) -> AppResult<Json<Client>> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ClientService::new(state.db);
    Ok(Json(service.mark_inactive(client_id).await?))
}

/// Active clients without a payment in the last 90 days
pub async fn inactive_clients(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Client>>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = ClientService::new(state.db);
    let today = Utc::now().date_naive();
    Ok(Json(service.inactive_candidates(today).await?))
}

pub async fn client_statistics(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ClientStatistics>> {
    current_user.0.require(Capability::ViewRegistry)?;
    let service = ClientService::new(state.db);
    let today = Utc::now().date_naive();
    Ok(Json(service.statistics(today).await?))
}

/// Client with its contracts and bins
pub async fn client_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
) -> AppResult<Json<ClientHistory>> {
    current_user.0.require_own_or_any(&[Capability::ViewRegistry])?;
    let service = ClientService::new(state.db);
    Ok(Json(service.history(&current_user.0, client_id).await?))
}

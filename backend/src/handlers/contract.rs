//! HTTP handlers for contracts and the bins placed under them

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
use crate::services::contract::{
    Bin, BinFilter, Contract, ContractFilter, CreateBinInput, CreateContractInput, UpdateBinInput,
    UpdateContractInput,
};
use crate::services::listing::ListQuery;
use crate::services::ContractService;
use crate::AppState;

// ============================================================================
// Contracts
// ============================================================================

pub async fn list_contracts(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<ContractFilter>,
) -> AppResult<Json<PaginatedResponse<Contract>>> {
    current_user.0.require_own_or_any(&[Capability::ViewRegistry])?;
    let service = ContractService::new(state.db);
    Ok(Json(service.list_contracts(&current_user.0, &list, &filter).await?))
}

pub async fn get_contract(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(contract_id): Path<Uuid>,
) -> AppResult<Json<Contract>> {
    current_user.0.require_own_or_any(&[Capability::ViewRegistry])?;
    let service = ContractService::new(state.db);
    Ok(Json(service.get_contract(&current_user.0, contract_id).await?))
}

pub async fn create_contract(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateContractInput>,
) -> AppResult<(StatusCode, Json<Contract>)> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ContractService::new(state.db);
    let contract = service
        .create_contract(input, &state.config.billing.currency)
        .await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

pub async fn update_contract(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(contract_id): Path<Uuid>,
    Json(input): Json<UpdateContractInput>,
) -> AppResult<Json<Contract>> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ContractService::new(state.db);
    Ok(Json(service.update_contract(contract_id, input).await?))
}

pub async fn delete_contract(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(contract_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ContractService::new(state.db);
    service.delete_contract(contract_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Bins
// ============================================================================

pub async fn list_bins(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<BinFilter>,
) -> AppResult<Json<PaginatedResponse<Bin>>> {
    current_user.0.require_own_or_any(&[Capability::ViewRegistry])?;
    let service = ContractService::new(state.db);
    Ok(Json(service.list_bins(&current_user.0, &list, &filter).await?))
}

pub async fn get_bin(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(bin_id): Path<Uuid>,
) -> AppResult<Json<Bin>> {
    current_user.0.require_own_or_any(&[Capability::ViewRegistry])?;
    let service = ContractService::new(state.db);
    Ok(Json(service.get_bin(&current_user.0, bin_id).await?))
}

pub async fn create_bin(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateBinInput>,
) -> AppResult<(StatusCode, Json<Bin>)> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ContractService::new(state.db);
    let bin = service.create_bin(input).await?;
    Ok((StatusCode::CREATED, Json(bin)))
}

pub async fn update_bin(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(bin_id): Path<Uuid>,
    Json(input): Json<UpdateBinInput>,
) -> AppResult<Json<Bin>> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ContractService::new(state.db);
    Ok(Json(service.update_bin(bin_id, input).await?))
}

pub async fn delete_bin(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(bin_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ContractService::new(state.db);
    service.delete_bin(bin_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//! HTTP handlers for prospecting requests

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
use crate::services::prospect::{
    AssignProspectInput, ConversionResult, ConvertProspectInput, CreateProspectInput,
    ProspectFilter, ProspectRequest, RejectProspectInput, VisitProspectInput,
};
use crate::services::ProspectService;
use crate::AppState;

/// Public request for service, no account needed
pub async fn create_prospect_request(
    State(state): State<AppState>,
    Json(input): Json<CreateProspectInput>,
) -> AppResult<(StatusCode, Json<ProspectRequest>)> {
    let service = ProspectService::new(state.db);
    let request = service.create_request(input).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Prospecting agents get the requests assigned to them
pub async fn list_prospect_requests(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<ProspectFilter>,
) -> AppResult<Json<PaginatedResponse<ProspectRequest>>> {
    current_user
        .0
        .require_any(&[Capability::ViewRegistry, Capability::ConvertProspects])?;
    let service = ProspectService::new(state.db);
    Ok(Json(service.list_requests(&current_user.0, &list, &filter).await?))
}

pub async fn get_prospect_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ProspectRequest>> {
    current_user
        .0
        .require_any(&[Capability::ViewRegistry, Capability::ConvertProspects])?;
    let service = ProspectService::new(state.db);
    Ok(Json(service.get_request(&current_user.0, request_id).await?))
}

pub async fn assign_prospect_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
    Json(input): Json<AssignProspectInput>,
) -> AppResult<Json<ProspectRequest>> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ProspectService::new(state.db);
    Ok(Json(service.assign(request_id, input).await?))
}

pub async fn visit_prospect_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
    Json(input): Json<VisitProspectInput>,
) -> AppResult<Json<ProspectRequest>> {
    current_user.0.require(Capability::ConvertProspects)?;
    let service = ProspectService::new(state.db);
    Ok(Json(service.start_visit(&current_user.0, request_id, input).await?))
}

/// Turn the request into a client account with its first contract
pub async fn convert_prospect_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
    Json(input): Json<ConvertProspectInput>,
) -> AppResult<(StatusCode, Json<ConversionResult>)> {
    current_user.0.require(Capability::ConvertProspects)?;
    let service = ProspectService::new(state.db);
    let result = service
        .convert(&current_user.0, request_id, input, &state.config.billing.currency)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn reject_prospect_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
    Json(input): Json<RejectProspectInput>,
) -> AppResult<Json<ProspectRequest>> {
    current_user.0.require(Capability::ManageRegistry)?;
    let service = ProspectService::new(state.db);
    Ok(Json(service.reject(request_id, input).await?))
}

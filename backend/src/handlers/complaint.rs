//! HTTP handlers for complaints about the collection service

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
use crate::services::complaint::{
    AssignComplaintInput, Complaint, ComplaintFilter, CreateComplaintInput,
    ResolveComplaintInput, UpdateComplaintInput,
};
use crate::services::listing::ListQuery;
use crate::services::ComplaintService;
use crate::AppState;

pub async fn list_complaints(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<ComplaintFilter>,
) -> AppResult<Json<PaginatedResponse<Complaint>>> {
    current_user.0.require_own_or_any(&[Capability::HandleComplaints])?;
    let service = ComplaintService::new(state.db);
    Ok(Json(service.list_complaints(&current_user.0, &list, &filter).await?))
}

pub async fn get_complaint(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(complaint_id): Path<Uuid>,
) -> AppResult<Json<Complaint>> {
    current_user.0.require_own_or_any(&[Capability::HandleComplaints])?;
    let service = ComplaintService::new(state.db);
    Ok(Json(service.get_complaint(&current_user.0, complaint_id).await?))
}

/// Open a complaint about a stop
pub async fn create_complaint(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateComplaintInput>,
) -> AppResult<(StatusCode, Json<Complaint>)> {
    current_user.0.require(Capability::FileComplaints)?;
    let service = ComplaintService::new(state.db);
    let complaint = service.create_complaint(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(complaint)))
}

pub async fn update_complaint(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(complaint_id): Path<Uuid>,
    Json(input): Json<UpdateComplaintInput>,
) -> AppResult<Json<Complaint>> {
    current_user.0.require(Capability::HandleComplaints)?;
    let service = ComplaintService::new(state.db);
    Ok(Json(service.update_complaint(complaint_id, input).await?))
}

pub async fn assign_complaint(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(complaint_id): Path<Uuid>,
    Json(input): Json<AssignComplaintInput>,
) -> AppResult<Json<Complaint>> {
    current_user.0.require(Capability::HandleComplaints)?;
    let service = ComplaintService::new(state.db);
    Ok(Json(service.assign(complaint_id, input).await?))
}

pub async fn resolve_complaint(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(complaint_id): Path<Uuid>,
    Json(input): Json<ResolveComplaintInput>,
) -> AppResult<Json<Complaint>> {
    current_user.0.require(Capability::HandleComplaints)?;
    let service = ComplaintService::new(state.db);
    Ok(Json(service.resolve(complaint_id, input).await?))
}

pub async fn close_complaint(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(complaint_id): Path<Uuid>,
) -> AppResult<Json<Complaint>> {
    current_user.0.require(Capability::HandleComplaints)?;
    let service = ComplaintService::new(state.db);
    Ok(Json(service.close(complaint_id).await?))
}

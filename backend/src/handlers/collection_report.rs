//! HTTP handlers for daily collection reports

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use shared::models::Capability;
use shared::types::PaginatedResponse;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::collection_report::{CollectionReport, GenerateReportInput, ReportFilter};
use crate::services::listing::ListQuery;
use crate::services::CollectionReportService;
use crate::AppState;

pub async fn list_collection_reports(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<ReportFilter>,
) -> AppResult<Json<PaginatedResponse<CollectionReport>>> {
    current_user
        .0
        .require_any(&[Capability::RecordPayments, Capability::ViewReports])?;
    let service = CollectionReportService::new(state.db);
    Ok(Json(service.list_reports(&current_user.0, &list, &filter).await?))
}

pub async fn get_collection_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(report_id): Path<Uuid>,
) -> AppResult<Json<CollectionReport>> {
    current_user
        .0
        .require_any(&[Capability::RecordPayments, Capability::ViewReports])?;
    let service = CollectionReportService::new(state.db);
    Ok(Json(service.get_report(&current_user.0, report_id).await?))
}

/// Build or refresh the report of one agent and day
pub async fn generate_collection_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<GenerateReportInput>,
) -> AppResult<Json<CollectionReport>> {
    current_user
        .0
        .require_any(&[Capability::RecordPayments, Capability::ViewReports])?;
    let service = CollectionReportService::new(state.db);
    let today = Utc::now().date_naive();
    Ok(Json(service.generate(&current_user.0, input, today).await?))
}

pub async fn transmit_collection_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(report_id): Path<Uuid>,
) -> AppResult<Json<CollectionReport>> {
    current_user.0.require(Capability::RecordPayments)?;
    let service = CollectionReportService::new(state.db);
    Ok(Json(service.transmit(&current_user.0, report_id).await?))
}

pub async fn validate_collection_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(report_id): Path<Uuid>,
) -> AppResult<Json<CollectionReport>> {
    current_user.0.require(Capability::ManageInvoices)?;
    let service = CollectionReportService::new(state.db);
    Ok(Json(service.validate(report_id).await?))
}

//! Reporting handlers for the dashboard and data export

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use shared::models::Capability;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::reporting::{DashboardMetrics, ReportQuery};
use crate::services::ReportingService;
use crate::AppState;

#[derive(Deserialize)]
pub struct ExportFormat {
    pub format: Option<String>, // "json" or "csv"
}

/// Get dashboard metrics for a period
pub async fn get_dashboard(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ReportQuery>,
) -> AppResult<Json<DashboardMetrics>> {
    current_user.0.require(Capability::ViewReports)?;
    let period = query.period()?;
    let service = ReportingService::new(state.db);
    let metrics = service.dashboard(period, Utc::now().date_naive()).await?;
    Ok(Json(metrics))
}

/// Export the payments of a period, CSV unless JSON is asked for
pub async fn export_payments(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ReportQuery>,
    Query(format): Query<ExportFormat>,
) -> AppResult<Response> {
    current_user.0.require(Capability::ViewReports)?;
    let period = query.period()?;
    let service = ReportingService::new(state.db);
    let data = service.payment_export(period, Utc::now().date_naive()).await?;

    if format.format.as_deref() == Some("json") {
        Ok(Json(data).into_response())
    } else {
        let csv = ReportingService::export_to_csv(&data)?;
        Ok((
            [(header::CONTENT_TYPE, "text/csv"), (header::CONTENT_DISPOSITION, "attachment; filename=\"payments.csv\"")],
            csv,
        ).into_response())
    }
}

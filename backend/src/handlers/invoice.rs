//! HTTP handlers for invoices

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
use crate::services::invoice::{
    CreateInvoiceInput, GenerateInvoiceInput, InvoiceFilter, InvoiceView, UpdateInvoiceInput,
};
use crate::services::listing::ListQuery;
use crate::services::InvoiceService;
use crate::AppState;

const INVOICE_READERS: [Capability; 3] = [
    Capability::ManageInvoices,
    Capability::RecordPayments,
    Capability::ValidatePayments,
];

// ============================================================================
// Invoice CRUD
// ============================================================================

/// Remaining amount and overdue flag are computed for today
pub async fn list_invoices(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<InvoiceFilter>,
) -> AppResult<Json<PaginatedResponse<InvoiceView>>> {
    current_user.0.require_own_or_any(&INVOICE_READERS)?;
    let service = InvoiceService::new(state.db);
    let today = Utc::now().date_naive();
    Ok(Json(
        service
            .list_invoices(&current_user.0, &list, &filter, today)
            .await?,
    ))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<InvoiceView>> {
    current_user.0.require_own_or_any(&INVOICE_READERS)?;
    let service = InvoiceService::new(state.db);
    let today = Utc::now().date_naive();
    Ok(Json(service.get_invoice(&current_user.0, invoice_id, today).await?))
}

/// Bill a contract for one period from its rate and the realized passes
pub async fn generate_invoice(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<GenerateInvoiceInput>,
) -> AppResult<(StatusCode, Json<InvoiceView>)> {
    current_user.0.require(Capability::ManageInvoices)?;
    let service = InvoiceService::new(state.db);
    let today = Utc::now().date_naive();
    let invoice = service
        .generate_invoice(input, &state.config.billing, today)
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateInvoiceInput>,
) -> AppResult<(StatusCode, Json<InvoiceView>)> {
    current_user.0.require(Capability::ManageInvoices)?;
    let service = InvoiceService::new(state.db);
    let today = Utc::now().date_naive();
    let invoice = service
        .create_invoice(input, &state.config.billing, today)
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(invoice_id): Path<Uuid>,
    Json(input): Json<UpdateInvoiceInput>,
) -> AppResult<Json<InvoiceView>> {
    current_user.0.require(Capability::ManageInvoices)?;
    let service = InvoiceService::new(state.db);
    let today = Utc::now().date_naive();
    Ok(Json(service.update_invoice(invoice_id, input, today).await?))
}

/// Only drafts can be deleted
pub async fn delete_invoice(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Capability::ManageInvoices)?;
    let service = InvoiceService::new(state.db);
    service.delete_invoice(invoice_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Invoice lifecycle
// ============================================================================

pub async fn issue_invoice(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<InvoiceView>> {
    current_user.0.require(Capability::ManageInvoices)?;
    let service = InvoiceService::new(state.db);
    let today = Utc::now().date_naive();
    Ok(Json(service.issue(invoice_id, today).await?))
}

pub async fn cancel_invoice(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<InvoiceView>> {
    current_user.0.require(Capability::ManageInvoices)?;
    let service = InvoiceService::new(state.db);
    let today = Utc::now().date_naive();
    Ok(Json(service.cancel(invoice_id, today).await?))
}

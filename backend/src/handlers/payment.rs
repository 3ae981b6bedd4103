//! HTTP handlers for payments and their receipts

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
use crate::services::payment::{
    ContestPaymentInput, CreatePaymentInput, PaymentFilter, PaymentNoteInput, PaymentView,
    Settlement,
};
use crate::services::receipt::{Receipt, ReceiptVerification};
use crate::services::{PaymentService, ReceiptService};
use crate::AppState;

const PAYMENT_READERS: [Capability; 3] = [
    Capability::RecordPayments,
    Capability::ValidatePayments,
    Capability::ManageInvoices,
];

// ============================================================================
// Payments
// ============================================================================

/// Clients see their own payments, collectors the ones they collected
pub async fn list_payments(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<PaymentFilter>,
) -> AppResult<Json<PaginatedResponse<PaymentView>>> {
    current_user.0.require_own_or_any(&PAYMENT_READERS)?;
    let service = PaymentService::new(state.db);
    Ok(Json(service.list_payments(&current_user.0, &list, &filter).await?))
}

pub async fn get_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<PaymentView>> {
    current_user.0.require_own_or_any(&PAYMENT_READERS)?;
    let service = PaymentService::new(state.db);
    Ok(Json(service.get_payment(&current_user.0, payment_id).await?))
}

/// Record a payment against an invoice, status pending
pub async fn create_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreatePaymentInput>,
) -> AppResult<(StatusCode, Json<PaymentView>)> {
    current_user.0.require(Capability::RecordPayments)?;
    let service = PaymentService::new(state.db);
    let payment = service.create_payment(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(payment_id): Path<Uuid>,
    input: Option<Json<PaymentNoteInput>>,
) -> AppResult<Json<PaymentView>> {
    current_user.0.require(Capability::ValidatePayments)?;
    let service = PaymentService::new(state.db);
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(service.verify(payment_id, input).await?))
}

/// Validate the payment, settle the invoice and issue the receipt
pub async fn validate_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<Settlement>> {
    current_user.0.require(Capability::ValidatePayments)?;
    let service = PaymentService::new(state.db);
    let settlement = service
        .validate(payment_id, &state.config.receipts.signing_secret)
        .await?;
    Ok(Json(settlement))
}

pub async fn refuse_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(payment_id): Path<Uuid>,
    input: Option<Json<PaymentNoteInput>>,
) -> AppResult<Json<PaymentView>> {
    current_user.0.require(Capability::ValidatePayments)?;
    let service = PaymentService::new(state.db);
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(service.refuse(payment_id, input).await?))
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(payment_id): Path<Uuid>,
    input: Option<Json<PaymentNoteInput>>,
) -> AppResult<Json<PaymentView>> {
    current_user
        .0
        .require_any(&[Capability::RecordPayments, Capability::ValidatePayments])?;
    let service = PaymentService::new(state.db);
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(service.cancel(payment_id, input).await?))
}

/// Client confirmation, within the contestation window
pub async fn confirm_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<PaymentView>> {
    current_user.0.require(Capability::ContestPayments)?;
    let service = PaymentService::new(state.db);
    Ok(Json(service.confirm(&current_user.0, payment_id).await?))
}

pub async fn contest_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(payment_id): Path<Uuid>,
    Json(input): Json<ContestPaymentInput>,
) -> AppResult<Json<PaymentView>> {
    current_user.0.require(Capability::ContestPayments)?;
    let service = PaymentService::new(state.db);
    Ok(Json(service.contest(&current_user.0, payment_id, input).await?))
}

// ============================================================================
// Receipts
// ============================================================================

pub async fn payment_receipt(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<Receipt>> {
    current_user.0.require_own_or_any(&PAYMENT_READERS)?;
    let service = ReceiptService::new(state.db);
    Ok(Json(service.receipt_for_payment(&current_user.0, payment_id).await?))
}

pub async fn get_receipt(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(receipt_id): Path<Uuid>,
) -> AppResult<Json<Receipt>> {
    current_user.0.require_own_or_any(&PAYMENT_READERS)?;
    let service = ReceiptService::new(state.db);
    Ok(Json(service.get_receipt(&current_user.0, receipt_id).await?))
}

/// Check the receipt content against its signature
pub async fn verify_receipt(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(receipt_id): Path<Uuid>,
) -> AppResult<Json<ReceiptVerification>> {
    current_user.0.require_own_or_any(&PAYMENT_READERS)?;
    let service = ReceiptService::new(state.db);
    let verification = service
        .verify(&current_user.0, receipt_id, &state.config.receipts.signing_secret)
        .await?;
    Ok(Json(verification))
}

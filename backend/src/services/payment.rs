//! Payments against invoices
//!
//! Validation settles the invoice inside one transaction: the invoice row is
//! locked, the remaining amount is recomputed from validated payments and the
//! signed receipt is written before commit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::services::invoice::InvoiceService;
use crate::services::listing::ListQuery;
use crate::services::receipt::{insert_receipt, NewReceipt, Receipt};
use shared::codes::{generate_code, CodePrefix};
use shared::models::{
    compute_amounts, remaining_amount, status_after_settlement, ContestationState, InvoiceStatus,
    PaymentAction, PaymentChannel, PaymentStatus, UserType,
};
use shared::types::PaginatedResponse;
use shared::validation::{validate_coordinates, validate_positive_amount};

pub(crate) const PAYMENT_COLUMNS: &str = "id, number, invoice_id, client_id, amount, channel, \
     collecting_agent_id, qr_code_presented, qr_code_matched, latitude, longitude, \
     transaction_reference, cheque_number, status, paid_at, validated_at, client_confirmed, \
     client_confirmed_at, contested, contestation_reason, contested_at, notes, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub number: String,
    pub invoice_id: Uuid,
    pub client_id: Uuid,
    pub amount: Decimal,
    pub channel: PaymentChannel,
    pub collecting_agent_id: Option<Uuid>,
    pub qr_code_presented: Option<String>,
    pub qr_code_matched: bool,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub transaction_reference: Option<String>,
    pub cheque_number: Option<String>,
    pub status: PaymentStatus,
    pub paid_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub client_confirmed: bool,
    pub client_confirmed_at: Option<DateTime<Utc>>,
    pub contested: bool,
    pub contestation_reason: Option<String>,
    pub contested_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn contestation(&self, now: DateTime<Utc>) -> ContestationState {
        ContestationState::of(
            self.status,
            self.validated_at,
            self.client_confirmed,
            self.contested,
            now,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: Payment,
    pub contestation: ContestationState,
}

impl PaymentView {
    pub fn new(payment: Payment, now: DateTime<Utc>) -> Self {
        let contestation = payment.contestation(now);
        Self {
            payment,
            contestation,
        }
    }
}

/// Outcome of validating a payment
#[derive(Debug, Serialize)]
pub struct Settlement {
    pub payment: PaymentView,
    pub invoice_status: InvoiceStatus,
    pub remaining_amount: Decimal,
    pub receipt: Receipt,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentInput {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub channel: PaymentChannel,
    pub collecting_agent_id: Option<Uuid>,
    #[validate(length(max = 20))]
    pub qr_code: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    #[validate(length(max = 100))]
    pub transaction_reference: Option<String>,
    #[validate(length(max = 50))]
    pub cheque_number: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub channel: Option<PaymentChannel>,
    pub invoice_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub collecting_agent_id: Option<Uuid>,
    pub contested: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentNoteInput {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContestPaymentInput {
    pub reason: String,
}

/// Collector chosen for a new payment: the given one, or the recorder when
/// the recorder is a payment collector.
fn collecting_agent(
    recorder: &AuthUser,
    channel: PaymentChannel,
    given: Option<Uuid>,
) -> AppResult<Option<Uuid>> {
    let agent = given.or_else(|| {
        (recorder.user_type == UserType::PaymentCollector).then_some(recorder.user_id)
    });
    if channel.requires_collecting_agent() && agent.is_none() {
        return Err(AppError::validation(
            "collecting_agent_id",
            "Cash and mobile money payments need a collecting agent",
            "Les paiements en espèces ou mobile money exigent un agent collecteur",
        ));
    }
    Ok(agent)
}

/// Payment service
#[derive(Clone)]
pub struct PaymentService {
    db: PgPool,
}

impl PaymentService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Clients see their own payments, collectors the ones they collected
    pub async fn list_payments(
        &self,
        viewer: &AuthUser,
        list: &ListQuery,
        filter: &PaymentFilter,
    ) -> AppResult<PaginatedResponse<PaymentView>> {
        let pagination = list.pagination();
        let order = list.order_by(&["paid_at", "amount", "number", "status"], "paid_at DESC");
        let owner = viewer.is_client().then_some(viewer.user_id);
        let collector = (viewer.user_type == UserType::PaymentCollector).then_some(viewer.user_id);
        let conditions = r#"
            ($1::varchar IS NULL OR status = $1)
            AND ($2::varchar IS NULL OR channel = $2)
            AND ($3::uuid IS NULL OR invoice_id = $3)
            AND ($4::uuid IS NULL OR client_id = $4)
            AND ($5::uuid IS NULL OR collecting_agent_id = $5)
            AND ($6::boolean IS NULL OR contested = $6)
            AND ($7::uuid IS NULL OR client_id IN (SELECT id FROM clients WHERE user_id = $7))
            AND ($8::uuid IS NULL OR collecting_agent_id = $8)
            AND ($9::text IS NULL OR number ILIKE $9 OR transaction_reference ILIKE $9)
        "#;
        let search = list.search_pattern();

        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE {conditions} \
             ORDER BY {order} LIMIT $10 OFFSET $11"
        ))
        .bind(filter.status)
        .bind(filter.channel)
        .bind(filter.invoice_id)
        .bind(filter.client_id)
        .bind(filter.collecting_agent_id)
        .bind(filter.contested)
        .bind(owner)
        .bind(collector)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM payments WHERE {conditions}"
        ))
        .bind(filter.status)
        .bind(filter.channel)
        .bind(filter.invoice_id)
        .bind(filter.client_id)
        .bind(filter.collecting_agent_id)
        .bind(filter.contested)
        .bind(owner)
        .bind(collector)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        let now = Utc::now();
        let payments = payments
            .into_iter()
            .map(|p| PaymentView::new(p, now))
            .collect();
        Ok(PaginatedResponse::new(payments, &pagination, total))
    }

    pub async fn get_payment(&self, viewer: &AuthUser, payment_id: Uuid) -> AppResult<PaymentView> {
        let owner = viewer.is_client().then_some(viewer.user_id);
        let collector = (viewer.user_type == UserType::PaymentCollector).then_some(viewer.user_id);

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE id = $1
              AND ($2::uuid IS NULL OR client_id IN (SELECT id FROM clients WHERE user_id = $2))
              AND ($3::uuid IS NULL OR collecting_agent_id = $3)
            "#
        ))
        .bind(payment_id)
        .bind(owner)
        .bind(collector)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))?;

        Ok(PaymentView::new(payment, Utc::now()))
    }

    /// Records a pending payment. A presented QR code is checked against the
    /// invoice's client and the result stored with the payment.
    pub async fn create_payment(
        &self,
        recorder: &AuthUser,
        input: CreatePaymentInput,
    ) -> AppResult<PaymentView> {
        input.validate()?;
        validate_positive_amount(input.amount).map_err(|m| AppError::invalid_field("amount", m))?;
        if let (Some(lat), Some(lng)) = (input.latitude, input.longitude) {
            validate_coordinates(lat, lng).map_err(|m| AppError::invalid_field("latitude", m))?;
        }
        let collecting_agent_id = collecting_agent(recorder, input.channel, input.collecting_agent_id)?;

        let (client_id, invoice_status) = sqlx::query_as::<_, (Uuid, InvoiceStatus)>(
            "SELECT client_id, status FROM invoices WHERE id = $1",
        )
        .bind(input.invoice_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice".to_string()))?;

        if !invoice_status.accepts_payments() {
            return Err(AppError::InvalidStateTransition(format!(
                "cannot record a payment on an invoice that is {}",
                invoice_status
            )));
        }

        let qr_code_matched = match input.qr_code.as_deref() {
            Some(code) => {
                sqlx::query_scalar::<_, bool>(
                    r#"
                    SELECT EXISTS (
                        SELECT 1 FROM client_qr_codes q
                        JOIN clients c ON c.user_id = q.user_id
                        WHERE c.id = $1 AND q.code = $2 AND q.is_active
                    )
                    "#,
                )
                .bind(client_id)
                .bind(code)
                .fetch_one(&self.db)
                .await?
            }
            None => false,
        };

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments
                (number, invoice_id, client_id, amount, channel, collecting_agent_id,
                 qr_code_presented, qr_code_matched, latitude, longitude, transaction_reference,
                 cheque_number, paid_at, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, COALESCE($13, NOW()), $14)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(generate_code(CodePrefix::Payment))
        .bind(input.invoice_id)
        .bind(client_id)
        .bind(input.amount)
        .bind(input.channel)
        .bind(collecting_agent_id)
        .bind(&input.qr_code)
        .bind(qr_code_matched)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(&input.transaction_reference)
        .bind(&input.cheque_number)
        .bind(input.paid_at)
        .bind(&input.notes)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match AppError::from_write(e, "number") {
            AppError::NotFound(_) => AppError::NotFound("Collecting agent".to_string()),
            other => other,
        })?;

        tracing::info!(
            payment_id = %payment.id,
            invoice_id = %payment.invoice_id,
            amount = %payment.amount,
            channel = %payment.channel,
            qr_code_matched,
            "payment recorded"
        );
        Ok(PaymentView::new(payment, Utc::now()))
    }

    pub async fn verify(&self, payment_id: Uuid, input: PaymentNoteInput) -> AppResult<PaymentView> {
        self.transition(payment_id, PaymentAction::Verify, input).await
    }

    pub async fn refuse(&self, payment_id: Uuid, input: PaymentNoteInput) -> AppResult<PaymentView> {
        self.transition(payment_id, PaymentAction::Refuse, input).await
    }

    pub async fn cancel(&self, payment_id: Uuid, input: PaymentNoteInput) -> AppResult<PaymentView> {
        self.transition(payment_id, PaymentAction::Cancel, input).await
    }

    async fn transition(
        &self,
        payment_id: Uuid,
        action: PaymentAction,
        input: PaymentNoteInput,
    ) -> AppResult<PaymentView> {
        let mut tx = self.db.begin().await?;
        let payment = Self::lock(&mut tx, payment_id).await?;
        let next = payment.status.apply(action)?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments SET status = $2, notes = COALESCE($3, notes), updated_at = NOW() \
             WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment_id)
        .bind(next)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(payment_id = %payment_id, status = %next, "payment status changed");
        Ok(PaymentView::new(payment, Utc::now()))
    }

    /// Validates a payment and settles its invoice.
    ///
    /// Locks the invoice before the payment so concurrent validations on
    /// the same invoice serialize.
    pub async fn validate(&self, payment_id: Uuid, receipt_secret: &str) -> AppResult<Settlement> {
        let mut tx = self.db.begin().await?;

        let invoice_id = sqlx::query_scalar::<_, Uuid>("SELECT invoice_id FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment".to_string()))?;

        let invoice = InvoiceService::lock(&mut tx, invoice_id).await?;
        let payment = Self::lock(&mut tx, payment_id).await?;
        let next = payment.status.apply(PaymentAction::Validate)?;

        if !invoice.status.accepts_payments() {
            return Err(AppError::InvalidStateTransition(format!(
                "cannot settle an invoice that is {}",
                invoice.status
            )));
        }

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments SET status = $2, validated_at = NOW(), updated_at = NOW() \
             WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment_id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        let settled = sqlx::query_as::<_, (PaymentStatus, Decimal)>(
            "SELECT status, amount FROM payments WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .fetch_all(&mut *tx)
        .await?;

        let total = compute_amounts(invoice.pre_tax_amount, invoice.tax_rate).total;
        let remaining = remaining_amount(total, settled);
        let invoice_status = status_after_settlement(remaining);

        sqlx::query(
            r#"
            UPDATE invoices
            SET status = $2,
                fully_paid_at = CASE WHEN $2 = 'paid' THEN NOW() ELSE fully_paid_at END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(invoice_status)
        .execute(&mut *tx)
        .await?;

        let (email, phone) = sqlx::query_as::<_, (String, Option<String>)>(
            r#"
            UPDATE clients c SET last_payment_at = NOW(), updated_at = NOW()
            FROM users u
            WHERE c.id = $1 AND u.id = c.user_id
            RETURNING u.email, u.phone
            "#,
        )
        .bind(payment.client_id)
        .fetch_one(&mut *tx)
        .await?;

        let content = serde_json::json!({
            "payment_id": payment.id,
            "payment_number": payment.number,
            "invoice_id": invoice.id,
            "invoice_number": invoice.number,
            "client_id": payment.client_id,
            "amount": payment.amount,
            "channel": payment.channel,
            "paid_at": payment.paid_at,
            "validated_at": payment.validated_at,
            "collecting_agent_id": payment.collecting_agent_id,
            "remaining_amount": remaining,
        });
        let receipt = insert_receipt(
            &mut tx,
            receipt_secret,
            NewReceipt {
                payment_id: payment.id,
                content,
                recipient_email: Some(&email),
                recipient_sms: phone.as_deref(),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment_id,
            invoice_id = %invoice_id,
            amount = %payment.amount,
            remaining = %remaining,
            invoice_status = %invoice_status,
            receipt = %receipt.number,
            "payment validated"
        );

        Ok(Settlement {
            payment: PaymentView::new(payment, Utc::now()),
            invoice_status,
            remaining_amount: remaining,
            receipt,
        })
    }

    /// Client acknowledgement of a validated payment
    pub async fn confirm(&self, client: &AuthUser, payment_id: Uuid) -> AppResult<PaymentView> {
        let mut tx = self.db.begin().await?;
        let payment = Self::lock_owned(&mut tx, client, payment_id).await?;
        let now = Utc::now();

        if !payment.contestation(now).allows_confirmation() {
            return Err(AppError::InvalidStateTransition(format!(
                "cannot confirm a payment whose contestation state is {}",
                contestation_label(payment.contestation(now))
            )));
        }

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments SET client_confirmed = TRUE, client_confirmed_at = NOW(), \
             updated_at = NOW() WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(PaymentView::new(payment, now))
    }

    /// Records a dispute while the window is open. Status is left as is.
    pub async fn contest(
        &self,
        client: &AuthUser,
        payment_id: Uuid,
        input: ContestPaymentInput,
    ) -> AppResult<PaymentView> {
        if input.reason.trim().is_empty() {
            return Err(AppError::validation(
                "reason",
                "A reason is required to contest a payment",
                "Un motif est requis pour contester un paiement",
            ));
        }

        let mut tx = self.db.begin().await?;
        let payment = Self::lock_owned(&mut tx, client, payment_id).await?;
        let now = Utc::now();
        let state = payment.contestation(now);

        if !state.allows_contest() {
            return Err(AppError::InvalidStateTransition(format!(
                "cannot contest a payment whose contestation state is {}",
                contestation_label(state)
            )));
        }

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments SET contested = TRUE, contestation_reason = $2, contested_at = NOW(), \
             updated_at = NOW() WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment_id)
        .bind(input.reason.trim())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::warn!(payment_id = %payment_id, client_id = %payment.client_id, "payment contested");
        Ok(PaymentView::new(payment, now))
    }

    async fn lock(conn: &mut PgConnection, payment_id: Uuid) -> AppResult<Payment> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))
    }

    async fn lock_owned(conn: &mut PgConnection, client: &AuthUser, payment_id: Uuid) -> AppResult<Payment> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 \
             AND client_id IN (SELECT id FROM clients WHERE user_id = $2) FOR UPDATE"
        ))
        .bind(payment_id)
        .bind(client.user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))
    }
}

fn contestation_label(state: ContestationState) -> &'static str {
    match state {
        ContestationState::NotApplicable => "not applicable",
        ContestationState::Open => "open",
        ContestationState::Confirmed => "confirmed",
        ContestationState::Contested => "contested",
        ContestationState::Settled => "settled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(user_type: UserType) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            user_type,
        }
    }

    #[test]
    fn test_cash_needs_collecting_agent() {
        let admin = user(UserType::Admin);
        assert!(collecting_agent(&admin, PaymentChannel::Cash, None).is_err());
        assert_eq!(
            collecting_agent(&admin, PaymentChannel::BankTransfer, None).unwrap(),
            None
        );
        let agent = Uuid::new_v4();
        assert_eq!(
            collecting_agent(&admin, PaymentChannel::MobileMoney, Some(agent)).unwrap(),
            Some(agent)
        );
    }

    #[test]
    fn test_collector_defaults_to_recorder() {
        let collector = user(UserType::PaymentCollector);
        assert_eq!(
            collecting_agent(&collector, PaymentChannel::Cash, None).unwrap(),
            Some(collector.user_id)
        );
    }

    #[test]
    fn test_contestation_label() {
        assert_eq!(contestation_label(ContestationState::Settled), "settled");
    }
}

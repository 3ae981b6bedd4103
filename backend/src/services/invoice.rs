//! Invoices
//!
//! Tax and total are recomputed from the pre-tax amount and rate on every
//! write. Remaining amount and overdue state are derived on read.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::BillingConfig;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::services::contract::{Contract, CONTRACT_COLUMNS};
use crate::services::listing::ListQuery;
use shared::codes::{generate_code, CodePrefix};
use shared::models::{
    compute_amounts, default_due_date, is_overdue, period_pre_tax, remaining_amount, BillingPeriod,
    InvoiceAction, InvoiceStatus, PaymentStatus,
};
use shared::types::PaginatedResponse;
use shared::validation::{validate_date_range, validate_money_precision, validate_tax_rate};

pub(crate) const INVOICE_COLUMNS: &str = "i.id, i.number, i.client_id, i.contract_id, \
     i.billing_period, i.period_start, i.period_end, i.pre_tax_amount, i.tax_rate, i.tax_amount, \
     i.total_amount, i.planned_passes, i.realized_passes, i.collected_quantity_kg, i.status, \
     i.issue_date, i.due_date, i.fully_paid_at, i.auto_generated, i.created_at, i.updated_at";

/// Sum of validated payments, selected next to [`INVOICE_COLUMNS`]
const PAID_COLUMN: &str = "COALESCE((SELECT SUM(p.amount) FROM payments p \
     WHERE p.invoice_id = i.id AND p.status = 'validated'), 0) AS paid_amount";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub number: String,
    pub client_id: Uuid,
    pub contract_id: Uuid,
    pub billing_period: BillingPeriod,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub pre_tax_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub planned_passes: i32,
    pub realized_passes: i32,
    pub collected_quantity_kg: Decimal,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub fully_paid_at: Option<DateTime<Utc>>,
    pub auto_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    #[sqlx(flatten)]
    invoice: Invoice,
    paid_amount: Decimal,
}

/// Invoice with its derived settlement figures
#[derive(Debug, Serialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub is_overdue: bool,
}

impl InvoiceView {
    pub fn new(invoice: Invoice, paid_amount: Decimal, today: NaiveDate) -> Self {
        let total = compute_amounts(invoice.pre_tax_amount, invoice.tax_rate).total;
        let remaining = remaining_amount(total, [(PaymentStatus::Validated, paid_amount)]);
        let is_overdue = is_overdue(today, invoice.due_date, invoice.status);
        Self {
            invoice,
            paid_amount,
            remaining_amount: remaining,
            is_overdue,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateInvoiceInput {
    pub contract_id: Uuid,
    #[serde(default = "default_period")]
    pub billing_period: BillingPeriod,
    pub period_start: Option<NaiveDate>,
    pub issue_date: Option<NaiveDate>,
    pub tax_rate: Option<Decimal>,
}

fn default_period() -> BillingPeriod {
    BillingPeriod::Monthly
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceInput {
    pub contract_id: Uuid,
    #[serde(default = "default_period")]
    pub billing_period: BillingPeriod,
    pub period_start: NaiveDate,
    pub period_end: Option<NaiveDate>,
    pub pre_tax_amount: Decimal,
    pub tax_rate: Option<Decimal>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub planned_passes: i32,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub realized_passes: i32,
    pub collected_quantity_kg: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateInvoiceInput {
    pub pre_tax_amount: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub due_date: Option<NaiveDate>,
    #[validate(range(min = 0))]
    pub planned_passes: Option<i32>,
    #[validate(range(min = 0))]
    pub realized_passes: Option<i32>,
    pub collected_quantity_kg: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
    pub contract_id: Option<Uuid>,
    pub billing_period: Option<BillingPeriod>,
    pub overdue: Option<bool>,
}

fn check_amounts(pre_tax: Decimal, tax_rate: Decimal) -> AppResult<()> {
    if pre_tax.is_sign_negative() {
        return Err(AppError::validation(
            "pre_tax_amount",
            "Pre-tax amount cannot be negative",
            "Le montant HT ne peut pas être négatif",
        ));
    }
    validate_money_precision(pre_tax).map_err(|m| AppError::invalid_field("pre_tax_amount", m))?;
    validate_tax_rate(tax_rate).map_err(|m| AppError::invalid_field("tax_rate", m))
}

/// Invoice service
#[derive(Clone)]
pub struct InvoiceService {
    db: PgPool,
}

impl InvoiceService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_invoices(
        &self,
        viewer: &AuthUser,
        list: &ListQuery,
        filter: &InvoiceFilter,
        today: NaiveDate,
    ) -> AppResult<PaginatedResponse<InvoiceView>> {
        let pagination = list.pagination();
        let order = list.order_by(
            &["issue_date", "due_date", "total_amount", "number", "status"],
            "issue_date DESC",
        );
        let owner = viewer.is_client().then_some(viewer.user_id);
        let conditions = r#"
            ($1::varchar IS NULL OR i.status = $1)
            AND ($2::uuid IS NULL OR i.client_id = $2)
            AND ($3::uuid IS NULL OR i.contract_id = $3)
            AND ($4::varchar IS NULL OR i.billing_period = $4)
            AND ($5::boolean IS NULL OR (i.due_date < $6 AND i.status <> 'paid') = $5)
            AND ($7::uuid IS NULL OR i.client_id IN (SELECT id FROM clients WHERE user_id = $7))
            AND ($8::text IS NULL OR i.number ILIKE $8)
        "#;
        let search = list.search_pattern();

        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS}, {PAID_COLUMN} FROM invoices i WHERE {conditions} \
             ORDER BY i.{order} LIMIT $9 OFFSET $10"
        ))
        .bind(filter.status)
        .bind(filter.client_id)
        .bind(filter.contract_id)
        .bind(filter.billing_period)
        .bind(filter.overdue)
        .bind(today)
        .bind(owner)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM invoices i WHERE {conditions}"
        ))
        .bind(filter.status)
        .bind(filter.client_id)
        .bind(filter.contract_id)
        .bind(filter.billing_period)
        .bind(filter.overdue)
        .bind(today)
        .bind(owner)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        let invoices = rows
            .into_iter()
            .map(|row| InvoiceView::new(row.invoice, row.paid_amount, today))
            .collect();
        Ok(PaginatedResponse::new(invoices, &pagination, total))
    }

    pub async fn get_invoice(
        &self,
        viewer: &AuthUser,
        invoice_id: Uuid,
        today: NaiveDate,
    ) -> AppResult<InvoiceView> {
        let owner = viewer.is_client().then_some(viewer.user_id);
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS}, {PAID_COLUMN} FROM invoices i WHERE i.id = $1 \
             AND ($2::uuid IS NULL OR i.client_id IN (SELECT id FROM clients WHERE user_id = $2))"
        ))
        .bind(invoice_id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice".to_string()))?;

        Ok(InvoiceView::new(row.invoice, row.paid_amount, today))
    }

    /// Bills a contract for one period. The contract must be in force on the
    /// first day of the period. Passes realized and quantity collected are
    /// taken from the client's completed stops in the period.
    pub async fn generate_invoice(
        &self,
        input: GenerateInvoiceInput,
        billing: &BillingConfig,
        today: NaiveDate,
    ) -> AppResult<InvoiceView> {
        let tax_rate = input.tax_rate.unwrap_or(billing.default_tax_rate);
        let period_start = input.period_start.unwrap_or(today);
        let period_end = input.billing_period.end_date(period_start);
        let issue_date = input.issue_date.unwrap_or(today);

        let mut tx = self.db.begin().await?;

        let contract = sqlx::query_as::<_, Contract>(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = $1"
        ))
        .bind(input.contract_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Contract".to_string()))?;

        if !contract.in_force(period_start) {
            return Err(AppError::Conflict {
                resource: "contract".to_string(),
                message: "The contract is not in force for this period".to_string(),
                message_fr: "Le contrat n'est pas en vigueur pour cette période".to_string(),
            });
        }

        let pre_tax = period_pre_tax(contract.monthly_rate, input.billing_period);
        check_amounts(pre_tax, tax_rate)?;
        let planned_passes = contract.frequency.passes_per(input.billing_period.months());

        let (realized_passes, collected_quantity) = sqlx::query_as::<_, (i64, Decimal)>(
            r#"
            SELECT COUNT(*), COALESCE(SUM(estimated_quantity_kg), 0)
            FROM collection_stops
            WHERE client_id = $1 AND status = 'completed'
              AND departed_at::date BETWEEN $2 AND $3
            "#,
        )
        .bind(contract.client_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&mut *tx)
        .await?;

        let invoice = Self::insert(
            &mut tx,
            NewInvoice {
                client_id: contract.client_id,
                contract_id: contract.id,
                billing_period: input.billing_period,
                period_start,
                period_end,
                pre_tax,
                tax_rate,
                planned_passes,
                realized_passes: i32::try_from(realized_passes).unwrap_or(i32::MAX),
                collected_quantity_kg: collected_quantity,
                issue_date,
                due_date: default_due_date(issue_date, billing.due_days),
                auto_generated: true,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            invoice_id = %invoice.id,
            number = %invoice.number,
            contract_id = %contract.id,
            total = %invoice.total_amount,
            "invoice generated"
        );
        Ok(InvoiceView::new(invoice, Decimal::ZERO, today))
    }

    pub async fn create_invoice(
        &self,
        input: CreateInvoiceInput,
        billing: &BillingConfig,
        today: NaiveDate,
    ) -> AppResult<InvoiceView> {
        input.validate()?;
        let tax_rate = input.tax_rate.unwrap_or(billing.default_tax_rate);
        check_amounts(input.pre_tax_amount, tax_rate)?;

        let period_end = input
            .period_end
            .unwrap_or_else(|| input.billing_period.end_date(input.period_start));
        validate_date_range(input.period_start, period_end)
            .map_err(|m| AppError::invalid_field("period_end", m))?;

        let issue_date = input.issue_date.unwrap_or(today);
        let due_date = input
            .due_date
            .unwrap_or_else(|| default_due_date(issue_date, billing.due_days));
        validate_date_range(issue_date, due_date).map_err(|m| AppError::invalid_field("due_date", m))?;

        let mut tx = self.db.begin().await?;

        let client_id = sqlx::query_scalar::<_, Uuid>("SELECT client_id FROM contracts WHERE id = $1")
            .bind(input.contract_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Contract".to_string()))?;

        let invoice = Self::insert(
            &mut tx,
            NewInvoice {
                client_id,
                contract_id: input.contract_id,
                billing_period: input.billing_period,
                period_start: input.period_start,
                period_end,
                pre_tax: input.pre_tax_amount,
                tax_rate,
                planned_passes: input.planned_passes,
                realized_passes: input.realized_passes,
                collected_quantity_kg: input.collected_quantity_kg.unwrap_or_default(),
                issue_date,
                due_date,
                auto_generated: false,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(invoice_id = %invoice.id, number = %invoice.number, "invoice created");
        Ok(InvoiceView::new(invoice, Decimal::ZERO, today))
    }

    /// Only draft invoices can be edited. Totals are recomputed from the
    /// merged pre-tax amount and rate.
    pub async fn update_invoice(
        &self,
        invoice_id: Uuid,
        input: UpdateInvoiceInput,
        today: NaiveDate,
    ) -> AppResult<InvoiceView> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let current = Self::lock(&mut tx, invoice_id).await?;

        if current.status != InvoiceStatus::Draft {
            return Err(AppError::InvalidStateTransition(format!(
                "cannot edit an invoice that is {}",
                current.status
            )));
        }

        let pre_tax = input.pre_tax_amount.unwrap_or(current.pre_tax_amount);
        let tax_rate = input.tax_rate.unwrap_or(current.tax_rate);
        check_amounts(pre_tax, tax_rate)?;
        let amounts = compute_amounts(pre_tax, tax_rate);

        let due_date = input.due_date.unwrap_or(current.due_date);
        validate_date_range(current.issue_date, due_date)
            .map_err(|m| AppError::invalid_field("due_date", m))?;

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices i
            SET pre_tax_amount = $2,
                tax_rate = $3,
                tax_amount = $4,
                total_amount = $5,
                due_date = $6,
                planned_passes = COALESCE($7, planned_passes),
                realized_passes = COALESCE($8, realized_passes),
                collected_quantity_kg = COALESCE($9, collected_quantity_kg),
                updated_at = NOW()
            WHERE i.id = $1
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice_id)
        .bind(amounts.pre_tax)
        .bind(amounts.tax_rate)
        .bind(amounts.tax)
        .bind(amounts.total)
        .bind(due_date)
        .bind(input.planned_passes)
        .bind(input.realized_passes)
        .bind(input.collected_quantity_kg)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(InvoiceView::new(invoice, Decimal::ZERO, today))
    }

    pub async fn delete_invoice(&self, invoice_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let invoice = Self::lock(&mut tx, invoice_id).await?;

        if invoice.status != InvoiceStatus::Draft {
            return Err(AppError::InvalidStateTransition(format!(
                "cannot delete an invoice that is {}",
                invoice.status
            )));
        }

        sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::from_delete(e, "invoice"))?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn issue(&self, invoice_id: Uuid, today: NaiveDate) -> AppResult<InvoiceView> {
        self.transition(invoice_id, InvoiceAction::Issue, today).await
    }

    pub async fn cancel(&self, invoice_id: Uuid, today: NaiveDate) -> AppResult<InvoiceView> {
        self.transition(invoice_id, InvoiceAction::Cancel, today).await
    }

    async fn transition(
        &self,
        invoice_id: Uuid,
        action: InvoiceAction,
        today: NaiveDate,
    ) -> AppResult<InvoiceView> {
        let mut tx = self.db.begin().await?;
        let invoice = Self::lock(&mut tx, invoice_id).await?;
        let next = invoice.status.apply(action)?;

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "UPDATE invoices i SET status = $2, updated_at = NOW() WHERE i.id = $1 \
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(invoice_id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        let paid = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE invoice_id = $1 AND status = 'validated'",
        )
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(invoice_id = %invoice_id, status = %next, "invoice status changed");
        Ok(InvoiceView::new(invoice, paid, today))
    }

    pub(crate) async fn lock(conn: &mut PgConnection, invoice_id: Uuid) -> AppResult<Invoice> {
        sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices i WHERE i.id = $1 FOR UPDATE"
        ))
        .bind(invoice_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice".to_string()))
    }

    async fn insert(conn: &mut PgConnection, new: NewInvoice) -> AppResult<Invoice> {
        let amounts = compute_amounts(new.pre_tax, new.tax_rate);

        sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices AS i
                (number, client_id, contract_id, billing_period, period_start, period_end,
                 pre_tax_amount, tax_rate, tax_amount, total_amount, planned_passes,
                 realized_passes, collected_quantity_kg, issue_date, due_date, auto_generated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(generate_code(CodePrefix::Invoice))
        .bind(new.client_id)
        .bind(new.contract_id)
        .bind(new.billing_period)
        .bind(new.period_start)
        .bind(new.period_end)
        .bind(amounts.pre_tax)
        .bind(amounts.tax_rate)
        .bind(amounts.tax)
        .bind(amounts.total)
        .bind(new.planned_passes)
        .bind(new.realized_passes)
        .bind(new.collected_quantity_kg)
        .bind(new.issue_date)
        .bind(new.due_date)
        .bind(new.auto_generated)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::from_write(e, "number"))
    }
}

struct NewInvoice {
    client_id: Uuid,
    contract_id: Uuid,
    billing_period: BillingPeriod,
    period_start: NaiveDate,
    period_end: NaiveDate,
    pre_tax: Decimal,
    tax_rate: Decimal,
    planned_passes: i32,
    realized_passes: i32,
    collected_quantity_kg: Decimal,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    auto_generated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn invoice(status: InvoiceStatus, due: NaiveDate) -> Invoice {
        let amounts = compute_amounts(dec("12000"), dec("18.00"));
        Invoice {
            id: Uuid::new_v4(),
            number: generate_code(CodePrefix::Invoice),
            client_id: Uuid::new_v4(),
            contract_id: Uuid::new_v4(),
            billing_period: BillingPeriod::Monthly,
            period_start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            pre_tax_amount: amounts.pre_tax,
            tax_rate: amounts.tax_rate,
            tax_amount: amounts.tax,
            total_amount: amounts.total,
            planned_passes: 4,
            realized_passes: 4,
            collected_quantity_kg: Decimal::ZERO,
            status,
            issue_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            due_date: due,
            fully_paid_at: None,
            auto_generated: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_view_derives_remaining_and_overdue() {
        let due = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let after_due = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();

        let view = InvoiceView::new(invoice(InvoiceStatus::Issued, due), dec("4160.00"), after_due);
        assert_eq!(view.remaining_amount, dec("10000.00"));
        assert!(view.is_overdue);

        let view = InvoiceView::new(invoice(InvoiceStatus::Paid, due), dec("14160.00"), after_due);
        assert_eq!(view.remaining_amount, dec("0.00"));
        assert!(!view.is_overdue);
    }

    #[test]
    fn test_view_ignores_stored_total() {
        let due = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let mut stale = invoice(InvoiceStatus::Issued, due);
        stale.total_amount = dec("1.00");
        let view = InvoiceView::new(stale, Decimal::ZERO, due);
        assert_eq!(view.remaining_amount, dec("14160.00"));
    }

    #[test]
    fn test_check_amounts() {
        assert!(check_amounts(dec("100"), dec("18.00")).is_ok());
        assert!(check_amounts(dec("-1"), dec("18.00")).is_err());
        assert!(check_amounts(dec("100"), dec("101")).is_err());
        assert!(check_amounts(dec("10.005"), dec("18.00")).is_err());
        assert!(check_amounts(dec("100"), dec("18.125")).is_err());
        assert!(check_amounts(dec("100.50"), dec("18.5")).is_ok());
    }
}

//! Invoices, payments, receipts and the rules that reconcile them

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::types::TransitionError;

/// Tax rate applied when an invoice does not specify one
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(1800, 0, 0, false, 2);

/// Hours a client has to contest a validated payment
pub const CONTESTATION_WINDOW_HOURS: i64 = 48;

/// Days between issue and due date when none is given
pub const DEFAULT_DUE_DAYS: i64 = 30;

// ============================================================================
// Invoices
// ============================================================================

string_enum! {
    pub enum InvoiceStatus {
        Draft => "draft",
        Issued => "issued",
        Paid => "paid",
        PartiallyPaid => "partially_paid",
        Overdue => "overdue",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceAction {
    Issue,
    Cancel,
}

impl InvoiceStatus {
    pub fn apply(self, action: InvoiceAction) -> Result<InvoiceStatus, TransitionError> {
        use InvoiceStatus::*;

        match (self, action) {
            (Draft, InvoiceAction::Issue) => Ok(Issued),
            (Draft | Issued | PartiallyPaid | Overdue, InvoiceAction::Cancel) => Ok(Cancelled),
            _ => Err(TransitionError {
                entity: "invoice",
                from: self.as_str(),
                action: match action {
                    InvoiceAction::Issue => "issue",
                    InvoiceAction::Cancel => "cancel",
                },
            }),
        }
    }

    /// Whether payments may still be recorded against the invoice
    pub fn accepts_payments(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Issued | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue
        )
    }
}

string_enum! {
    /// Length of the service period an invoice covers
    pub enum BillingPeriod {
        Monthly => "monthly",
        Quarterly => "quarterly",
        Semiannual => "semiannual",
        Annual => "annual",
    }
}

impl BillingPeriod {
    pub fn months(&self) -> u32 {
        match self {
            BillingPeriod::Monthly => 1,
            BillingPeriod::Quarterly => 3,
            BillingPeriod::Semiannual => 6,
            BillingPeriod::Annual => 12,
        }
    }

    /// Last day of a period starting on `start`
    pub fn end_date(&self, start: NaiveDate) -> NaiveDate {
        start
            .checked_add_months(chrono::Months::new(self.months()))
            .and_then(|d| d.pred_opt())
            .unwrap_or(start)
    }
}

/// Tax and total derived from a pre-tax amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAmounts {
    pub pre_tax: Decimal,
    pub tax_rate: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Inputs and tax are rounded to the cent, matching the stored columns, so a
/// total recomputed from stored values equals the stored total.
pub fn compute_amounts(pre_tax: Decimal, tax_rate: Decimal) -> InvoiceAmounts {
    let pre_tax = pre_tax.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let tax_rate = tax_rate.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let tax = (pre_tax * tax_rate / Decimal::from(100))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    InvoiceAmounts {
        pre_tax,
        tax_rate,
        tax,
        total: pre_tax + tax,
    }
}

/// Pre-tax amount for a contract billed over `period`
pub fn period_pre_tax(monthly_rate: Decimal, period: BillingPeriod) -> Decimal {
    monthly_rate * Decimal::from(period.months())
}

/// Total minus every validated payment. Other payment statuses never count.
pub fn remaining_amount<I>(total: Decimal, payments: I) -> Decimal
where
    I: IntoIterator<Item = (PaymentStatus, Decimal)>,
{
    let paid: Decimal = payments
        .into_iter()
        .filter(|(status, _)| *status == PaymentStatus::Validated)
        .map(|(_, amount)| amount)
        .sum();
    total - paid
}

/// An invoice is overdue once its due date has passed and it is not paid
pub fn is_overdue(today: NaiveDate, due_date: NaiveDate, status: InvoiceStatus) -> bool {
    today > due_date && status != InvoiceStatus::Paid
}

/// Status an invoice takes after a payment against it is validated
pub fn status_after_settlement(remaining: Decimal) -> InvoiceStatus {
    if remaining <= Decimal::ZERO {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::PartiallyPaid
    }
}

/// Due date for an invoice issued on `issue_date`
pub fn default_due_date(issue_date: NaiveDate, due_days: i64) -> NaiveDate {
    issue_date + Duration::days(due_days)
}

// ============================================================================
// Payments
// ============================================================================

string_enum! {
    pub enum PaymentChannel {
        Cash => "cash",
        MobileMoney => "mobile_money",
        BankTransfer => "bank_transfer",
        Check => "check",
        Card => "card",
        OnlineGateway => "online_gateway",
        Prepaid => "prepaid",
    }
}

impl PaymentChannel {
    /// Channels where money changes hands through a field collector
    pub fn requires_collecting_agent(&self) -> bool {
        matches!(self, PaymentChannel::Cash | PaymentChannel::MobileMoney)
    }
}

string_enum! {
    pub enum PaymentStatus {
        Pending => "pending",
        Validated => "validated",
        Refused => "refused",
        UnderVerification => "under_verification",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentAction {
    Verify,
    Validate,
    Refuse,
    Cancel,
}

impl PaymentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentAction::Verify => "verify",
            PaymentAction::Validate => "validate",
            PaymentAction::Refuse => "refuse",
            PaymentAction::Cancel => "cancel",
        }
    }
}

impl PaymentStatus {
    /// Validated payments are immutable; refused and cancelled are final.
    pub fn apply(self, action: PaymentAction) -> Result<PaymentStatus, TransitionError> {
        use PaymentStatus::*;

        let next = match (self, action) {
            (Pending, PaymentAction::Verify) => UnderVerification,
            (Pending | UnderVerification, PaymentAction::Validate) => Validated,
            (Pending | UnderVerification, PaymentAction::Refuse) => Refused,
            (Pending, PaymentAction::Cancel) => Cancelled,
            _ => {
                return Err(TransitionError {
                    entity: "payment",
                    from: self.as_str(),
                    action: action.as_str(),
                })
            }
        };
        Ok(next)
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Validated | PaymentStatus::Refused | PaymentStatus::Cancelled
        )
    }
}

/// End of the contestation window for a payment validated at `validated_at`
pub fn contestation_deadline(validated_at: DateTime<Utc>) -> DateTime<Utc> {
    validated_at + Duration::hours(CONTESTATION_WINDOW_HOURS)
}

/// Where a validated payment stands with respect to client contestation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestationState {
    /// Not validated yet, nothing to contest
    NotApplicable,
    /// The client may still confirm or contest
    Open,
    /// The client confirmed receipt
    Confirmed,
    /// The client disputed the payment
    Contested,
    /// The window passed without confirmation; treated as settled
    Settled,
}

impl ContestationState {
    pub fn of(
        status: PaymentStatus,
        validated_at: Option<DateTime<Utc>>,
        confirmed: bool,
        contested: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let Some(validated_at) = validated_at.filter(|_| status == PaymentStatus::Validated)
        else {
            return ContestationState::NotApplicable;
        };
        if contested {
            ContestationState::Contested
        } else if confirmed {
            ContestationState::Confirmed
        } else if now > contestation_deadline(validated_at) {
            ContestationState::Settled
        } else {
            ContestationState::Open
        }
    }

    pub fn allows_contest(&self) -> bool {
        *self == ContestationState::Open
    }

    pub fn allows_confirmation(&self) -> bool {
        matches!(self, ContestationState::Open | ContestationState::Settled)
    }
}

// ============================================================================
// Receipts and collection reports
// ============================================================================

string_enum! {
    pub enum ReceiptType {
        Digital => "digital",
        Paper => "paper",
        Sms => "sms",
        Email => "email",
    }
}

impl Default for ReceiptType {
    fn default() -> Self {
        ReceiptType::Digital
    }
}

/// Day totals of the money an agent collected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionTotals {
    pub payment_count: i32,
    pub total_amount: Decimal,
    pub cash_amount: Decimal,
    pub mobile_money_amount: Decimal,
}

impl CollectionTotals {
    pub fn add(&mut self, channel: PaymentChannel, amount: Decimal) {
        self.payment_count += 1;
        self.total_amount += amount;
        match channel {
            PaymentChannel::Cash => self.cash_amount += amount,
            PaymentChannel::MobileMoney => self.mobile_money_amount += amount,
            _ => {}
        }
    }
}

impl FromIterator<(PaymentChannel, Decimal)> for CollectionTotals {
    fn from_iter<T: IntoIterator<Item = (PaymentChannel, Decimal)>>(iter: T) -> Self {
        let mut totals = CollectionTotals::default();
        for (channel, amount) in iter {
            totals.add(channel, amount);
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_default_tax_rate() {
        assert_eq!(DEFAULT_TAX_RATE, dec("18.00"));
    }

    #[test]
    fn test_reference_invoice_scenario() {
        let amounts = compute_amounts(dec("12000"), DEFAULT_TAX_RATE);
        assert_eq!(amounts.tax, dec("2160.00"));
        assert_eq!(amounts.total, dec("14160.00"));

        let remaining = remaining_amount(
            amounts.total,
            [(PaymentStatus::Validated, dec("14160.00"))],
        );
        assert_eq!(remaining, dec("0.00"));

        let status = status_after_settlement(remaining);
        assert_eq!(status, InvoiceStatus::Paid);

        let due = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let later = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert!(!is_overdue(later, due, status));
    }

    #[test]
    fn test_tax_rounds_to_cents() {
        let amounts = compute_amounts(dec("333.33"), dec("18.00"));
        assert_eq!(amounts.tax, dec("60.00"));
        assert_eq!(amounts.total, dec("393.33"));
    }

    #[test]
    fn test_remaining_ignores_non_validated() {
        let remaining = remaining_amount(
            dec("1000"),
            [
                (PaymentStatus::Validated, dec("300")),
                (PaymentStatus::Pending, dec("200")),
                (PaymentStatus::Refused, dec("200")),
                (PaymentStatus::UnderVerification, dec("100")),
                (PaymentStatus::Cancelled, dec("50")),
            ],
        );
        assert_eq!(remaining, dec("700"));
        assert_eq!(status_after_settlement(remaining), InvoiceStatus::PartiallyPaid);
    }

    #[test]
    fn test_overdue_predicate() {
        let due = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let on_due = due;
        let after = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert!(!is_overdue(on_due, due, InvoiceStatus::Issued));
        assert!(is_overdue(after, due, InvoiceStatus::Issued));
        assert!(is_overdue(after, due, InvoiceStatus::Cancelled));
        assert!(!is_overdue(after, due, InvoiceStatus::Paid));
    }

    #[test]
    fn test_invoice_lifecycle() {
        assert_eq!(InvoiceStatus::Draft.apply(InvoiceAction::Issue), Ok(InvoiceStatus::Issued));
        assert!(InvoiceStatus::Issued.apply(InvoiceAction::Issue).is_err());
        assert!(InvoiceStatus::Paid.apply(InvoiceAction::Cancel).is_err());
        assert_eq!(
            InvoiceStatus::Overdue.apply(InvoiceAction::Cancel),
            Ok(InvoiceStatus::Cancelled)
        );
        assert!(!InvoiceStatus::Draft.accepts_payments());
        assert!(InvoiceStatus::Issued.accepts_payments());
    }

    #[test]
    fn test_billing_period() {
        assert_eq!(period_pre_tax(dec("5000"), BillingPeriod::Quarterly), dec("15000"));
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            BillingPeriod::Monthly.end_date(start),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
        );
        assert_eq!(
            BillingPeriod::Annual.end_date(start),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_payment_lifecycle() {
        use PaymentAction::*;
        assert_eq!(PaymentStatus::Pending.apply(Verify), Ok(PaymentStatus::UnderVerification));
        assert_eq!(
            PaymentStatus::UnderVerification.apply(Validate),
            Ok(PaymentStatus::Validated)
        );
        assert!(PaymentStatus::UnderVerification.apply(Cancel).is_err());
        for action in [Verify, Validate, Refuse, Cancel] {
            assert!(PaymentStatus::Validated.apply(action).is_err());
        }
    }

    #[test]
    fn test_collecting_agent_channels() {
        let needing: Vec<_> = PaymentChannel::ALL
            .iter()
            .filter(|c| c.requires_collecting_agent())
            .collect();
        assert_eq!(needing, [&PaymentChannel::Cash, &PaymentChannel::MobileMoney]);
    }

    #[test]
    fn test_contestation_window() {
        let validated = Utc::now();
        let inside = validated + Duration::hours(47);
        let outside = validated + Duration::hours(49);
        let state = |c, k, now| {
            ContestationState::of(PaymentStatus::Validated, Some(validated), c, k, now)
        };

        assert_eq!(state(false, false, inside), ContestationState::Open);
        assert!(state(false, false, inside).allows_contest());
        assert_eq!(state(false, false, outside), ContestationState::Settled);
        assert!(!state(false, false, outside).allows_contest());
        assert_eq!(state(true, false, inside), ContestationState::Confirmed);
        assert_eq!(state(false, true, inside), ContestationState::Contested);
        assert_eq!(
            ContestationState::of(PaymentStatus::Pending, None, false, false, inside),
            ContestationState::NotApplicable
        );
    }

    #[test]
    fn test_collection_totals() {
        let totals: CollectionTotals = [
            (PaymentChannel::Cash, dec("1000")),
            (PaymentChannel::MobileMoney, dec("2500")),
            (PaymentChannel::Cash, dec("500")),
            (PaymentChannel::Check, dec("700")),
        ]
        .into_iter()
        .collect();
        assert_eq!(totals.payment_count, 4);
        assert_eq!(totals.total_amount, dec("4700"));
        assert_eq!(totals.cash_amount, dec("1500"));
        assert_eq!(totals.mobile_money_amount, dec("2500"));
    }
}

//! Invoice and payment reconciliation tests
//!
//! Property-based and unit tests for:
//! - invoice amounts (tax rounding, total identity)
//! - remaining amount and settlement status
//! - payment lifecycle and the contestation window

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::models::{
    compute_amounts, default_due_date, is_overdue, period_pre_tax, remaining_amount,
    status_after_settlement, BillingPeriod, ContestationState, InvoiceAction, InvoiceStatus,
    PaymentAction, PaymentStatus, DEFAULT_TAX_RATE,
};
use std::str::FromStr;

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Amounts in XOF with cents, up to ten million
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..1_000_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// Tax rates between 0.00 and 100.00
fn tax_rate_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000).prop_map(|basis| Decimal::new(basis, 2))
}

fn payment_status_strategy() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::Validated),
        Just(PaymentStatus::Refused),
        Just(PaymentStatus::UnderVerification),
        Just(PaymentStatus::Cancelled),
    ]
}

fn payments_strategy() -> impl Strategy<Value = Vec<(PaymentStatus, Decimal)>> {
    prop::collection::vec((payment_status_strategy(), amount_strategy()), 0..8)
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    /// The total is always the pre-tax amount plus the tax rounded to the cent
    #[test]
    fn test_total_is_pre_tax_plus_rounded_tax(
        pre_tax in amount_strategy(),
        rate in tax_rate_strategy(),
    ) {
        let amounts = compute_amounts(pre_tax, rate);
        let exact_tax = pre_tax * rate / Decimal::from(100);

        prop_assert_eq!(amounts.total, amounts.pre_tax + amounts.tax);
        prop_assert!(amounts.tax.scale() <= 2);
        prop_assert!((amounts.tax - exact_tax).abs() <= dec("0.005"));
    }

    /// Recomputing from the stored pre-tax amount and rate changes nothing
    #[test]
    fn test_amounts_are_idempotent(
        pre_tax in amount_strategy(),
        rate in tax_rate_strategy(),
    ) {
        let first = compute_amounts(pre_tax, rate);
        let second = compute_amounts(first.pre_tax, first.tax_rate);
        prop_assert_eq!(first, second);
    }

    /// Rounding the amounts to the stored NUMERIC scale and recomputing
    /// yields the same total, whatever precision the caller sent
    #[test]
    fn test_stored_amounts_recompute_to_stored_total(
        mills in 0i64..10_000_000_000,
        rate_mills in 0i64..=100_000,
    ) {
        let amounts = compute_amounts(Decimal::new(mills, 3), Decimal::new(rate_mills, 3));
        let stored_pre_tax = amounts.pre_tax.round_dp(2);
        let stored_rate = amounts.tax_rate.round_dp(2);
        let stored_total = amounts.total.round_dp(2);

        prop_assert_eq!(stored_total, amounts.total);
        prop_assert_eq!(compute_amounts(stored_pre_tax, stored_rate).total, stored_total);
    }

    /// Only validated payments reduce the remaining amount
    #[test]
    fn test_remaining_counts_only_validated_payments(
        total in amount_strategy(),
        payments in payments_strategy(),
    ) {
        let validated: Decimal = payments
            .iter()
            .filter(|(status, _)| *status == PaymentStatus::Validated)
            .map(|(_, amount)| *amount)
            .sum();

        prop_assert_eq!(remaining_amount(total, payments.clone()), total - validated);

        let without_validated: Vec<_> = payments
            .into_iter()
            .filter(|(status, _)| *status != PaymentStatus::Validated)
            .collect();
        prop_assert_eq!(remaining_amount(total, without_validated), total);
    }

    /// Settlement marks the invoice paid exactly when nothing is left
    #[test]
    fn test_settlement_status(total in amount_strategy(), paid in amount_strategy()) {
        let remaining = remaining_amount(total, vec![(PaymentStatus::Validated, paid)]);
        let status = status_after_settlement(remaining);
        if paid >= total {
            prop_assert_eq!(status, InvoiceStatus::Paid);
        } else {
            prop_assert_eq!(status, InvoiceStatus::PartiallyPaid);
        }
    }

    /// A paid invoice is never overdue, whatever the date
    #[test]
    fn test_paid_invoice_never_overdue(days_late in 0i64..3650) {
        let due = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        let today = due + Duration::days(days_late);
        prop_assert!(!is_overdue(today, due, InvoiceStatus::Paid));
        prop_assert_eq!(is_overdue(today, due, InvoiceStatus::Issued), days_late > 0);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[test]
fn test_sub_cent_pre_tax_is_rounded_before_tax() {
    let amounts = compute_amounts(dec("10.005"), dec("50"));
    assert_eq!(amounts.pre_tax, dec("10.01"));
    assert_eq!(amounts.tax, dec("5.01"));
    assert_eq!(amounts.total, dec("15.02"));

    // paying the stored total settles the invoice
    let remaining = remaining_amount(amounts.total, vec![(PaymentStatus::Validated, dec("15.02"))]);
    assert_eq!(remaining, Decimal::ZERO);
    assert_eq!(status_after_settlement(remaining), InvoiceStatus::Paid);
}

#[test]
fn test_standard_invoice_scenario() {
    let amounts = compute_amounts(dec("12000"), dec("18.00"));
    assert_eq!(amounts.tax, dec("2160.00"));
    assert_eq!(amounts.total, dec("14160.00"));

    let remaining = remaining_amount(
        amounts.total,
        vec![
            (PaymentStatus::Refused, dec("14160.00")),
            (PaymentStatus::Validated, dec("14160.00")),
        ],
    );
    assert_eq!(remaining, dec("0.00"));

    let status = status_after_settlement(remaining);
    assert_eq!(status, InvoiceStatus::Paid);

    let due = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
    let past_due = NaiveDate::from_ymd_opt(2026, 4, 15).unwrap();
    assert!(!is_overdue(past_due, due, status));
}

#[test]
fn test_default_tax_rate_and_due_date() {
    assert_eq!(DEFAULT_TAX_RATE, dec("18.00"));
    let issued = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
    assert_eq!(
        default_due_date(issued, 30),
        NaiveDate::from_ymd_opt(2026, 2, 14).unwrap()
    );
}

#[test]
fn test_period_pre_tax() {
    assert_eq!(period_pre_tax(dec("5000"), BillingPeriod::Quarterly), dec("15000"));
    assert_eq!(period_pre_tax(dec("5000"), BillingPeriod::Annual), dec("60000"));
    let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    assert_eq!(
        BillingPeriod::Monthly.end_date(start),
        NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()
    );
}

#[test]
fn test_invoice_lifecycle() {
    let issued = InvoiceStatus::Draft.apply(InvoiceAction::Issue).unwrap();
    assert_eq!(issued, InvoiceStatus::Issued);
    assert!(issued.accepts_payments());
    assert!(issued.apply(InvoiceAction::Issue).is_err());
    assert!(InvoiceStatus::Paid.apply(InvoiceAction::Cancel).is_err());
    assert!(!InvoiceStatus::Draft.accepts_payments());
}

#[test]
fn test_validated_payment_is_immutable() {
    let validated = PaymentStatus::UnderVerification
        .apply(PaymentAction::Validate)
        .unwrap();
    assert!(validated.is_final());
    for action in [
        PaymentAction::Verify,
        PaymentAction::Validate,
        PaymentAction::Refuse,
        PaymentAction::Cancel,
    ] {
        assert!(validated.apply(action).is_err());
    }
    assert!(PaymentStatus::Refused.apply(PaymentAction::Validate).is_err());
}

#[test]
fn test_contestation_window() {
    let validated_at = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();
    let within = validated_at + Duration::hours(47);
    let after = validated_at + Duration::hours(49);

    let open = ContestationState::of(PaymentStatus::Validated, Some(validated_at), false, false, within);
    assert_eq!(open, ContestationState::Open);
    assert!(open.allows_contest());

    let settled = ContestationState::of(PaymentStatus::Validated, Some(validated_at), false, false, after);
    assert_eq!(settled, ContestationState::Settled);
    assert!(!settled.allows_contest());
    assert!(settled.allows_confirmation());

    let pending = ContestationState::of(PaymentStatus::Pending, None, false, false, within);
    assert_eq!(pending, ContestationState::NotApplicable);
}

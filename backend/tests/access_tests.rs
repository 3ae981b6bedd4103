//! Authorization, generated code and input validation tests
//!
//! Property-based and unit tests for:
//! - the user type capability table
//! - `<PREFIX>-<HEX>` generated codes
//! - registry and billing input rules

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::codes::{generate_code, is_valid_code, CodePrefix};
use shared::models::{Capability, UserType};
use shared::types::{parse_ordering, Pagination, MAX_PER_PAGE};
use shared::validation::{
    validate_coordinates, validate_email, validate_phone, validate_positive_amount,
    validate_satisfaction_score, validate_tax_rate, validate_zone_code,
};

// ============================================================================
// Property Test Strategies
// ============================================================================

fn user_type_strategy() -> impl Strategy<Value = UserType> {
    prop::sample::select(UserType::ALL.to_vec())
}

fn code_prefix_strategy() -> impl Strategy<Value = CodePrefix> {
    prop_oneof![
        Just(CodePrefix::Invoice),
        Just(CodePrefix::Payment),
        Just(CodePrefix::Receipt),
        Just(CodePrefix::QrCode),
        Just(CodePrefix::Client),
        Just(CodePrefix::Agent),
        Just(CodePrefix::Contract),
        Just(CodePrefix::Complaint),
    ]
}

/// Generate valid email addresses
fn email_strategy() -> impl Strategy<Value = String> {
    "[a-z]{5,10}@[a-z]{3,8}\\.(com|org|net|bf)"
}

/// Generate Burkinabe mobile numbers
fn phone_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "\\+226[0-9]{8}",
        "[0-9]{2} [0-9]{2} [0-9]{2} [0-9]{2}",
    ]
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    /// Visitors can do nothing and clients only their own complaints and payments
    #[test]
    fn test_capability_table(user_type in user_type_strategy()) {
        if user_type == UserType::Visitor {
            prop_assert!(!user_type.can(Capability::ViewRegistry));
            prop_assert!(!user_type.can(Capability::FileComplaints));
        }
        if user_type == UserType::Client {
            prop_assert!(user_type.can(Capability::ContestPayments));
            prop_assert!(!user_type.can(Capability::ViewRegistry));
            prop_assert!(user_type.is_scoped_to_self());
        } else {
            prop_assert!(!user_type.can(Capability::ContestPayments));
            prop_assert!(!user_type.is_scoped_to_self());
        }
        // Only admins write the registry or manage accounts
        prop_assert_eq!(user_type.can(Capability::ManageRegistry), user_type == UserType::Admin);
        prop_assert_eq!(user_type.can(Capability::ManageUsers), user_type == UserType::Admin);
    }

    /// Every field agent can open a session; nobody else can
    #[test]
    fn test_field_sessions(user_type in user_type_strategy()) {
        prop_assert_eq!(user_type.can(Capability::OpenFieldSession), user_type.is_field_agent());
    }

    /// Generated codes always have the documented shape
    #[test]
    fn test_generated_code_shape(prefix in code_prefix_strategy()) {
        let code = generate_code(prefix);
        prop_assert!(is_valid_code(prefix, &code));
        let expected_prefix = format!("{}-", prefix.as_str());
        prop_assert!(code.starts_with(&expected_prefix));
        prop_assert_eq!(code.len(), prefix.as_str().len() + 1 + prefix.suffix_len());
    }

    #[test]
    fn test_valid_emails_accepted(email in email_strategy()) {
        prop_assert!(validate_email(&email).is_ok());
    }

    #[test]
    fn test_valid_phones_accepted(phone in phone_strategy()) {
        prop_assert!(validate_phone(&phone).is_ok());
    }

    /// per_page never exceeds the maximum and page is at least one
    #[test]
    fn test_pagination_is_clamped(page in proptest::option::of(0u32..1000), per_page in proptest::option::of(0u32..1000)) {
        let pagination = Pagination::from_query(page, per_page);
        prop_assert!(pagination.limit() >= 1);
        prop_assert!(pagination.limit() <= i64::from(MAX_PER_PAGE));
        prop_assert!(pagination.offset() >= 0);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[test]
fn test_role_examples() {
    assert!(UserType::PaymentCollector.can(Capability::RecordPayments));
    assert!(!UserType::PaymentCollector.can(Capability::ValidatePayments));
    assert!(UserType::Supervisor.can(Capability::ValidatePayments));
    assert!(UserType::PickupAgent.can(Capability::OperateStops));
    assert!(UserType::ProspectingAgent.can(Capability::ConvertProspects));
    assert!(!UserType::Admin.can(Capability::ConvertProspects));
    assert!(UserType::Admin.can(Capability::RegisterMaintenance));
}

#[test]
fn test_ordering_whitelist() {
    let allowed = ["number", "created_at"];
    assert_eq!(parse_ordering("-created_at", &allowed), Some(("created_at", "DESC")));
    assert_eq!(parse_ordering("number", &allowed), Some(("number", "ASC")));
    assert_eq!(parse_ordering("password_hash", &allowed), None);
}

#[test]
fn test_registry_rules() {
    assert!(validate_zone_code("OUAGA-01").is_ok());
    assert!(validate_zone_code("ouaga").is_err());
    assert!(validate_coordinates(Decimal::new(123_714, 4), Decimal::new(-15_197, 4)).is_ok());
    assert!(validate_coordinates(Decimal::from(91), Decimal::ZERO).is_err());
    assert!(validate_phone("12-34").is_err());
    assert!(validate_email("no-at-sign.bf").is_err());
}

#[test]
fn test_billing_rules() {
    assert!(validate_tax_rate(Decimal::new(1800, 2)).is_ok());
    assert!(validate_tax_rate(Decimal::from(101)).is_err());
    assert!(validate_positive_amount(Decimal::new(14_160_00, 2)).is_ok());
    assert!(validate_positive_amount(Decimal::ZERO).is_err());
    assert!(validate_positive_amount(Decimal::new(1_001, 3)).is_err());
    assert!(validate_satisfaction_score(5).is_ok());
    assert!(validate_satisfaction_score(0).is_err());
}

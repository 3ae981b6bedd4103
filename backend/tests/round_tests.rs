//! Collection round and stop tests
//!
//! Property-based and unit tests for:
//! - completion rate (frozen and reported)
//! - unique visit order within a round
//! - round and stop lifecycles

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::models::{
    completion_rate, reported_completion_rate, validate_visit_order, FailureReason, RoundAction,
    RoundStatus, StopAction, StopStatus,
};

// ============================================================================
// Property Test Strategies
// ============================================================================

fn round_action_strategy() -> impl Strategy<Value = RoundAction> {
    prop_oneof![
        Just(RoundAction::Start),
        Just(RoundAction::End),
        Just(RoundAction::Cancel),
        Just(RoundAction::Postpone),
    ]
}

fn stop_action_strategy() -> impl Strategy<Value = StopAction> {
    prop_oneof![
        Just(StopAction::Arrive),
        Just(StopAction::Complete),
        Just(StopAction::Fail(FailureReason::ClientAbsent)),
        Just(StopAction::Fail(FailureReason::VehicleFull)),
        Just(StopAction::Postpone),
    ]
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    /// Reported rates stay within 0..=100 even when realized exceeds planned
    #[test]
    fn test_reported_rate_is_bounded(planned in 0i32..500, realized in 0i32..1000) {
        let rate = reported_completion_rate(planned, realized);
        prop_assert!(rate >= Decimal::ZERO);
        prop_assert!(rate <= Decimal::from(100));
        if realized <= planned {
            prop_assert_eq!(rate, completion_rate(planned, realized));
        }
    }

    /// Nothing planned means a rate of zero
    #[test]
    fn test_zero_planned_rate(realized in 0i32..1000) {
        prop_assert_eq!(completion_rate(0, realized), Decimal::ZERO);
        prop_assert_eq!(reported_completion_rate(0, realized), Decimal::ZERO);
    }

    /// A visit order already used in the round is always rejected
    #[test]
    fn test_duplicate_visit_order_rejected(
        existing in prop::collection::btree_set(1i32..200, 1..20),
        pick in any::<prop::sample::Index>(),
    ) {
        let existing: Vec<i32> = existing.into_iter().collect();
        let taken = *pick.get(&existing);
        prop_assert!(validate_visit_order(&existing, taken).is_err());

        let fresh = existing.iter().max().copied().unwrap_or(0) + 1;
        prop_assert!(validate_visit_order(&existing, fresh).is_ok());
    }

    /// No sequence of actions leaves a terminal round
    #[test]
    fn test_terminal_rounds_stay_terminal(
        actions in prop::collection::vec(round_action_strategy(), 0..12),
    ) {
        let mut status = RoundStatus::Planned;
        for action in actions {
            let was_terminal = status.is_terminal();
            if let Ok(next) = status.apply(action) {
                prop_assert!(!was_terminal);
                status = next;
            }
        }
    }

    /// Completed and failed stops accept no further action
    #[test]
    fn test_closed_stops_stay_closed(action in stop_action_strategy()) {
        prop_assert!(StopStatus::Completed.apply(action).is_err());
        prop_assert!(StopStatus::Failed.apply(action).is_err());
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[test]
fn test_completion_rate_examples() {
    assert_eq!(completion_rate(25, 20), Decimal::from(80));
    assert_eq!(completion_rate(3, 1), Decimal::new(3333, 2));
    // The frozen rate keeps overshoot; reports clamp it
    assert_eq!(completion_rate(10, 12), Decimal::from(120));
    assert_eq!(reported_completion_rate(10, 12), Decimal::from(100));
}

#[test]
fn test_visit_order_must_be_positive() {
    assert!(validate_visit_order(&[], 0).is_err());
    assert!(validate_visit_order(&[], 1).is_ok());
    assert!(validate_visit_order(&[1, 2, 3], 2).is_err());
}

#[test]
fn test_stop_lifecycle() {
    let arrived = StopStatus::Planned.apply(StopAction::Arrive).unwrap();
    assert_eq!(arrived, StopStatus::InProgress);
    assert_eq!(
        arrived.apply(StopAction::Complete).unwrap(),
        StopStatus::Completed
    );
    assert_eq!(
        arrived.apply(StopAction::Fail(FailureReason::AccessBlocked)).unwrap(),
        StopStatus::Failed
    );
    assert!(arrived.apply(StopAction::Postpone).is_err());
    assert!(StopStatus::Planned.apply(StopAction::Complete).is_err());
}

#[test]
fn test_transition_error_message() {
    let err = RoundStatus::Completed.apply(RoundAction::Start).unwrap_err();
    assert_eq!(err.to_string(), "cannot start a round that is completed");
}

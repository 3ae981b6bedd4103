//! Collection rounds and the ordered stops that make them up

use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::TransitionError;

string_enum! {
    /// Collection round status
    pub enum RoundStatus {
        Planned => "planned",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
        Postponed => "postponed",
    }
}

/// Status changes a round accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundAction {
    Start,
    End,
    Cancel,
    Postpone,
}

impl RoundAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundAction::Start => "start",
            RoundAction::End => "end",
            RoundAction::Cancel => "cancel",
            RoundAction::Postpone => "postpone",
        }
    }
}

impl RoundStatus {
    /// Status reached by applying `action`, if the lifecycle allows it
    pub fn apply(self, action: RoundAction) -> Result<RoundStatus, TransitionError> {
        use RoundStatus::*;

        let next = match (self, action) {
            (Planned | Postponed, RoundAction::Start) => InProgress,
            (InProgress, RoundAction::End) => Completed,
            (Planned | Postponed, RoundAction::Cancel) => Cancelled,
            (Planned, RoundAction::Postpone) => Postponed,
            _ => {
                return Err(TransitionError {
                    entity: "round",
                    from: self.as_str(),
                    action: action.as_str(),
                })
            }
        };
        Ok(next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundStatus::Completed | RoundStatus::Cancelled)
    }

    /// Rounds that still count as work to do on the dashboard
    pub fn is_pending(&self) -> bool {
        matches!(self, RoundStatus::Planned | RoundStatus::InProgress)
    }
}

string_enum! {
    /// Status of a single client visit
    pub enum StopStatus {
        Planned => "planned",
        InProgress => "in_progress",
        Completed => "completed",
        Failed => "failed",
        Postponed => "postponed",
    }
}

string_enum! {
    /// Why a stop could not be collected
    pub enum FailureReason {
        ClientAbsent => "client_absent",
        AccessBlocked => "access_blocked",
        NoWaste => "no_waste",
        VehicleFull => "vehicle_full",
        TechnicalProblem => "technical_problem",
        Other => "other",
    }
}

/// Status changes a stop accepts. Failing always carries a reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAction {
    Arrive,
    Complete,
    Fail(FailureReason),
    Postpone,
}

impl StopAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopAction::Arrive => "arrive at",
            StopAction::Complete => "complete",
            StopAction::Fail(_) => "fail",
            StopAction::Postpone => "postpone",
        }
    }
}

impl RoundStatus {
    /// Visits only happen while the round runs. A stop may also be failed or
    /// postponed before the round starts, never once it is closed.
    pub fn allows_stop(self, action: StopAction) -> Result<(), TransitionError> {
        use RoundStatus::*;

        let allowed = match action {
            StopAction::Arrive | StopAction::Complete => self == InProgress,
            StopAction::Fail(_) | StopAction::Postpone => !self.is_terminal(),
        };
        if allowed {
            Ok(())
        } else {
            Err(TransitionError {
                entity: "stop of a round",
                from: self.as_str(),
                action: action.as_str(),
            })
        }
    }
}

impl StopStatus {
    pub fn apply(self, action: StopAction) -> Result<StopStatus, TransitionError> {
        use StopStatus::*;

        let next = match (self, action) {
            (Planned, StopAction::Arrive) => InProgress,
            (InProgress, StopAction::Complete) => Completed,
            (Planned | InProgress, StopAction::Fail(_)) => Failed,
            (Planned, StopAction::Postpone) => Postponed,
            _ => {
                return Err(TransitionError {
                    entity: "stop",
                    from: self.as_str(),
                    action: action.as_str(),
                })
            }
        };
        Ok(next)
    }
}

/// Realized over planned clients, as a percentage with two decimals.
///
/// A round with nothing planned has a rate of zero.
pub fn completion_rate(planned: i32, realized: i32) -> Decimal {
    if planned <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(realized.max(0)) * Decimal::from(100) / Decimal::from(planned))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Completion rate as shown in reports, where realized never exceeds planned
pub fn reported_completion_rate(planned: i32, realized: i32) -> Decimal {
    completion_rate(planned, realized.min(planned))
}

/// Mean of the rates frozen when rounds ended, each capped at 100
pub fn average_completion_rate(rates: &[Decimal]) -> Decimal {
    if rates.is_empty() {
        return Decimal::ZERO;
    }
    let cap = Decimal::from(100);
    let sum: Decimal = rates.iter().map(|rate| (*rate).min(cap)).sum();
    (sum / Decimal::from(rates.len()))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Check a requested visit order against the orders already used in the round
pub fn validate_visit_order(existing: &[i32], order: i32) -> Result<(), &'static str> {
    if order < 1 {
        return Err("Visit order must be at least 1");
    }
    if existing.contains(&order) {
        return Err("This visit order is already used in the round");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_round_lifecycle() {
        let s = RoundStatus::Planned;
        let s = s.apply(RoundAction::Postpone).unwrap();
        assert_eq!(s, RoundStatus::Postponed);
        let s = s.apply(RoundAction::Start).unwrap();
        assert_eq!(s, RoundStatus::InProgress);
        assert!(s.apply(RoundAction::Cancel).is_err());
        let s = s.apply(RoundAction::End).unwrap();
        assert!(s.is_terminal());
        assert!(s.apply(RoundAction::Start).is_err());
    }

    #[test]
    fn test_round_transition_error_message() {
        let err = RoundStatus::Completed.apply(RoundAction::End).unwrap_err();
        assert_eq!(err.to_string(), "cannot end a round that is completed");
    }

    #[test]
    fn test_stop_lifecycle() {
        assert_eq!(
            StopStatus::Planned.apply(StopAction::Arrive),
            Ok(StopStatus::InProgress)
        );
        assert_eq!(
            StopStatus::InProgress.apply(StopAction::Fail(FailureReason::VehicleFull)),
            Ok(StopStatus::Failed)
        );
        assert!(StopStatus::Planned.apply(StopAction::Complete).is_err());
        assert!(StopStatus::Completed.apply(StopAction::Fail(FailureReason::Other)).is_err());
        assert!(StopStatus::InProgress.apply(StopAction::Postpone).is_err());
    }

    #[test]
    fn test_average_completion_rate_is_clamped() {
        let dec = |s: &str| Decimal::from_str(s).unwrap();
        assert_eq!(average_completion_rate(&[]), Decimal::ZERO);
        assert_eq!(average_completion_rate(&[dec("80.00"), dec("150.00")]), Decimal::from(90));
        assert_eq!(average_completion_rate(&[dec("33.33"), Decimal::ZERO]), dec("16.67"));
    }

    #[test]
    fn test_stop_work_depends_on_round_status() {
        assert!(RoundStatus::InProgress.allows_stop(StopAction::Complete).is_ok());
        assert!(RoundStatus::Planned.allows_stop(StopAction::Arrive).is_err());
        assert!(RoundStatus::Planned.allows_stop(StopAction::Postpone).is_ok());
        assert!(RoundStatus::Postponed.allows_stop(StopAction::Fail(FailureReason::NoWaste)).is_ok());
        for closed in [RoundStatus::Completed, RoundStatus::Cancelled] {
            assert!(closed.allows_stop(StopAction::Complete).is_err());
            assert!(closed.allows_stop(StopAction::Fail(FailureReason::Other)).is_err());
            assert!(closed.allows_stop(StopAction::Postpone).is_err());
        }

        let err = RoundStatus::Completed.allows_stop(StopAction::Complete).unwrap_err();
        assert_eq!(err.to_string(), "cannot complete a stop of a round that is completed");
    }

    #[test]
    fn test_failure_reason_is_closed() {
        assert_eq!(FailureReason::ALL.len(), 6);
        assert!("client_absent".parse::<FailureReason>().is_ok());
        assert!("weather".parse::<FailureReason>().is_err());
    }

    #[test]
    fn test_completion_rate() {
        assert_eq!(completion_rate(25, 20), Decimal::from_str("80.00").unwrap());
        assert_eq!(completion_rate(0, 0), Decimal::ZERO);
        assert_eq!(completion_rate(0, 7), Decimal::ZERO);
        assert_eq!(completion_rate(3, 1), Decimal::from_str("33.33").unwrap());
        assert_eq!(completion_rate(3, 2), Decimal::from_str("66.67").unwrap());
    }

    #[test]
    fn test_reported_rate_is_clamped() {
        assert_eq!(completion_rate(10, 12), Decimal::from(120));
        assert_eq!(reported_completion_rate(10, 12), Decimal::from(100));
    }

    #[test]
    fn test_validate_visit_order() {
        assert!(validate_visit_order(&[1, 2, 3], 4).is_ok());
        assert!(validate_visit_order(&[1, 2, 3], 2).is_err());
        assert!(validate_visit_order(&[], 0).is_err());
    }
}

//! Agents, vehicles and teams

use chrono::{Duration, NaiveDate, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};

/// Days between two scheduled vehicle revisions
pub const REVISION_INTERVAL_DAYS: i64 = 180;

string_enum! {
    pub enum AgentPosition {
        Driver => "driver",
        Collector => "collector",
        TeamLead => "team_lead",
        Supervisor => "supervisor",
    }
}

string_enum! {
    pub enum AgentStatus {
        Active => "active",
        Inactive => "inactive",
        OnLeave => "on_leave",
        Sick => "sick",
        Training => "training",
    }
}

impl AgentStatus {
    pub fn is_available(&self) -> bool {
        *self == AgentStatus::Active
    }
}

string_enum! {
    pub enum VehicleType {
        TipperTruck => "tipper_truck",
        CompactorTruck => "compactor_truck",
        Van => "van",
        Tractor => "tractor",
    }
}

string_enum! {
    pub enum VehicleStatus {
        Operational => "operational",
        Maintenance => "maintenance",
        BrokenDown => "broken_down",
        Retired => "retired",
    }
}

impl VehicleStatus {
    pub fn is_operational(&self) -> bool {
        *self == VehicleStatus::Operational
    }
}

string_enum! {
    pub enum MaintenanceType {
        Revision => "revision",
        Repair => "repair",
        TechnicalInspection => "technical_inspection",
        Insurance => "insurance",
    }
}

/// Revision dates a vehicle carries after a maintenance of `kind` on `date`.
///
/// Only revisions move the schedule; other kinds return `None`.
pub fn revision_schedule(kind: MaintenanceType, date: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    match kind {
        MaintenanceType::Revision => Some((date, date + Duration::days(REVISION_INTERVAL_DAYS))),
        _ => None,
    }
}

/// A vehicle needs attention once any of its deadlines is today or earlier
pub fn maintenance_due(
    today: NaiveDate,
    next_revision: Option<NaiveDate>,
    insurance_expiry: Option<NaiveDate>,
    inspection_expiry: Option<NaiveDate>,
) -> bool {
    [next_revision, insurance_expiry, inspection_expiry]
        .into_iter()
        .flatten()
        .any(|deadline| deadline <= today)
}

/// Rules a team must satisfy whenever its lead or vehicle changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TeamRuleViolation {
    #[error("The team lead must hold the team_lead position")]
    LeadNotTeamLead,
    #[error("The assigned vehicle must be operational")]
    VehicleNotOperational,
    #[error("Only active agents can join a team")]
    MemberNotActive,
}

impl TeamRuleViolation {
    /// Request field the violation is about
    pub fn field(&self) -> &'static str {
        match self {
            TeamRuleViolation::LeadNotTeamLead => "team_lead_id",
            TeamRuleViolation::VehicleNotOperational => "vehicle_id",
            TeamRuleViolation::MemberNotActive => "agent_id",
        }
    }
}

pub fn check_team_lead(position: AgentPosition) -> Result<(), TeamRuleViolation> {
    if position != AgentPosition::TeamLead {
        return Err(TeamRuleViolation::LeadNotTeamLead);
    }
    Ok(())
}

pub fn check_team_vehicle(status: VehicleStatus) -> Result<(), TeamRuleViolation> {
    if !status.is_operational() {
        return Err(TeamRuleViolation::VehicleNotOperational);
    }
    Ok(())
}

pub fn check_team_member(status: AgentStatus) -> Result<(), TeamRuleViolation> {
    if !status.is_available() {
        return Err(TeamRuleViolation::MemberNotActive);
    }
    Ok(())
}

/// Hours a team works per day. A shift ending before it starts runs past midnight.
pub fn shift_hours(start: NaiveTime, end: NaiveTime) -> Decimal {
    let mut minutes = (end - start).num_minutes();
    if minutes < 0 {
        minutes += 24 * 60;
    }
    (Decimal::from(minutes) / Decimal::from(60))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Hours per week for a shift worked on `working_days` days
pub fn weekly_hours(start: NaiveTime, end: NaiveTime, working_days: usize) -> Decimal {
    shift_hours(start, end) * Decimal::from(working_days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_revision_schedule() {
        let d = date(2024, 1, 10);
        assert_eq!(
            revision_schedule(MaintenanceType::Revision, d),
            Some((d, date(2024, 7, 8)))
        );
        assert_eq!(revision_schedule(MaintenanceType::Repair, d), None);
    }

    #[test]
    fn test_maintenance_due() {
        let today = date(2024, 6, 1);
        assert!(!maintenance_due(today, None, None, None));
        assert!(!maintenance_due(today, Some(date(2024, 7, 1)), None, None));
        assert!(maintenance_due(today, Some(date(2024, 7, 1)), Some(today), None));
        assert!(maintenance_due(today, None, None, Some(date(2024, 1, 1))));
    }

    #[test]
    fn test_team_rules() {
        assert!(check_team_lead(AgentPosition::TeamLead).is_ok());
        assert_eq!(
            check_team_lead(AgentPosition::Driver),
            Err(TeamRuleViolation::LeadNotTeamLead)
        );
        assert!(check_team_vehicle(VehicleStatus::Operational).is_ok());
        assert!(check_team_vehicle(VehicleStatus::BrokenDown).is_err());
        assert!(check_team_member(AgentStatus::Active).is_ok());
        assert_eq!(
            check_team_member(AgentStatus::Sick).unwrap_err().field(),
            "agent_id"
        );
    }

    #[test]
    fn test_team_working_hours() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(shift_hours(t(6, 0), t(14, 30)), Decimal::new(850, 2));
        assert_eq!(shift_hours(t(22, 0), t(6, 0)), Decimal::from(8));
        assert_eq!(weekly_hours(t(6, 0), t(12, 0), 5), Decimal::from(30));
        assert_eq!(weekly_hours(t(6, 0), t(12, 0), 0), Decimal::ZERO);
    }
}

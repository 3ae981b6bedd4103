//! Clients, contracts, bins and prospecting requests

use chrono::{Duration, NaiveDate};

use crate::types::TransitionError;

/// A client with no payment for this many days is flagged inactive
pub const INACTIVITY_DAYS: i64 = 90;

/// Length of the contract created when a prospect becomes a client
pub const DEFAULT_CONTRACT_DAYS: i64 = 365;

/// Currency used when a contract does not name one
pub const DEFAULT_CURRENCY: &str = "XOF";

string_enum! {
    pub enum ClientType {
        Individual => "individual",
        Company => "company",
        Institution => "institution",
    }
}

string_enum! {
    pub enum ClientStatus {
        Active => "active",
        Pending => "pending",
        Inactive => "inactive",
        Suspended => "suspended",
        Prospect => "prospect",
    }
}

/// Whether an active client should be flagged for inactivity on `today`.
///
/// Clients that never paid are measured from their registration date.
pub fn is_inactive_candidate(
    status: ClientStatus,
    registered_on: NaiveDate,
    last_payment: Option<NaiveDate>,
    today: NaiveDate,
) -> bool {
    let reference = last_payment.unwrap_or(registered_on);
    status == ClientStatus::Active && reference < inactivity_cutoff(today)
}

/// Payments before this date no longer count as recent activity
pub fn inactivity_cutoff(today: NaiveDate) -> NaiveDate {
    today - Duration::days(INACTIVITY_DAYS)
}

/// Split a full name into first name and the rest
pub fn split_full_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}

string_enum! {
    pub enum CollectionFrequency {
        Daily => "daily",
        TwiceWeekly => "twice_weekly",
        Weekly => "weekly",
        TwiceMonthly => "twice_monthly",
        Monthly => "monthly",
    }
}

impl CollectionFrequency {
    /// Expected number of passes over a billing period of `months` months
    pub fn passes_per(&self, months: u32) -> i32 {
        let months = months as i32;
        match self {
            CollectionFrequency::Daily => 30 * months,
            CollectionFrequency::TwiceWeekly => 8 * months,
            CollectionFrequency::Weekly => 4 * months,
            CollectionFrequency::TwiceMonthly => 2 * months,
            CollectionFrequency::Monthly => months,
        }
    }
}

string_enum! {
    pub enum ContractStatus {
        Active => "active",
        Expired => "expired",
        Terminated => "terminated",
        Suspended => "suspended",
    }
}

/// A contract is in force while active and within its dates
pub fn contract_in_force(
    status: ContractStatus,
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
) -> bool {
    status == ContractStatus::Active && start <= today && today <= end
}

/// End date of a default-length contract starting on `start`
pub fn default_contract_end(start: NaiveDate) -> NaiveDate {
    start + Duration::days(DEFAULT_CONTRACT_DAYS)
}

string_enum! {
    pub enum BinType {
        Plastic120L => "plastic_120l",
        Plastic240L => "plastic_240l",
        Metal120L => "metal_120l",
        Metal240L => "metal_240l",
        Container660L => "container_660l",
        Container1100L => "container_1100l",
    }
}

impl BinType {
    pub fn capacity_litres(&self) -> i32 {
        match self {
            BinType::Plastic120L | BinType::Metal120L => 120,
            BinType::Plastic240L | BinType::Metal240L => 240,
            BinType::Container660L => 660,
            BinType::Container1100L => 1100,
        }
    }
}

string_enum! {
    pub enum BinStatus {
        Active => "active",
        Damaged => "damaged",
        Lost => "lost",
        Replaced => "replaced",
    }
}

string_enum! {
    pub enum ServiceType {
        IndividualStandard => "individual_standard",
        IndividualPremium => "individual_premium",
        CompanySmall => "company_small",
        CompanyMedium => "company_medium",
        CompanyLarge => "company_large",
        Institution => "institution",
    }
}

string_enum! {
    pub enum ProspectStatus {
        Pending => "pending",
        Assigned => "assigned",
        InProgress => "in_progress",
        Validated => "validated",
        Rejected => "rejected",
        ClientCreated => "client_created",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProspectAction {
    Assign,
    StartVisit,
    Convert,
    Reject,
}

impl ProspectAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProspectAction::Assign => "assign",
            ProspectAction::StartVisit => "visit",
            ProspectAction::Convert => "convert",
            ProspectAction::Reject => "reject",
        }
    }
}

impl ProspectStatus {
    pub fn apply(self, action: ProspectAction) -> Result<ProspectStatus, TransitionError> {
        use ProspectStatus::*;

        let next = match (self, action) {
            (Pending | Assigned, ProspectAction::Assign) => Assigned,
            (Assigned, ProspectAction::StartVisit) => InProgress,
            (Assigned | InProgress, ProspectAction::Convert) => ClientCreated,
            (Pending | Assigned | InProgress | Validated, ProspectAction::Reject) => Rejected,
            _ => {
                return Err(TransitionError {
                    entity: "prospect request",
                    from: self.as_str(),
                    action: action.as_str(),
                })
            }
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_inactivity() {
        let today = date(2024, 6, 1);
        let recent = Some(date(2024, 5, 1));
        let old = Some(date(2024, 1, 1));
        let registered = date(2023, 1, 1);

        assert!(!is_inactive_candidate(ClientStatus::Active, registered, recent, today));
        assert!(is_inactive_candidate(ClientStatus::Active, registered, old, today));
        assert!(is_inactive_candidate(ClientStatus::Active, registered, None, today));
        assert!(!is_inactive_candidate(ClientStatus::Inactive, registered, old, today));
        assert!(!is_inactive_candidate(ClientStatus::Active, date(2024, 5, 20), None, today));
    }

    #[test]
    fn test_contract_in_force() {
        let start = date(2024, 1, 1);
        let end = default_contract_end(start);
        assert_eq!(end, date(2024, 12, 31));
        assert!(contract_in_force(ContractStatus::Active, start, end, date(2024, 6, 1)));
        assert!(contract_in_force(ContractStatus::Active, start, end, end));
        assert!(!contract_in_force(ContractStatus::Active, start, end, date(2025, 1, 1)));
        assert!(!contract_in_force(ContractStatus::Suspended, start, end, date(2024, 6, 1)));
    }

    #[test]
    fn test_prospect_conversion_requires_assignment() {
        assert!(ProspectStatus::Pending.apply(ProspectAction::Convert).is_err());
        assert_eq!(
            ProspectStatus::Assigned.apply(ProspectAction::Convert),
            Ok(ProspectStatus::ClientCreated)
        );
        assert_eq!(
            ProspectStatus::InProgress.apply(ProspectAction::Convert),
            Ok(ProspectStatus::ClientCreated)
        );
        assert!(ProspectStatus::ClientCreated.apply(ProspectAction::Reject).is_err());
    }

    #[test]
    fn test_split_full_name() {
        assert_eq!(
            split_full_name("Awa Marie Ouedraogo"),
            ("Awa".to_string(), "Marie Ouedraogo".to_string())
        );
        assert_eq!(split_full_name("Moussa"), ("Moussa".to_string(), String::new()));
    }

    #[test]
    fn test_bin_capacity() {
        assert_eq!(BinType::Container1100L.capacity_litres(), 1100);
        assert_eq!("metal_240l".parse::<BinType>().unwrap().capacity_litres(), 240);
    }
}

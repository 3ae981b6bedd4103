//! User accounts, profiles and role capabilities

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

string_enum! {
    /// Role tag carried by every account
    pub enum UserType {
        Admin => "admin",
        PickupAgent => "pickup_agent",
        PaymentCollector => "payment_collector",
        ProspectingAgent => "prospecting_agent",
        Supervisor => "supervisor",
        Client => "client",
        Visitor => "visitor",
    }
}

/// Things a user may be allowed to do.
///
/// Every permission decision in the backend goes through [`UserType::can`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Create, update and deactivate any account
    ManageUsers,
    /// Write access to clients, zones, contracts, bins, agents, vehicles and teams
    ManageRegistry,
    /// Read access to the registries
    ViewRegistry,
    /// Open and close a field login session
    OpenFieldSession,
    /// See which agents are currently logged in on the field
    ViewActiveAgents,
    /// Plan rounds and change their status
    PlanRounds,
    /// Add agents to teams and remove them
    ManageTeamMembers,
    /// Record stop outcomes during a round
    OperateStops,
    /// Assign, resolve and close complaints
    HandleComplaints,
    /// Open a complaint about a stop
    FileComplaints,
    /// Create, issue and cancel invoices
    ManageInvoices,
    /// Record a payment against an invoice
    RecordPayments,
    /// Verify, validate or refuse a recorded payment
    ValidatePayments,
    /// Confirm or contest a payment on one's own account
    ContestPayments,
    /// Work prospecting requests assigned to oneself
    ConvertProspects,
    /// Dashboards, exports and collection reports
    ViewReports,
    /// Register vehicle maintenance
    RegisterMaintenance,
}

impl UserType {
    /// The single capability check for the whole platform
    pub fn can(&self, capability: Capability) -> bool {
        use Capability::*;
        use UserType::*;

        match self {
            Admin => !matches!(capability, ContestPayments | ConvertProspects | OpenFieldSession),
            Supervisor => matches!(
                capability,
                ViewRegistry
                    | OpenFieldSession
                    | ViewActiveAgents
                    | PlanRounds
                    | ManageTeamMembers
                    | OperateStops
                    | HandleComplaints
                    | FileComplaints
                    | ValidatePayments
                    | ViewReports
            ),
            PickupAgent => matches!(capability, ViewRegistry | OpenFieldSession | OperateStops),
            PaymentCollector => {
                matches!(capability, ViewRegistry | OpenFieldSession | RecordPayments)
            }
            ProspectingAgent => {
                matches!(capability, ViewRegistry | OpenFieldSession | ConvertProspects)
            }
            Client => matches!(capability, FileComplaints | ContestPayments),
            Visitor => false,
        }
    }

    /// Agent types that work on the field and log in with sessions
    pub fn is_field_agent(&self) -> bool {
        matches!(
            self,
            UserType::PickupAgent
                | UserType::PaymentCollector
                | UserType::ProspectingAgent
                | UserType::Supervisor
        )
    }

    /// Clients only ever see records attached to their own account
    pub fn is_scoped_to_self(&self) -> bool {
        matches!(self, UserType::Client)
    }
}

/// A user account on the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub user_type: UserType,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Extended profile, created together with every account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UserProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub receive_notifications: bool,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// QR code identifying a client account at payment time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ClientQrCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Records created right after an account, inside the same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountExtras {
    pub profile: bool,
    pub qr_code: bool,
}

/// What must accompany a freshly created account of the given type
pub fn account_extras(user_type: UserType) -> AccountExtras {
    AccountExtras {
        profile: true,
        qr_code: user_type == UserType::Client,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_cannot_act_as_client_or_prospector() {
        assert!(UserType::Admin.can(Capability::ManageUsers));
        assert!(UserType::Admin.can(Capability::ValidatePayments));
        assert!(!UserType::Admin.can(Capability::ContestPayments));
        assert!(!UserType::Admin.can(Capability::ConvertProspects));
    }

    #[test]
    fn test_visitor_has_no_capability() {
        assert!(!UserType::Visitor.can(Capability::ViewRegistry));
        assert!(!UserType::Visitor.can(Capability::OpenFieldSession));
    }

    #[test]
    fn test_field_agents() {
        let field: Vec<_> = UserType::ALL
            .iter()
            .filter(|t| t.is_field_agent())
            .collect();
        assert_eq!(field.len(), 4);
        for t in UserType::ALL {
            assert_eq!(t.is_field_agent(), t.can(Capability::OpenFieldSession));
        }
    }

    #[test]
    fn test_only_clients_get_qr_codes() {
        for t in UserType::ALL {
            let extras = account_extras(*t);
            assert!(extras.profile);
            assert_eq!(extras.qr_code, *t == UserType::Client);
        }
    }

    #[test]
    fn test_user_type_parse() {
        assert_eq!("pickup_agent".parse::<UserType>(), Ok(UserType::PickupAgent));
        assert!("manager".parse::<UserType>().is_err());
    }
}

//! Business logic services for the Waste Collection Management Platform

pub mod account;
pub mod agent;
pub mod auth;
pub mod client;
pub mod collection_report;
pub mod complaint;
pub mod contract;
pub mod invoice;
pub mod listing;
pub mod payment;
pub mod prospect;
pub mod receipt;
pub mod reporting;
pub mod round;
pub mod session;
pub mod team;
pub mod vehicle;
pub mod zone;

pub use account::AccountService;
pub use agent::AgentService;
pub use auth::AuthService;
pub use client::ClientService;
pub use collection_report::CollectionReportService;
pub use complaint::ComplaintService;
pub use contract::ContractService;
pub use invoice::InvoiceService;
pub use payment::PaymentService;
pub use prospect::ProspectService;
pub use receipt::ReceiptService;
pub use reporting::ReportingService;
pub use round::RoundService;
pub use session::SessionService;
pub use team::TeamService;
pub use vehicle::VehicleService;
pub use zone::ZoneService;

//! HTTP request handlers

pub mod account;
pub mod agent;
pub mod auth;
pub mod client;
pub mod collection_report;
pub mod complaint;
pub mod contract;
pub mod health;
pub mod invoice;
pub mod payment;
pub mod prospect;
pub mod reporting;
pub mod round;
pub mod session;
pub mod team;
pub mod vehicle;
pub mod zone;

pub use account::*;
pub use agent::*;
pub use auth::*;
pub use client::*;
pub use collection_report::*;
pub use complaint::*;
pub use contract::*;
pub use health::*;
pub use invoice::*;
pub use payment::*;
pub use prospect::*;
pub use reporting::*;
pub use round::*;
pub use session::*;
pub use team::*;
pub use vehicle::*;
pub use zone::*;

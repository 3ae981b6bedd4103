//! Shared types and rules for the Waste Collection Management Platform
//!
//! Domain enums, lifecycle rules and validation shared by the backend server
//! and its test suites. Nothing here touches the database; the backend enables
//! the `sqlx` feature so the status enums bind directly to VARCHAR columns.

#[macro_use]
mod macros;

pub mod codes;
pub mod models;
pub mod types;
pub mod validation;

pub use codes::*;
pub use models::*;
pub use types::*;
pub use validation::*;

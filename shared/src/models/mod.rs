//! Domain models for the Waste Collection Management Platform

mod billing;
mod clients;
mod complaint;
mod fleet;
mod reporting;
mod round;
mod session;
mod user;

pub use billing::*;
pub use clients::*;
pub use complaint::*;
pub use fleet::*;
pub use reporting::*;
pub use round::*;
pub use session::*;
pub use user::*;
